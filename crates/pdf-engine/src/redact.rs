//! Glyph-level redaction: text showing operators are rewritten so the glyphs
//! inside the redacted areas are no longer drawn while everything after them
//! keeps its position.

use crate::error::{EngineError, EngineResult};
use crate::geometry::Rect;
use crate::layout::{interpret, Glyph};
use crate::objects::{real, replace_page_content};
use crate::persist::ChangeSet;
use lopdf::content::Operation;
use lopdf::{Document, Object, ObjectId, StringFormat};
use std::collections::BTreeMap;

/// Removes every glyph whose box centre falls inside one of `areas`.
/// Returns the number of glyphs removed; the page is untouched when it is zero.
pub(crate) fn apply_redactions(
    doc: &mut Document,
    page_id: ObjectId,
    areas: &[Rect],
    changes: &mut ChangeSet,
) -> EngineResult<usize> {
    if areas.is_empty() {
        return Ok(0);
    }

    let layout = interpret(doc, page_id)?;
    let doomed = |glyph: &Glyph| areas.iter().any(|area| area.contains(glyph.bbox.center()));

    let mut by_op: BTreeMap<usize, Vec<(&Glyph, bool)>> = BTreeMap::new();
    let mut removed = 0;
    for glyph in &layout.glyphs {
        let remove = doomed(glyph);
        removed += usize::from(remove);
        by_op.entry(glyph.op_index).or_default().push((glyph, remove));
    }
    by_op.retain(|_, glyphs| glyphs.iter().any(|(_, remove)| *remove));

    if removed == 0 {
        return Ok(0);
    }

    let mut content = layout.content;
    let mut operations = Vec::with_capacity(content.operations.len() + by_op.len() * 3);
    for (index, op) in content.operations.drain(..).enumerate() {
        match by_op.get(&index) {
            Some(glyphs) => operations.extend(rewrite(op, glyphs)?),
            None => operations.push(op),
        }
    }
    content.operations = operations;

    let bytes = content
        .encode()
        .map_err(|err| EngineError::Malformed(format!("re-encoding page {page_id:?}: {err}")))?;
    replace_page_content(doc, page_id, bytes, changes)?;

    log::debug!("redacted {removed} glyphs on page object {page_id:?}");
    Ok(removed)
}

fn rewrite(op: Operation, glyphs: &[(&Glyph, bool)]) -> EngineResult<Vec<Operation>> {
    let Operation { operator, mut operands } = op;
    let mut prefix = Vec::new();
    let items = match operator.as_str() {
        "TJ" => match operands.pop() {
            Some(Object::Array(items)) => items,
            _ => return Err(malformed(&operator)),
        },
        "Tj" => vec![operands.pop().ok_or_else(|| malformed(&operator))?],
        "'" => {
            prefix.push(Operation::new("T*", vec![]));
            vec![operands.pop().ok_or_else(|| malformed(&operator))?]
        }
        "\"" => {
            if operands.len() != 3 {
                return Err(malformed(&operator));
            }
            let text = operands.remove(2);
            let char_spacing = operands.remove(1);
            let word_spacing = operands.remove(0);
            prefix.push(Operation::new("Tw", vec![word_spacing]));
            prefix.push(Operation::new("Tc", vec![char_spacing]));
            prefix.push(Operation::new("T*", vec![]));
            vec![text]
        }
        _ => return Err(malformed(&operator)),
    };

    let mut rebuilt = Vec::with_capacity(items.len() + 2);
    for (item, element) in items.into_iter().enumerate() {
        let Object::String(bytes, format) = element else {
            rebuilt.push(element);
            continue;
        };
        let in_item: Vec<&(&Glyph, bool)> = glyphs.iter().filter(|(g, _)| g.item == item).collect();
        if !in_item.iter().any(|(_, remove)| *remove) {
            rebuilt.push(Object::String(bytes, format));
            continue;
        }
        split_string(&bytes, format, &in_item, &mut rebuilt);
    }

    prefix.push(Operation::new("TJ", vec![Object::Array(rebuilt)]));
    Ok(prefix)
}

fn split_string(
    bytes: &[u8],
    format: StringFormat,
    glyphs: &[&(&Glyph, bool)],
    out: &mut Vec<Object>,
) {
    let mut kept: Vec<u8> = Vec::new();
    let mut gap = 0.0_f32;

    for (glyph, remove) in glyphs {
        if *remove {
            if !kept.is_empty() {
                out.push(Object::String(std::mem::take(&mut kept), format.clone()));
            }
            gap += glyph.displacement();
            continue;
        }
        if gap != 0.0 {
            out.push(real(gap));
            gap = 0.0;
        }
        if let Some(slice) = bytes.get(glyph.bytes.clone()) {
            kept.extend_from_slice(slice);
        }
    }

    if !kept.is_empty() {
        out.push(Object::String(kept, format));
    }
    if gap != 0.0 {
        out.push(real(gap));
    }
}

fn malformed(operator: &str) -> EngineError {
    EngineError::Malformed(format!("unexpected operands for text operator {operator}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::interpret;
    use crate::locator::TextPage;
    use crate::objects::page_id;
    use crate::test_support::{pdf_with_content, single_page};

    fn words(doc: &Document) -> Vec<crate::locator::WordSpan> {
        let page_id = page_id(doc, 0).unwrap();
        TextPage::build(interpret(doc, page_id).unwrap().glyphs).words()
    }

    #[test]
    fn removes_only_the_covered_glyphs_and_keeps_positions() {
        let mut doc = single_page(&[(72.0, 700.0, "Hello world")]);
        let before = words(&doc);
        let page = page_id(&doc, 0).unwrap();
        let mut changes = ChangeSet::default();

        let removed = apply_redactions(&mut doc, page, &[before[0].bbox], &mut changes).unwrap();
        assert_eq!(removed, 5);
        assert!(!changes.is_empty());

        let after = words(&doc);
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].text, "world");
        assert!((after[0].bbox.x0 - before[1].bbox.x0).abs() < 1e-2);
    }

    #[test]
    fn nothing_inside_leaves_the_page_alone() {
        let mut doc = single_page(&[(72.0, 700.0, "Hello")]);
        let page = page_id(&doc, 0).unwrap();
        let contents = |doc: &Document| {
            doc.get_dictionary(page).unwrap().get(b"Contents").unwrap().as_reference().unwrap()
        };
        let contents_before = contents(&doc);
        let mut changes = ChangeSet::default();

        let removed =
            apply_redactions(&mut doc, page, &[Rect::new(0.0, 0.0, 10.0, 10.0)], &mut changes)
                .unwrap();
        assert_eq!(removed, 0);
        assert!(changes.is_empty());
        assert_eq!(contents(&doc), contents_before);
    }

    #[test]
    fn quote_operators_keep_their_line_moves() {
        let content = b"BT /F1 12 Tf 14 TL 72 700 Td (keep) Tj (drop) ' 0 0 (last) \" ET".to_vec();
        let mut doc = pdf_with_content(content);
        let before = words(&doc);
        let drop = before.iter().find(|w| w.text == "drop").unwrap().bbox;
        let page = page_id(&doc, 0).unwrap();

        apply_redactions(&mut doc, page, &[drop], &mut ChangeSet::default()).unwrap();

        let after = words(&doc);
        let texts: Vec<&str> = after.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, ["keep", "last"]);
        let last_before = before.iter().find(|w| w.text == "last").unwrap();
        assert!((after[1].bbox.y0 - last_before.bbox.y0).abs() < 1e-2);
    }

    #[test]
    fn tj_arrays_keep_their_adjustments() {
        let content = b"BT /F1 10 Tf 100 100 Td [(AB) -500 (CD)] TJ ET".to_vec();
        let mut doc = pdf_with_content(content);
        let page = page_id(&doc, 0).unwrap();
        let layout = interpret(&doc, page).unwrap();
        let b = layout.glyphs[1].bbox;
        let d_before = layout.glyphs[3].bbox;

        apply_redactions(&mut doc, page, &[b], &mut ChangeSet::default()).unwrap();

        let layout = interpret(&doc, page).unwrap();
        let text: String = layout.glyphs.iter().map(|g| g.text.as_str()).collect();
        assert_eq!(text, "ACD");
        assert!((layout.glyphs[2].bbox.x0 - d_before.x0).abs() < 1e-2);
    }
}
