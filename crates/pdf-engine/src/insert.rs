//! Drawing new text onto a page with one of the standard fonts.

use crate::error::{EngineError, EngineResult};
use crate::fonts::win_ansi_encode;
use crate::geometry::Point;
use crate::objects::{page_box, page_content, real, replace_page_content};
use crate::persist::ChangeSet;
use doc_model::{BuiltinFont, RgbColor};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, StringFormat};

/// Resolved style for a run of inserted text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct InsertStyle {
    pub font: BuiltinFont,
    pub size: f32,
    pub color: RgbColor,
}

/// Draws `text` with its baseline starting at `origin` (document space).
pub(crate) fn insert_text(
    doc: &mut Document,
    page_id: ObjectId,
    origin: Point,
    text: &str,
    style: InsertStyle,
    changes: &mut ChangeSet,
) -> EngineResult<()> {
    let font_name = ensure_font_resource(doc, page_id, style.font, changes)?;
    let (x, y) = page_box(doc, page_id).to_user(origin);
    let RgbColor { r, g, b } = style.color;

    let existing = page_content(doc, page_id)?;
    let mut content = Vec::with_capacity(existing.len() + 128);
    if balanced(&existing)? {
        content.extend_from_slice(&existing);
    } else {
        content.extend_from_slice(b"q\n");
        content.extend_from_slice(&existing);
        content.extend_from_slice(b"Q\n");
    }

    let ops = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(font_name.into_bytes()), real(style.size)]),
            Operation::new("rg", vec![real(r), real(g), real(b)]),
            Operation::new(
                "Tm",
                vec![1.into(), 0.into(), 0.into(), 1.into(), real(x), real(y)],
            ),
            Operation::new(
                "Tj",
                vec![Object::String(win_ansi_encode(text), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded = ops
        .encode()
        .map_err(|err| EngineError::Malformed(format!("encoding inserted text: {err}")))?;
    content.extend_from_slice(&encoded);
    content.push(b'\n');

    replace_page_content(doc, page_id, content, changes)
}

fn balanced(content: &[u8]) -> EngineResult<bool> {
    let decoded = Content::decode(content)
        .map_err(|err| EngineError::Malformed(format!("page content: {err}")))?;
    let mut depth: i64 = 0;
    for op in &decoded.operations {
        match op.operator.as_str() {
            "q" => depth += 1,
            "Q" => {
                depth -= 1;
                if depth < 0 {
                    return Ok(false);
                }
            }
            _ => {}
        }
    }
    Ok(depth == 0)
}

/// Makes sure the page's font resources carry `font`, returning the resource
/// name to select it with.
pub(crate) fn ensure_font_resource(
    doc: &mut Document,
    page_id: ObjectId,
    font: BuiltinFont,
    changes: &mut ChangeSet,
) -> EngineResult<String> {
    let name = font.resource_name();
    let resources_id = own_resources(doc, page_id, changes)?;

    let font_dict = dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => font.base_font(),
        "Encoding" => "WinAnsiEncoding",
    };

    // The font map may live inline in the resources or behind a reference.
    let fonts_ref = {
        let resources = resources_dict(doc, page_id, resources_id)?;
        match resources.get(b"Font") {
            Ok(Object::Reference(id)) => Some(*id),
            Ok(Object::Dictionary(_)) => None,
            _ => {
                resources.set("Font", Dictionary::new());
                None
            }
        }
    };

    let fonts = match fonts_ref {
        Some(id) => {
            changes.touch(id);
            doc.get_dictionary_mut(id)?
        }
        None => resources_dict(doc, page_id, resources_id)?
            .get_mut(b"Font")?
            .as_dict_mut()?,
    };
    if !fonts.has(name.as_bytes()) {
        fonts.set(name, font_dict);
    }
    Ok(name.to_string())
}

/// Gives the page its own resource dictionary, copying an inherited one when
/// necessary. Returns the id of the resources object when it is indirect.
fn own_resources(
    doc: &mut Document,
    page_id: ObjectId,
    changes: &mut ChangeSet,
) -> EngineResult<Option<ObjectId>> {
    changes.touch(page_id);
    let page = doc.get_dictionary(page_id)?;
    match page.get(b"Resources") {
        Ok(Object::Reference(id)) => {
            let id = *id;
            changes.touch(id);
            Ok(Some(id))
        }
        Ok(Object::Dictionary(_)) => Ok(None),
        _ => {
            let inherited = crate::objects::inherited(doc, page_id, b"Resources")
                .and_then(|obj| obj.as_dict().ok())
                .cloned()
                .unwrap_or_default();
            doc.get_dictionary_mut(page_id)?.set("Resources", inherited);
            Ok(None)
        }
    }
}

fn resources_dict(
    doc: &mut Document,
    page_id: ObjectId,
    resources_id: Option<ObjectId>,
) -> EngineResult<&mut Dictionary> {
    Ok(match resources_id {
        Some(id) => doc.get_dictionary_mut(id)?,
        None => doc.get_dictionary_mut(page_id)?.get_mut(b"Resources")?.as_dict_mut()?,
    })
}
