//! Highlight annotations. They sit on top of the page content and never
//! modify it.

use crate::error::EngineResult;
use crate::geometry::Rect;
use crate::objects::{deref, number, page_box, real_array};
use crate::persist::ChangeSet;
use doc_model::RgbColor;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

pub(crate) fn add_highlight(
    doc: &mut Document,
    page_id: ObjectId,
    rect: Rect,
    color: RgbColor,
    changes: &mut ChangeSet,
) -> EngineResult<ObjectId> {
    let [llx, lly, urx, ury] = page_box(doc, page_id).rect_to_user(&rect);
    let (width, height) = (urx - llx, ury - lly);
    let RgbColor { r, g, b } = color;

    let appearance = format!("/GS0 gs {r} {g} {b} rg 0 0 {width} {height} re f\n");
    let appearance_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => real_array(&[0.0, 0.0, width, height]),
            "Resources" => dictionary! {
                "ExtGState" => dictionary! {
                    "GS0" => dictionary! {
                        "Type" => "ExtGState",
                        "BM" => "Multiply",
                    },
                },
            },
        },
        appearance.into_bytes(),
    ));

    let annot_id = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Highlight",
        "Rect" => real_array(&[llx, lly, urx, ury]),
        "QuadPoints" => real_array(&[llx, ury, urx, ury, llx, lly, urx, lly]),
        "C" => real_array(&[r, g, b]),
        "F" => 4,
        "P" => Object::Reference(page_id),
        "AP" => dictionary! { "N" => Object::Reference(appearance_id) },
    });
    changes.touch(appearance_id);
    changes.touch(annot_id);

    let annots = doc.get_dictionary(page_id)?.get(b"Annots").ok().cloned();
    match annots {
        Some(Object::Reference(array_id)) => {
            if let Object::Array(items) = doc.get_object_mut(array_id)? {
                items.push(Object::Reference(annot_id));
                changes.touch(array_id);
            }
        }
        Some(Object::Array(mut items)) => {
            items.push(Object::Reference(annot_id));
            doc.get_dictionary_mut(page_id)?.set("Annots", items);
        }
        _ => {
            doc.get_dictionary_mut(page_id)?
                .set("Annots", vec![Object::Reference(annot_id)]);
        }
    }
    changes.touch(page_id);

    log::debug!("added highlight {annot_id:?} on page object {page_id:?}");
    Ok(annot_id)
}

/// Highlight annotations on the page as document-space rectangles.
pub(crate) fn highlights(doc: &Document, page_id: ObjectId) -> Vec<(Rect, RgbColor)> {
    let page_box = page_box(doc, page_id);
    let annots = doc
        .get_dictionary(page_id)
        .ok()
        .and_then(|page| page.get(b"Annots").ok())
        .and_then(|obj| deref(doc, obj).ok())
        .and_then(|obj| obj.as_array().ok());

    let Some(annots) = annots else {
        return Vec::new();
    };

    annots
        .iter()
        .filter_map(|obj| deref(doc, obj).ok()?.as_dict().ok())
        .filter(|annot| matches!(annot.get(b"Subtype").and_then(Object::as_name), Ok(b"Highlight")))
        .filter_map(|annot| {
            let rect: Vec<f32> =
                annot.get(b"Rect").ok()?.as_array().ok()?.iter().filter_map(number).collect();
            let [x0, y0, x1, y1] = rect[..] else { return None };
            let color = annot
                .get(b"C")
                .and_then(Object::as_array)
                .ok()
                .map(|c| c.iter().filter_map(number).collect::<Vec<_>>())
                .and_then(|c| match c[..] {
                    [r, g, b] => Some(RgbColor { r, g, b }),
                    _ => None,
                })
                .unwrap_or(RgbColor::YELLOW);
            let a = page_box.to_document(x0, y0);
            let b = page_box.to_document(x1, y1);
            Some((Rect::new(a.x, a.y, b.x, b.y), color))
        })
        .collect()
}

/// Opacity-free "multiply" of a highlight colour onto a pixel.
pub(crate) fn multiply(pixel: [u8; 3], color: RgbColor) -> [u8; 3] {
    let [r, g, b] = color.to_rgb8();
    [
        ((pixel[0] as u16 * r as u16) / 255) as u8,
        ((pixel[1] as u16 * g as u16) / 255) as u8,
        ((pixel[2] as u16 * b as u16) / 255) as u8,
    ]
}
