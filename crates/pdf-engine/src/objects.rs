//! Small helpers over the lopdf object model shared by the engine modules.

use crate::error::{EngineError, EngineResult};
use crate::geometry::{PageSize, Point, Rect};
use crate::persist::ChangeSet;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

const MAX_TREE_DEPTH: usize = 64;

pub(crate) fn deref<'a>(doc: &'a Document, object: &'a Object) -> EngineResult<&'a Object> {
    match object {
        Object::Reference(id) => Ok(doc.get_object(*id)?),
        other => Ok(other),
    }
}

pub(crate) fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

pub(crate) fn page_count(doc: &Document) -> usize {
    doc.get_pages().len()
}

pub(crate) fn page_id(doc: &Document, page_index: usize) -> EngineResult<ObjectId> {
    let pages = doc.get_pages();
    pages
        .values()
        .nth(page_index)
        .copied()
        .ok_or(EngineError::PageOutOfRange { page: page_index, page_count: pages.len() })
}

/// Looks `key` up on the page, then on its ancestors in the page tree.
pub(crate) fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = Some(page_id);
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_dictionary(node?).ok()?;
        if let Ok(value) = dict.get(key) {
            return deref(doc, value).ok();
        }
        node = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

/// The page's MediaBox in user space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PageBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl PageBox {
    const LETTER: PageBox = PageBox { x0: 0.0, y0: 0.0, x1: 612.0, y1: 792.0 };

    pub fn size(&self) -> PageSize {
        PageSize { width_pt: self.x1 - self.x0, height_pt: self.y1 - self.y0 }
    }

    pub fn to_document(&self, x: f32, y: f32) -> Point {
        Point::new(x - self.x0, self.y1 - y)
    }

    pub fn to_user(&self, point: Point) -> (f32, f32) {
        (point.x + self.x0, self.y1 - point.y)
    }

    /// User-space `[llx lly urx ury]` for a document-space rectangle.
    pub fn rect_to_user(&self, rect: &Rect) -> [f32; 4] {
        let (llx, lly) = self.to_user(Point::new(rect.x0, rect.y1));
        let (urx, ury) = self.to_user(Point::new(rect.x1, rect.y0));
        [llx, lly, urx, ury]
    }
}

pub(crate) fn page_box(doc: &Document, page_id: ObjectId) -> PageBox {
    inherited(doc, page_id, b"MediaBox")
        .and_then(|obj| obj.as_array().ok())
        .and_then(|array| {
            let values: Vec<f32> = array.iter().filter_map(number).collect();
            match values.as_slice() {
                [a, b, c, d] if (c - a).abs() > 0.0 && (d - b).abs() > 0.0 => Some(PageBox {
                    x0: a.min(*c),
                    y0: b.min(*d),
                    x1: a.max(*c),
                    y1: b.max(*d),
                }),
                _ => None,
            }
        })
        .unwrap_or(PageBox::LETTER)
}

/// `/Rotate` normalised into `0..360`.
pub(crate) fn page_rotation(doc: &Document, page_id: ObjectId) -> u16 {
    let raw = inherited(doc, page_id, b"Rotate").and_then(|obj| obj.as_i64().ok()).unwrap_or(0);
    raw.rem_euclid(360) as u16
}

/// Decoded content of every stream in the page's `/Contents`, newline separated.
pub(crate) fn page_content(doc: &Document, page_id: ObjectId) -> EngineResult<Vec<u8>> {
    let mut content = Vec::new();
    for stream_id in doc.get_page_contents(page_id) {
        let stream = doc.get_object(stream_id)?.as_stream()?;
        let bytes = if stream.dict.has(b"Filter") {
            stream.decompressed_content().map_err(|err| {
                EngineError::Malformed(format!("content stream {stream_id:?}: {err}"))
            })?
        } else {
            stream.content.clone()
        };
        content.extend_from_slice(&bytes);
        content.push(b'\n');
    }
    Ok(content)
}

/// Points the page at a single new content stream holding `content`.
pub(crate) fn replace_page_content(
    doc: &mut Document,
    page_id: ObjectId,
    content: Vec<u8>,
    changes: &mut ChangeSet,
) -> EngineResult<()> {
    let stream_id = doc.add_object(Stream::new(Dictionary::new(), content));
    doc.get_dictionary_mut(page_id)?.set("Contents", Object::Reference(stream_id));
    changes.touch(stream_id);
    changes.touch(page_id);
    Ok(())
}

pub(crate) fn real(value: f32) -> Object {
    Object::Real(value.into())
}

pub(crate) fn real_array(values: &[f32]) -> Object {
    Object::Array(values.iter().copied().map(real).collect())
}

pub(crate) fn is_encrypted(bytes: &[u8]) -> bool {
    bytes.windows(b"/Encrypt".len()).any(|window| window == b"/Encrypt")
}
