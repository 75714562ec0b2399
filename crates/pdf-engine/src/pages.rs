//! Page tree edits: removing pages and setting their rotation.

use crate::error::{EngineError, EngineResult};
use crate::objects::page_count;
use crate::persist::ChangeSet;
use lopdf::{Document, Object, ObjectId};

const MAX_TREE_DEPTH: usize = 64;

pub(crate) fn normalize_rotation(degrees: i64) -> EngineResult<u16> {
    if degrees % 90 != 0 {
        return Err(EngineError::InvalidRotation(degrees));
    }
    Ok(degrees.rem_euclid(360) as u16)
}

/// Sets the absolute `/Rotate` of a page.
pub(crate) fn set_rotation(
    doc: &mut Document,
    page_id: ObjectId,
    degrees: u16,
    changes: &mut ChangeSet,
) -> EngineResult<()> {
    doc.get_dictionary_mut(page_id)?.set("Rotate", Object::Integer(i64::from(degrees)));
    changes.touch(page_id);
    Ok(())
}

/// Unlinks the page from its parent's `Kids` and decrements every ancestor's
/// `Count`. The page object itself stays in the file, unreferenced.
pub(crate) fn remove_page(
    doc: &mut Document,
    page_id: ObjectId,
    changes: &mut ChangeSet,
) -> EngineResult<()> {
    if page_count(doc) <= 1 {
        return Err(EngineError::EmptyDocument);
    }

    let parent_id = doc
        .get_dictionary(page_id)?
        .get(b"Parent")
        .and_then(Object::as_reference)
        .map_err(|_| EngineError::Malformed(format!("page {page_id:?} has no parent")))?;

    let kids_ref = match doc.get_dictionary(parent_id)?.get(b"Kids")? {
        Object::Reference(id) => Some(*id),
        _ => None,
    };
    let kids = match kids_ref {
        Some(id) => {
            changes.touch(id);
            doc.get_object_mut(id)?.as_array_mut()?
        }
        None => doc.get_dictionary_mut(parent_id)?.get_mut(b"Kids")?.as_array_mut()?,
    };
    let before = kids.len();
    kids.retain(|kid| kid.as_reference().ok() != Some(page_id));
    if kids.len() == before {
        return Err(EngineError::Malformed(format!(
            "page {page_id:?} is not listed in its parent's kids"
        )));
    }

    let mut node = Some(parent_id);
    for _ in 0..MAX_TREE_DEPTH {
        let Some(id) = node else { break };
        let dict = doc.get_dictionary_mut(id)?;
        let count = dict.get(b"Count").and_then(Object::as_i64).unwrap_or(1);
        dict.set("Count", Object::Integer((count - 1).max(0)));
        node = dict.get(b"Parent").and_then(Object::as_reference).ok();
        changes.touch(id);
    }

    log::debug!("unlinked page object {page_id:?} from {parent_id:?}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{page_id, page_rotation};
    use crate::test_support::multi_page;

    #[test]
    fn rotation_must_be_a_right_angle() {
        assert_eq!(normalize_rotation(90).unwrap(), 90);
        assert_eq!(normalize_rotation(-90).unwrap(), 270);
        assert_eq!(normalize_rotation(450).unwrap(), 90);
        assert!(matches!(normalize_rotation(45), Err(EngineError::InvalidRotation(45))));
    }

    #[test]
    fn rotation_is_absolute() {
        let mut doc = multi_page(&["one", "two"]);
        let page = page_id(&doc, 1).unwrap();
        let mut changes = ChangeSet::default();
        set_rotation(&mut doc, page, 90, &mut changes).unwrap();
        set_rotation(&mut doc, page, 180, &mut changes).unwrap();
        assert_eq!(page_rotation(&doc, page), 180);
        assert_eq!(page_rotation(&doc, page_id(&doc, 0).unwrap()), 0);
    }

    #[test]
    fn removing_a_page_shifts_later_pages_down() {
        let mut doc = multi_page(&["one", "two", "three"]);
        let second = page_id(&doc, 1).unwrap();
        let third = page_id(&doc, 2).unwrap();
        let mut changes = ChangeSet::default();

        remove_page(&mut doc, second, &mut changes).unwrap();

        assert_eq!(page_count(&doc), 2);
        assert_eq!(page_id(&doc, 1).unwrap(), third);
        let parent =
            doc.get_dictionary(third).unwrap().get(b"Parent").unwrap().as_reference().unwrap();
        let count = doc.get_dictionary(parent).unwrap().get(b"Count").unwrap().as_i64().unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn the_last_page_cannot_be_removed() {
        let mut doc = multi_page(&["only"]);
        let page = page_id(&doc, 0).unwrap();
        let err = remove_page(&mut doc, page, &mut ChangeSet::default()).unwrap_err();
        assert!(matches!(err, EngineError::EmptyDocument));
    }
}
