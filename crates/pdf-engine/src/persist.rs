//! Writing staged documents back to the working copy.
//!
//! Edits are appended as an incremental update section so the bytes already
//! on disk stay untouched. Structural changes that lopdf cannot express as an
//! update, and appends whose prefix does not line up, fall back to a full
//! rewrite through a temporary file.

use crate::edit::PersistKind;
use crate::error::{EngineError, EngineResult};
use lopdf::{Dictionary, Document, IncrementalDocument, ObjectId};
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Object ids created or modified by a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ChangeSet {
    ids: BTreeSet<ObjectId>,
}

impl ChangeSet {
    pub fn touch(&mut self, id: ObjectId) {
        self.ids.insert(id);
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectId> {
        self.ids.iter()
    }
}

/// How a staged document reached the disk, and the resulting file length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Written {
    pub kind: PersistKind,
    pub len: u64,
}

/// Trailer entries that still mean something once the whole file is written
/// again. Everything else (`Prev`, `XRefStm`, xref stream fields) describes the
/// old layout.
const KEPT_TRAILER_KEYS: [&[u8]; 4] = [b"Root", b"Info", b"ID", b"Size"];

/// Appends `changes` from `staged` to the file that `previous` was loaded
/// from, whose current contents are `prev_bytes`.
pub(crate) fn append_update(
    path: &Path,
    prev_bytes: &[u8],
    previous: &Document,
    staged: &Document,
    changes: &ChangeSet,
) -> EngineResult<Written> {
    let prev_len = prev_bytes.len();

    let mut update = IncrementalDocument::create_from(prev_bytes.to_vec(), previous.clone());
    for id in changes.iter() {
        if let Some(object) = staged.objects.get(id) {
            update.new_document.objects.insert(*id, object.clone());
        }
    }
    update.new_document.max_id = update.new_document.max_id.max(staged.max_id);

    let mut buffer = Vec::with_capacity(prev_len + 4096);
    update.save_to(&mut buffer).map_err(|err| EngineError::persist(path, err))?;

    if buffer.len() <= prev_len || buffer[..prev_len] != prev_bytes[..] {
        log::warn!(
            "incremental update of {} does not extend the file on disk; rewriting in full",
            path.display()
        );
        let len = rewrite_full(path, staged)?;
        return Ok(Written { kind: PersistKind::Full, len });
    }

    let mut file =
        OpenOptions::new().append(true).open(path).map_err(|err| EngineError::persist(path, err))?;
    let written = file.write_all(&buffer[prev_len..]).and_then(|()| file.sync_all());
    if let Err(err) = written {
        if let Err(truncate) = file.set_len(prev_len as u64) {
            log::error!("failed to truncate {} after a partial append: {truncate}", path.display());
        }
        return Err(EngineError::persist(path, err));
    }

    log::debug!(
        "appended {} objects ({} bytes) to {}",
        changes.len(),
        buffer.len() - prev_len,
        path.display()
    );
    Ok(Written { kind: PersistKind::Incremental, len: buffer.len() as u64 })
}

/// Replaces the file at `path` with a complete serialisation of `doc`. The
/// file is only replaced once the new serialisation loads.
pub(crate) fn rewrite_full(path: &Path, doc: &Document) -> EngineResult<u64> {
    let temp_path = path.with_extension("pdf.tmp");
    let mut doc = doc.clone();
    reset_trailer(&mut doc.trailer);

    let result = doc
        .save(&temp_path)
        .map_err(|err| EngineError::persist(path, err))
        .and_then(|_| Document::load(&temp_path).map_err(|err| EngineError::persist(path, err)))
        .and_then(|_| fs::rename(&temp_path, path).map_err(|err| EngineError::persist(path, err)));

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result?;

    let len = fs::metadata(path).map_err(|err| EngineError::persist(path, err))?.len();
    log::debug!("rewrote {} in full ({len} bytes)", path.display());
    Ok(len)
}

fn reset_trailer(trailer: &mut Dictionary) {
    let stale: Vec<Vec<u8>> = trailer
        .iter()
        .map(|(key, _)| key.clone())
        .filter(|key| !KEPT_TRAILER_KEYS.contains(&key.as_slice()))
        .collect();
    for key in stale {
        trailer.remove(&key);
    }
}

/// Puts `prev_bytes` back after a write that could not be reloaded.
pub(crate) fn restore(path: &Path, written: PersistKind, prev_bytes: &[u8]) {
    let result = match written {
        PersistKind::Incremental => OpenOptions::new()
            .write(true)
            .open(path)
            .and_then(|file| file.set_len(prev_bytes.len() as u64)),
        PersistKind::Full => fs::write(path, prev_bytes),
    };
    if let Err(err) = result {
        log::error!("failed to restore {} to its previous state: {err}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::single_page;
    use lopdf::Object;

    #[test]
    fn appended_update_keeps_the_previous_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        let mut doc = single_page(&[(72.0, 700.0, "Hello")]);
        doc.save(&path).unwrap();
        let before = fs::read(&path).unwrap();

        let previous = Document::load(&path).unwrap();
        let mut staged = previous.clone();
        let page_id = crate::objects::page_id(&staged, 0).unwrap();
        staged.get_dictionary_mut(page_id).unwrap().set("Rotate", Object::Integer(90));
        let mut changes = ChangeSet::default();
        changes.touch(page_id);

        let written = append_update(&path, &before, &previous, &staged, &changes).unwrap();
        let after = fs::read(&path).unwrap();
        assert_eq!(written.kind, PersistKind::Incremental);
        assert_eq!(after.len() as u64, written.len);
        assert!(after.len() > before.len());
        assert_eq!(&after[..before.len()], &before[..]);

        let reloaded = Document::load(&path).unwrap();
        let page_id = crate::objects::page_id(&reloaded, 0).unwrap();
        assert_eq!(crate::objects::page_rotation(&reloaded, page_id), 90);
    }

    #[test]
    fn full_rewrite_replaces_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        fs::write(&path, b"not a pdf").unwrap();

        let doc = single_page(&[(72.0, 700.0, "Hello")]);
        rewrite_full(&path, &doc).unwrap();

        assert!(Document::load(&path).is_ok());
        assert!(!path.with_extension("pdf.tmp").exists());
    }

    #[test]
    fn full_rewrite_after_an_update_starts_a_fresh_trailer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        let mut doc = single_page(&[(72.0, 700.0, "Hello")]);
        doc.save(&path).unwrap();

        let before = fs::read(&path).unwrap();
        let previous = Document::load(&path).unwrap();
        let mut staged = previous.clone();
        let page_id = crate::objects::page_id(&staged, 0).unwrap();
        staged.get_dictionary_mut(page_id).unwrap().set("Rotate", Object::Integer(90));
        let mut changes = ChangeSet::default();
        changes.touch(page_id);
        append_update(&path, &before, &previous, &staged, &changes).unwrap();

        let mut updated = Document::load(&path).unwrap();
        updated.trailer.set("Prev", Object::Integer(999_999));
        updated.trailer.set("XRefStm", Object::Integer(999_999));
        rewrite_full(&path, &updated).unwrap();

        let reloaded = Document::load(&path).unwrap();
        assert!(reloaded.trailer.get(b"Prev").is_err());
        assert!(reloaded.trailer.get(b"XRefStm").is_err());
        assert!(reloaded.trailer.get(b"Root").is_ok());
        let page_id = crate::objects::page_id(&reloaded, 0).unwrap();
        assert_eq!(crate::objects::page_rotation(&reloaded, page_id), 90);
    }

    #[test]
    fn restore_undoes_either_kind_of_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        let before = b"%PDF-1.5 previous revision".to_vec();

        fs::write(&path, [before.as_slice(), b" appended"].concat()).unwrap();
        restore(&path, PersistKind::Incremental, &before);
        assert_eq!(fs::read(&path).unwrap(), before);

        fs::write(&path, b"%PDF-1.5 a complete rewrite that is longer").unwrap();
        restore(&path, PersistKind::Full, &before);
        assert_eq!(fs::read(&path).unwrap(), before);
    }
}
