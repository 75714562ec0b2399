//! Working-copy lifecycle for one opened document.

use crate::edit::{
    self, EditOutcome, EditRecord, EditTarget, PersistKind, StylePolicy, Transaction,
};
use crate::error::{EngineError, EngineResult};
use crate::geometry::{PageSize, Point, Zoom};
use crate::layout::interpret;
use crate::locator::{TextPage, WordSpan};
use crate::objects::{is_encrypted, page_box, page_count, page_id, page_rotation};
use crate::pages::normalize_rotation;
use crate::raster::{PageRasterizer, PreviewRasterizer, RasterPage, RenderInput};
use doc_model::{Preferences, RgbColor, TextStyle};
use lopdf::Document;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const HISTORY_LIMIT: usize = 50;
const WORKING_DIR_PREFIX: &str = "pdf_viewer_";

#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Directory the private working directory is created in.
    pub working_root: Option<PathBuf>,
    pub zoom: Zoom,
    pub zoom_step: f32,
    pub style: TextStyle,
    pub highlight_color: RgbColor,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            working_root: None,
            zoom: Zoom::ACTUAL_SIZE,
            zoom_step: 1.2,
            style: TextStyle::default(),
            highlight_color: RgbColor::YELLOW,
        }
    }
}

impl SessionOptions {
    pub fn from_preferences(preferences: &Preferences) -> EngineResult<Self> {
        preferences.text_style.validate()?;
        if !preferences.zoom_step.is_finite() || preferences.zoom_step <= 1.0 {
            return Err(EngineError::InvalidGeometry(format!(
                "zoom step must be greater than 1, got {}",
                preferences.zoom_step
            )));
        }
        Ok(Self {
            working_root: preferences.working_root.clone(),
            zoom: Zoom::new(preferences.initial_zoom)?,
            zoom_step: preferences.zoom_step,
            style: preferences.text_style,
            highlight_color: preferences.highlight_color,
        })
    }
}

/// An opened document: the untouched original, a private working copy that
/// every edit is persisted to, and the parsed handle of that working copy.
pub struct DocumentSession {
    original_path: PathBuf,
    working_dir: Option<TempDir>,
    working_path: PathBuf,
    document: Option<Document>,
    rasterizer: Box<dyn PageRasterizer>,
    zoom: Zoom,
    zoom_step: f32,
    style: TextStyle,
    highlight_color: RgbColor,
    revision: u64,
    history: VecDeque<EditRecord>,
}

impl std::fmt::Debug for DocumentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSession")
            .field("original_path", &self.original_path)
            .field("working_path", &self.working_path)
            .field("open", &self.is_open())
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}

impl DocumentSession {
    pub fn open(source: impl AsRef<Path>) -> EngineResult<Self> {
        Self::open_with(source, SessionOptions::default())
    }

    pub fn open_with(source: impl AsRef<Path>, options: SessionOptions) -> EngineResult<Self> {
        let source = source.as_ref();
        let open_error =
            |reason: String| EngineError::Open { path: source.to_path_buf(), reason };

        let bytes = fs::read(source).map_err(|err| open_error(err.to_string()))?;
        if is_encrypted(&bytes) {
            return Err(EngineError::EncryptedUnsupported);
        }

        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix(WORKING_DIR_PREFIX);
            builder
        };
        let working_dir = match &options.working_root {
            Some(root) => {
                fs::create_dir_all(root).map_err(|err| open_error(err.to_string()))?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(|err| open_error(format!("creating working directory: {err}")))?;

        let name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());
        let working_path = working_dir.path().join(format!("working_{name}"));
        fs::write(&working_path, &bytes).map_err(|err| open_error(err.to_string()))?;

        let document = Document::load(&working_path).map_err(|err| open_error(err.to_string()))?;
        let pages = page_count(&document);
        if pages == 0 {
            return Err(EngineError::EmptyDocument);
        }

        log::info!(
            "opened {} ({pages} pages) as {}",
            source.display(),
            working_path.display()
        );
        Ok(Self {
            original_path: source.to_path_buf(),
            working_dir: Some(working_dir),
            working_path,
            document: Some(document),
            rasterizer: Box::new(PreviewRasterizer),
            zoom: options.zoom,
            zoom_step: options.zoom_step,
            style: options.style,
            highlight_color: options.highlight_color,
            revision: 0,
            history: VecDeque::new(),
        })
    }

    pub fn set_rasterizer(&mut self, rasterizer: Box<dyn PageRasterizer>) {
        self.rasterizer = rasterizer;
    }

    fn document(&self) -> EngineResult<&Document> {
        self.document.as_ref().ok_or(EngineError::Closed)
    }

    pub fn is_open(&self) -> bool {
        self.document.is_some()
    }

    pub fn original_path(&self) -> &Path {
        &self.original_path
    }

    pub fn working_copy_path(&self) -> &Path {
        &self.working_path
    }

    pub fn working_copy_len(&self) -> EngineResult<u64> {
        self.document()?;
        Ok(fs::metadata(&self.working_path)?.len())
    }

    /// Number of committed mutations since the session was opened.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn history(&self) -> &VecDeque<EditRecord> {
        &self.history
    }

    pub fn page_count(&self) -> EngineResult<usize> {
        Ok(page_count(self.document()?))
    }

    pub fn page_size(&self, page: usize) -> EngineResult<PageSize> {
        let doc = self.document()?;
        Ok(page_box(doc, page_id(doc, page)?).size())
    }

    pub fn page_rotation(&self, page: usize) -> EngineResult<u16> {
        let doc = self.document()?;
        Ok(page_rotation(doc, page_id(doc, page)?))
    }

    // Zoom and style

    pub fn zoom(&self) -> Zoom {
        self.zoom
    }

    pub fn set_zoom(&mut self, value: f32) -> EngineResult<()> {
        self.zoom = Zoom::new(value)?;
        Ok(())
    }

    pub fn zoom_in(&mut self) -> EngineResult<Zoom> {
        self.zoom = self.zoom.scaled_by(self.zoom_step)?;
        Ok(self.zoom)
    }

    pub fn zoom_out(&mut self) -> EngineResult<Zoom> {
        self.zoom = self.zoom.scaled_by(1.0 / self.zoom_step)?;
        Ok(self.zoom)
    }

    pub fn style(&self) -> TextStyle {
        self.style
    }

    pub fn set_style(&mut self, style: TextStyle) -> EngineResult<()> {
        style.validate()?;
        self.style = style;
        Ok(())
    }

    pub fn highlight_color(&self) -> RgbColor {
        self.highlight_color
    }

    // Rendering

    pub fn render(&self, page: usize) -> EngineResult<RasterPage> {
        self.render_at(page, self.zoom)
    }

    pub fn render_at(&self, page: usize, zoom: Zoom) -> EngineResult<RasterPage> {
        let document = self.document().map_err(|err| EngineError::PageRender {
            page,
            reason: err.to_string(),
        })?;
        self.rasterizer.render(RenderInput {
            document,
            working_copy: &self.working_path,
            page,
            zoom,
        })
    }

    // Text queries

    fn text_page(&self, page: usize) -> EngineResult<TextPage> {
        let doc = self.document()?;
        let layout = interpret(doc, page_id(doc, page)?)?;
        Ok(TextPage::build(layout.glyphs))
    }

    pub fn words(&self, page: usize) -> EngineResult<Vec<WordSpan>> {
        Ok(self.text_page(page)?.words())
    }

    pub fn hit_test(&self, page: usize, point: Point) -> EngineResult<Option<WordSpan>> {
        Ok(self.text_page(page)?.hit_test(point))
    }

    pub fn search(&self, page: usize, query: &str) -> EngineResult<Vec<WordSpan>> {
        Ok(self.text_page(page)?.search(query))
    }

    pub fn find_exact(&self, page: usize, query: &str) -> EngineResult<Vec<WordSpan>> {
        Ok(self.text_page(page)?.find_exact(query))
    }

    pub fn contains_text(&self, page: usize, query: &str) -> EngineResult<bool> {
        Ok(!self.search(page, query)?.is_empty())
    }

    pub fn page_text(&self, page: usize) -> EngineResult<String> {
        Ok(self.text_page(page)?.text())
    }

    // Mutations

    fn transact<F>(
        &mut self,
        operation: &'static str,
        page: usize,
        kind: PersistKind,
        plan: F,
    ) -> EngineResult<EditOutcome>
    where
        F: FnOnce(&mut Transaction) -> EngineResult<usize>,
    {
        let document = self.document()?;
        let mut tx = Transaction::begin(document, operation, page)?;
        let matches = plan(&mut tx)?;
        if matches == 0 {
            return Ok(tx.abort());
        }

        let committed = tx.persist(&self.working_path, document, kind)?;
        self.revision += 1;
        let mut record = committed.record;
        record.revision = self.revision;
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(record);
        self.document = Some(committed.document);

        log::info!(
            "{operation} on page {page} committed as revision {} ({} bytes)",
            self.revision,
            committed.len
        );
        Ok(EditOutcome::Applied { matches })
    }

    fn resolve_style(&self, style: Option<TextStyle>) -> EngineResult<TextStyle> {
        let style = style.unwrap_or(self.style);
        style.validate()?;
        Ok(style)
    }

    pub fn replace_text(
        &mut self,
        page: usize,
        old: &str,
        new: &str,
        style: Option<TextStyle>,
    ) -> EngineResult<EditOutcome> {
        let policy = StylePolicy::Fixed(self.resolve_style(style)?);
        self.transact("replace_text", page, PersistKind::Incremental, |tx| {
            edit::replace(tx, old, new, policy)
        })
    }

    /// Like [`Self::replace_text`], but each replacement copies the font, size
    /// and colour of the text it replaces.
    pub fn replace_text_preserving_style(
        &mut self,
        page: usize,
        old: &str,
        new: &str,
    ) -> EngineResult<EditOutcome> {
        let policy = StylePolicy::Preserve(self.style);
        self.transact("replace_text_preserving_style", page, PersistKind::Incremental, |tx| {
            edit::replace(tx, old, new, policy)
        })
    }

    pub fn delete_text(&mut self, page: usize, exact: &str) -> EngineResult<EditOutcome> {
        self.transact("delete_text", page, PersistKind::Incremental, |tx| edit::delete(tx, exact))
    }

    pub fn add_highlight(&mut self, page: usize, text: &str) -> EngineResult<EditOutcome> {
        let color = self.highlight_color;
        self.transact("add_highlight", page, PersistKind::Incremental, |tx| {
            edit::highlight(tx, text, color)
        })
    }

    pub fn insert_text_at(
        &mut self,
        page: usize,
        point: Point,
        text: &str,
        style: Option<TextStyle>,
    ) -> EngineResult<EditOutcome> {
        let style = self.resolve_style(style)?;
        if text.trim().is_empty() {
            return Ok(EditOutcome::Unchanged);
        }
        self.transact("insert_text", page, PersistKind::Incremental, |tx| {
            edit::insert_at(tx, point, text, style).map(|()| 1)
        })
    }

    /// Resolves what an edit at `point` acts on: the word under it, or a new
    /// text position when there is none.
    pub fn edit_at(&self, page: usize, point: Point) -> EngineResult<EditTarget> {
        Ok(match self.hit_test(page, point)? {
            Some(span) => EditTarget::Existing { page, span },
            None => EditTarget::NewText { page, point },
        })
    }

    pub fn commit_edit(&mut self, target: &EditTarget, new_text: &str) -> EngineResult<EditOutcome> {
        let new_text = new_text.trim();
        match target {
            EditTarget::Existing { page, span } => {
                if new_text == span.text.trim() {
                    return Ok(EditOutcome::Unchanged);
                }
                let style = self.style;
                self.transact("commit_edit", *page, PersistKind::Incremental, |tx| {
                    edit::rewrite_span(tx, span, new_text, style).map(|()| 1)
                })
            }
            EditTarget::NewText { page, point } => {
                self.insert_text_at(*page, *point, new_text, None)
            }
        }
    }

    pub fn rotate_page(&mut self, page: usize, degrees: i64) -> EngineResult<EditOutcome> {
        let degrees = normalize_rotation(degrees)?;
        self.transact("rotate_page", page, PersistKind::Full, |tx| {
            tx.located();
            let id = tx.page_id();
            tx.rotate_pages(&[id], degrees)?;
            Ok(1)
        })
    }

    pub fn rotate_all_pages(&mut self, degrees: i64) -> EngineResult<EditOutcome> {
        let degrees = normalize_rotation(degrees)?;
        let ids: Vec<_> = self.document()?.get_pages().into_values().collect();
        self.transact("rotate_all_pages", 0, PersistKind::Full, |tx| {
            tx.located();
            tx.rotate_pages(&ids, degrees)?;
            Ok(ids.len())
        })
    }

    pub fn remove_page(&mut self, page: usize) -> EngineResult<EditOutcome> {
        self.transact("remove_page", page, PersistKind::Incremental, |tx| {
            tx.located();
            tx.remove_page()?;
            Ok(1)
        })
    }

    // Lifecycle

    /// Copies the working copy's bytes to `dest`. The original document is
    /// never overwritten.
    pub fn save_as(&self, dest: impl AsRef<Path>) -> EngineResult<()> {
        let dest = dest.as_ref();
        self.document()?;
        if same_file(dest, &self.original_path) {
            return Err(EngineError::OverwriteOriginal(dest.to_path_buf()));
        }
        fs::copy(&self.working_path, dest).map_err(|err| EngineError::persist(dest, err))?;
        log::info!("saved revision {} to {}", self.revision, dest.display());
        Ok(())
    }

    /// Drops the document handle and deletes the working directory. Calling it
    /// again is a no-op.
    pub fn close(&mut self) {
        self.document = None;
        if let Some(dir) = self.working_dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => log::info!("closed session for {}", self.original_path.display()),
                Err(err) => {
                    log::warn!("failed to remove working directory {}: {err}", path.display())
                }
            }
        }
    }
}

impl Drop for DocumentSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{multi_page, pdf_with_pages, save, single_page};
    use lopdf::dictionary;

    struct Fixture {
        dir: tempfile::TempDir,
        source: PathBuf,
    }

    impl Fixture {
        fn new(mut doc: Document) -> Self {
            let dir = tempfile::tempdir().expect("temp dir");
            let source = save(&mut doc, dir.path(), "source.pdf");
            Self { dir, source }
        }

        fn open(&self) -> DocumentSession {
            let options = SessionOptions {
                working_root: Some(self.dir.path().join("work")),
                ..SessionOptions::default()
            };
            DocumentSession::open_with(&self.source, options).expect("open should succeed")
        }
    }

    fn texts(words: &[WordSpan]) -> Vec<&str> {
        words.iter().map(|w| w.text.as_str()).collect()
    }

    #[test]
    fn session_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<DocumentSession>();
    }

    #[test]
    fn working_copy_lives_in_a_private_directory() {
        let fixture = Fixture::new(single_page(&[(72.0, 700.0, "Hello")]));
        let session = fixture.open();

        let working = session.working_copy_path();
        assert!(working.exists());
        assert_eq!(working.file_name().unwrap(), "working_source.pdf");
        let dir_name = working.parent().unwrap().file_name().unwrap().to_string_lossy();
        assert!(dir_name.starts_with("pdf_viewer_"));
        assert!(working.starts_with(fixture.dir.path().join("work")));
        assert_eq!(session.page_count().unwrap(), 1);
        assert_eq!(session.page_size(0).unwrap(), PageSize { width_pt: 612.0, height_pt: 792.0 });
    }

    #[test]
    fn malformed_to_unicode_maps_fall_back_to_the_encoding() {
        let mut doc = single_page(&[(72.0, 700.0, "Hello")]);
        let cmap = b"beginbfchar <48> <000\xff00> endbfchar\n\
            beginbfrange <FFFFFFFF> <FFFFFFFF> <0041> endbfrange"
            .to_vec();
        let cmap_id = doc.add_object(lopdf::Stream::new(lopdf::Dictionary::new(), cmap));
        let font = doc
            .objects
            .values_mut()
            .filter_map(|obj| obj.as_dict_mut().ok())
            .find(|dict| dict.has(b"BaseFont"))
            .unwrap();
        font.set("ToUnicode", cmap_id);

        let fixture = Fixture::new(doc);
        let session = fixture.open();
        assert_eq!(texts(&session.words(0).unwrap()), ["Hello"]);
    }

    #[test]
    fn open_rejects_bad_inputs() {
        let dir = tempfile::tempdir().unwrap();

        let missing = DocumentSession::open(dir.path().join("missing.pdf")).unwrap_err();
        assert!(matches!(missing, EngineError::Open { .. }));

        let garbage = dir.path().join("garbage.pdf");
        fs::write(&garbage, b"definitely not a pdf").unwrap();
        assert!(matches!(DocumentSession::open(&garbage), Err(EngineError::Open { .. })));

        let mut encrypted = single_page(&[(72.0, 700.0, "secret")]);
        encrypted.trailer.set("Encrypt", dictionary! { "Filter" => "Standard" });
        let encrypted = save(&mut encrypted, dir.path(), "encrypted.pdf");
        assert!(matches!(DocumentSession::open(&encrypted), Err(EngineError::EncryptedUnsupported)));

        let empty = save(&mut pdf_with_pages(vec![]), dir.path(), "empty.pdf");
        assert!(matches!(DocumentSession::open(&empty), Err(EngineError::EmptyDocument)));
    }

    #[test]
    fn replace_text_swaps_the_words() {
        let fixture = Fixture::new(single_page(&[(72.0, 700.0, "Hello world")]));
        let mut session = fixture.open();

        let outcome = session.replace_text(0, "Hello", "Hi", None).unwrap();
        assert_eq!(outcome, EditOutcome::Applied { matches: 1 });
        assert!(session.search(0, "Hello").unwrap().is_empty());
        assert_eq!(session.search(0, "Hi").unwrap().len(), 1);
        assert!(session.contains_text(0, "world").unwrap());
        assert_eq!(session.revision(), 1);
    }

    #[test]
    fn replace_with_empty_arguments_is_not_found() {
        let fixture = Fixture::new(single_page(&[(72.0, 700.0, "Hello")]));
        let mut session = fixture.open();
        let len = session.working_copy_len().unwrap();

        assert_eq!(session.replace_text(0, "", "Hi", None).unwrap(), EditOutcome::NotFound);
        assert_eq!(session.replace_text(0, "Hello", "", None).unwrap(), EditOutcome::NotFound);
        assert_eq!(session.replace_text(0, "Absent", "x", None).unwrap(), EditOutcome::NotFound);
        assert_eq!(session.revision(), 0);
        assert_eq!(session.working_copy_len().unwrap(), len);
    }

    #[test]
    fn delete_only_touches_exact_words() {
        let fixture = Fixture::new(single_page(&[(72.0, 700.0, "Cat Category")]));
        let mut session = fixture.open();

        let outcome = session.delete_text(0, "Cat").unwrap();
        assert_eq!(outcome, EditOutcome::Applied { matches: 1 });
        assert_eq!(texts(&session.words(0).unwrap()), ["Category"]);
        assert_eq!(session.delete_text(0, "Cat").unwrap(), EditOutcome::NotFound);
    }

    #[test]
    fn highlight_is_not_destructive() {
        let fixture = Fixture::new(single_page(&[(72.0, 700.0, "Mark this word")]));
        let mut session = fixture.open();
        let before = session.search(0, "this").unwrap();
        let render_before = session.render(0).unwrap();

        assert_eq!(session.add_highlight(0, "this").unwrap(), EditOutcome::Applied { matches: 1 });
        assert_eq!(session.search(0, "this").unwrap(), before);
        assert_ne!(session.render(0).unwrap(), render_before);

        assert!(session.add_highlight(0, "this").unwrap().is_applied());
        assert_eq!(session.revision(), 2);
    }

    #[test]
    fn removing_a_page_shifts_renders() {
        let fixture = Fixture::new(multi_page(&["one", "two", "three"]));
        let mut session = fixture.open();
        let third = session.render(2).unwrap();

        session.remove_page(1).unwrap();

        assert_eq!(session.page_count().unwrap(), 2);
        assert_eq!(session.render(1).unwrap(), third);
        assert_eq!(session.page_text(1).unwrap(), "three");
    }

    #[test]
    fn unchanged_commit_edit_does_nothing() {
        let fixture = Fixture::new(single_page(&[(72.0, 700.0, "Hello world")]));
        let mut session = fixture.open();
        let word = session.words(0).unwrap()[1].clone();
        let len = session.working_copy_len().unwrap();

        let target = session.edit_at(0, word.bbox.center()).unwrap();
        assert_eq!(target, EditTarget::Existing { page: 0, span: word });
        assert_eq!(session.commit_edit(&target, " world ").unwrap(), EditOutcome::Unchanged);
        assert_eq!(session.revision(), 0);
        assert_eq!(session.working_copy_len().unwrap(), len);
    }

    #[test]
    fn commit_edit_rewrites_deletes_and_inserts() {
        let fixture = Fixture::new(single_page(&[(72.0, 700.0, "Hello world")]));
        let mut session = fixture.open();

        let hello = session.words(0).unwrap()[0].bbox.center();
        let target = session.edit_at(0, hello).unwrap();
        session.commit_edit(&target, "Hey").unwrap();
        // Inserted text is drawn after the existing content.
        assert_eq!(texts(&session.words(0).unwrap()), ["world", "Hey"]);

        let world = session.find_exact(0, "world").unwrap()[0].bbox.center();
        let target = session.edit_at(0, world).unwrap();
        session.commit_edit(&target, "").unwrap();
        assert_eq!(texts(&session.words(0).unwrap()), ["Hey"]);

        let blank = Point::new(100.0, 400.0);
        let target = session.edit_at(0, blank).unwrap();
        assert_eq!(target, EditTarget::NewText { page: 0, point: blank });
        session.commit_edit(&target, "Fresh").unwrap();
        assert!(session.contains_text(0, "Fresh").unwrap());
        assert_eq!(session.revision(), 3);
    }

    #[test]
    fn insert_text_with_nothing_to_insert_is_unchanged() {
        let fixture = Fixture::new(single_page(&[]));
        let mut session = fixture.open();
        let outcome = session.insert_text_at(0, Point::new(10.0, 10.0), "   ", None).unwrap();
        assert_eq!(outcome, EditOutcome::Unchanged);

        let bad = TextStyle::default().with_size(-1.0);
        let err = session.insert_text_at(0, Point::new(10.0, 10.0), "x", Some(bad)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidStyle(_)));
    }

    #[test]
    fn each_commit_appends_to_the_working_copy() {
        let fixture = Fixture::new(single_page(&[(72.0, 700.0, "Hello world")]));
        let mut session = fixture.open();
        let original = fs::read(&fixture.source).unwrap();

        let before = fs::read(session.working_copy_path()).unwrap();
        session.replace_text(0, "world", "there", None).unwrap();
        let after = fs::read(session.working_copy_path()).unwrap();

        assert!(after.len() > before.len());
        assert!(after.starts_with(&before));
        assert!(Document::load(session.working_copy_path()).is_ok());
        assert_eq!(fs::read(&fixture.source).unwrap(), original);

        let record = session.history().back().unwrap();
        assert_eq!(record.revision, 1);
        assert_eq!(record.operation, "replace_text");
        assert_eq!(record.persisted, PersistKind::Incremental);
    }

    #[test]
    fn rotation_is_validated_and_rewrites_the_file() {
        let fixture = Fixture::new(multi_page(&["one", "two"]));
        let mut session = fixture.open();

        let err = session.rotate_page(0, 45).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRotation(45)));

        session.rotate_page(0, 90).unwrap();
        assert_eq!(session.page_rotation(0).unwrap(), 90);
        let raster = session.render(0).unwrap();
        assert_eq!((raster.width(), raster.height()), (792, 612));
        assert_eq!(session.history().back().unwrap().persisted, PersistKind::Full);

        assert_eq!(session.rotate_all_pages(-90).unwrap(), EditOutcome::Applied { matches: 2 });
        assert_eq!(session.page_rotation(0).unwrap(), 270);
        assert_eq!(session.page_rotation(1).unwrap(), 270);
    }

    #[test]
    fn full_rewrites_after_appended_updates_stay_loadable() {
        let fixture = Fixture::new(single_page(&[(72.0, 700.0, "Hello world")]));
        let mut session = fixture.open();

        session.replace_text(0, "Hello", "Hi", None).unwrap();
        assert_eq!(session.rotate_all_pages(90).unwrap(), EditOutcome::Applied { matches: 1 });
        assert!(Document::load(session.working_copy_path()).is_ok());
        session.replace_text(0, "world", "there", None).unwrap();

        let kinds: Vec<PersistKind> = session.history().iter().map(|r| r.persisted).collect();
        assert_eq!(kinds, [PersistKind::Incremental, PersistKind::Full, PersistKind::Incremental]);

        let dest = fixture.dir.path().join("chained.pdf");
        session.save_as(&dest).unwrap();
        let reopened = DocumentSession::open(&dest).expect("saved copy should reopen");
        assert_eq!(reopened.page_rotation(0).unwrap(), 90);
        assert_eq!(reopened.search(0, "Hi").unwrap().len(), 1);
        assert_eq!(reopened.search(0, "there").unwrap().len(), 1);
        assert!(reopened.search(0, "world").unwrap().is_empty());
    }

    #[test]
    fn save_as_copies_the_working_copy() {
        let fixture = Fixture::new(single_page(&[(72.0, 700.0, "Hello")]));
        let mut session = fixture.open();
        session.replace_text(0, "Hello", "Bye", None).unwrap();

        let dest = fixture.dir.path().join("out.pdf");
        session.save_as(&dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), fs::read(session.working_copy_path()).unwrap());

        let err = session.save_as(&fixture.source).unwrap_err();
        assert!(matches!(err, EngineError::OverwriteOriginal(_)));
    }

    #[test]
    fn close_removes_the_working_directory() {
        let fixture = Fixture::new(single_page(&[(72.0, 700.0, "Hello")]));
        let mut session = fixture.open();
        let dir = session.working_copy_path().parent().unwrap().to_path_buf();

        session.close();
        assert!(!dir.exists());
        session.close();

        assert!(matches!(session.words(0), Err(EngineError::Closed)));
        assert!(matches!(session.render(0), Err(EngineError::PageRender { page: 0, .. })));
        assert!(matches!(session.delete_text(0, "Hello"), Err(EngineError::Closed)));
    }

    #[test]
    fn dropping_the_session_cleans_up() {
        let fixture = Fixture::new(single_page(&[(72.0, 700.0, "Hello")]));
        let dir = {
            let session = fixture.open();
            session.working_copy_path().parent().unwrap().to_path_buf()
        };
        assert!(!dir.exists());
    }

    #[test]
    fn zoom_steps_multiply() {
        let fixture = Fixture::new(single_page(&[]));
        let mut session = fixture.open();
        assert!(session.set_zoom(0.0).is_err());
        session.set_zoom(2.0).unwrap();
        assert!((session.zoom_in().unwrap().value() - 2.4).abs() < 1e-5);
        assert!((session.zoom_out().unwrap().value() - 2.0).abs() < 1e-5);
        assert_eq!(session.render(0).unwrap().width(), 1224);
    }

    #[test]
    fn options_come_from_preferences() {
        let preferences = Preferences { initial_zoom: 1.5, ..Preferences::default() };
        let options = SessionOptions::from_preferences(&preferences).unwrap();
        assert_eq!(options.zoom.value(), 1.5);

        let broken = Preferences { initial_zoom: 0.0, ..Preferences::default() };
        assert!(SessionOptions::from_preferences(&broken).is_err());
    }

    #[test]
    fn history_is_bounded() {
        let fixture = Fixture::new(single_page(&[(72.0, 700.0, "word")]));
        let mut session = fixture.open();
        for _ in 0..(HISTORY_LIMIT + 2) {
            session.add_highlight(0, "word").unwrap();
        }
        assert_eq!(session.history().len(), HISTORY_LIMIT);
        assert_eq!(session.history().front().unwrap().revision, 3);
    }
}
