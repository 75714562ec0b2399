//! Redact-then-reinsert edit transactions.
//!
//! A transaction works on a staged clone of the session's document. The
//! working copy on disk and the session's handle only change once the staged
//! state has been persisted and reloaded, so a failure at any phase leaves the
//! session exactly as it was.

use crate::annotate::add_highlight;
use crate::error::{EngineError, EngineResult};
use crate::geometry::{Point, Rect};
use crate::insert::{insert_text, InsertStyle};
use crate::layout::interpret;
use crate::locator::{RunStyle, TextPage, WordSpan};
use crate::objects::page_id;
use crate::pages;
use crate::persist::{append_update, restore, rewrite_full, ChangeSet, Written};
use crate::redact::apply_redactions;
use doc_model::{RgbColor, TextStyle};
use lopdf::{Document, ObjectId};
use std::fmt;
use std::path::Path;

/// Baseline of re-inserted text, as a fraction of the replaced box height.
const BASELINE_RATIO: f32 = 0.8;
/// Horizontal padding applied around deleted words.
const DELETE_PADDING: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPhase {
    Idle,
    Located,
    Redacted,
    Reinserted,
    Persisted,
    Aborted,
}

impl fmt::Display for TransactionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Located => "located",
            Self::Redacted => "redacted",
            Self::Reinserted => "reinserted",
            Self::Persisted => "persisted",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Result of a mutating call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Applied { matches: usize },
    NotFound,
    Unchanged,
}

impl EditOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// What an in-place edit at a point will act on.
#[derive(Debug, Clone, PartialEq)]
pub enum EditTarget {
    Existing { page: usize, span: WordSpan },
    NewText { page: usize, point: Point },
}

impl EditTarget {
    pub fn page(&self) -> usize {
        match self {
            Self::Existing { page, .. } | Self::NewText { page, .. } => *page,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistKind {
    Incremental,
    Full,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditRecord {
    pub revision: u64,
    pub operation: &'static str,
    pub page: usize,
    pub removed: Vec<String>,
    pub inserted: Vec<String>,
    pub persisted: PersistKind,
}

/// How inserted text picks its font, size and colour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum StylePolicy {
    Fixed(TextStyle),
    /// Copy the replaced run's style, falling back to the given one.
    Preserve(TextStyle),
}

impl From<TextStyle> for InsertStyle {
    fn from(style: TextStyle) -> Self {
        Self { font: style.family.builtin(), size: style.size, color: style.color }
    }
}

impl From<RunStyle> for InsertStyle {
    fn from(run: RunStyle) -> Self {
        Self { font: run.font, size: run.size, color: run.color }
    }
}

pub(crate) struct Committed {
    pub document: Document,
    pub record: EditRecord,
    pub len: u64,
}

pub(crate) struct Transaction {
    operation: &'static str,
    page: usize,
    page_id: ObjectId,
    staged: Document,
    changes: ChangeSet,
    phase: TransactionPhase,
    removed: Vec<String>,
    inserted: Vec<String>,
}

impl Transaction {
    pub fn begin(doc: &Document, operation: &'static str, page: usize) -> EngineResult<Self> {
        let page_id = page_id(doc, page)?;
        log::debug!("{operation} on page {page}: begin");
        Ok(Self {
            operation,
            page,
            page_id,
            staged: doc.clone(),
            changes: ChangeSet::default(),
            phase: TransactionPhase::Idle,
            removed: Vec::new(),
            inserted: Vec::new(),
        })
    }

    #[cfg(test)]
    pub fn phase(&self) -> TransactionPhase {
        self.phase
    }

    pub fn page_id(&self) -> ObjectId {
        self.page_id
    }

    pub fn text_page(&self) -> EngineResult<TextPage> {
        let layout = interpret(&self.staged, self.page_id).map_err(|err| self.fail(err))?;
        Ok(TextPage::build(layout.glyphs))
    }

    fn advance(&mut self, phase: TransactionPhase) {
        log::debug!("{} on page {}: {} -> {}", self.operation, self.page, self.phase, phase);
        self.phase = phase;
    }

    pub fn located(&mut self) {
        self.advance(TransactionPhase::Located);
    }

    pub fn abort(mut self) -> EditOutcome {
        self.advance(TransactionPhase::Aborted);
        EditOutcome::NotFound
    }

    pub fn redact(&mut self, spans: &[WordSpan], padding: f32) -> EngineResult<usize> {
        let areas: Vec<Rect> = spans.iter().map(|span| span.bbox.pad_x(padding)).collect();
        let removed = apply_redactions(&mut self.staged, self.page_id, &areas, &mut self.changes)
            .map_err(|err| self.fail(err))?;
        self.removed.extend(spans.iter().map(|span| span.text.clone()));
        self.advance(TransactionPhase::Redacted);
        Ok(removed)
    }

    pub fn insert(&mut self, origin: Point, text: &str, style: InsertStyle) -> EngineResult<()> {
        if !style.size.is_finite() || style.size <= 0.0 {
            return Err(self.fail(EngineError::InvalidGeometry(format!(
                "font size must be positive, got {}",
                style.size
            ))));
        }
        insert_text(&mut self.staged, self.page_id, origin, text, style, &mut self.changes)
            .map_err(|err| self.fail(err))?;
        self.inserted.push(text.to_string());
        self.advance(TransactionPhase::Reinserted);
        Ok(())
    }

    pub fn highlight(&mut self, span: &WordSpan, color: RgbColor) -> EngineResult<()> {
        add_highlight(&mut self.staged, self.page_id, span.bbox, color, &mut self.changes)
            .map_err(|err| self.fail(err))?;
        self.advance(TransactionPhase::Reinserted);
        Ok(())
    }

    pub fn rotate_pages(&mut self, page_ids: &[ObjectId], degrees: u16) -> EngineResult<()> {
        for id in page_ids {
            pages::set_rotation(&mut self.staged, *id, degrees, &mut self.changes)
                .map_err(|err| self.fail(err))?;
        }
        self.advance(TransactionPhase::Reinserted);
        Ok(())
    }

    pub fn remove_page(&mut self) -> EngineResult<()> {
        pages::remove_page(&mut self.staged, self.page_id, &mut self.changes)
            .map_err(|err| self.fail(err))?;
        self.advance(TransactionPhase::Redacted);
        Ok(())
    }

    /// Writes the staged document to `path` and reloads it from disk.
    pub fn persist(
        mut self,
        path: &Path,
        previous: &Document,
        kind: PersistKind,
    ) -> EngineResult<Committed> {
        let prev_bytes =
            std::fs::read(path).map_err(|err| self.fail(EngineError::persist(path, err)))?;

        let written = match kind {
            PersistKind::Incremental => {
                append_update(path, &prev_bytes, previous, &self.staged, &self.changes)
            }
            PersistKind::Full => {
                rewrite_full(path, &self.staged).map(|len| Written { kind: PersistKind::Full, len })
            }
        }
        .map_err(|err| self.fail(err))?;

        let document = match Document::load(path) {
            Ok(document) => document,
            Err(err) => {
                restore(path, written.kind, &prev_bytes);
                return Err(self.fail(EngineError::persist(path, err)));
            }
        };

        self.advance(TransactionPhase::Persisted);
        Ok(Committed {
            document,
            len: written.len,
            record: EditRecord {
                revision: 0,
                operation: self.operation,
                page: self.page,
                removed: std::mem::take(&mut self.removed),
                inserted: std::mem::take(&mut self.inserted),
                persisted: written.kind,
            },
        })
    }

    fn fail(&self, source: EngineError) -> EngineError {
        log::debug!("{} on page {} failed in phase {}", self.operation, self.page, self.phase);
        EngineError::Edit {
            operation: self.operation,
            page: self.page,
            phase: self.phase,
            source: Box::new(source),
        }
    }
}

fn baseline_origin(bbox: &Rect) -> Point {
    Point::new(bbox.x0, bbox.y0 + BASELINE_RATIO * bbox.height())
}

/// Replaces every occurrence of `old` with `new`. Returns the number of
/// occurrences replaced, zero when there was nothing to do.
pub(crate) fn replace(
    tx: &mut Transaction,
    old: &str,
    new: &str,
    policy: StylePolicy,
) -> EngineResult<usize> {
    if old.trim().is_empty() || new.trim().is_empty() {
        return Ok(0);
    }
    let page = tx.text_page()?;
    let matches = page.search(old);
    if matches.is_empty() {
        return Ok(0);
    }
    tx.located();

    let styles: Vec<InsertStyle> = matches
        .iter()
        .map(|span| match policy {
            StylePolicy::Fixed(style) => style.into(),
            StylePolicy::Preserve(fallback) => {
                page.style_within(&span.bbox).map(InsertStyle::from).unwrap_or(fallback.into())
            }
        })
        .collect();

    tx.redact(&matches, 0.0)?;
    for (span, style) in matches.iter().zip(styles) {
        tx.insert(baseline_origin(&span.bbox), new, style)?;
    }
    Ok(matches.len())
}

/// Removes words exactly equal to `text`.
pub(crate) fn delete(tx: &mut Transaction, text: &str) -> EngineResult<usize> {
    let matches = tx.text_page()?.find_exact(text);
    if matches.is_empty() {
        return Ok(0);
    }
    tx.located();
    tx.redact(&matches, DELETE_PADDING)?;
    Ok(matches.len())
}

pub(crate) fn highlight(tx: &mut Transaction, text: &str, color: RgbColor) -> EngineResult<usize> {
    let matches = tx.text_page()?.search(text);
    if matches.is_empty() {
        return Ok(0);
    }
    tx.located();
    for span in &matches {
        tx.highlight(span, color)?;
    }
    Ok(matches.len())
}

pub(crate) fn insert_at(
    tx: &mut Transaction,
    point: Point,
    text: &str,
    style: TextStyle,
) -> EngineResult<()> {
    tx.located();
    tx.insert(point, text, style.into())
}

/// Applies an in-place edit of an existing word.
pub(crate) fn rewrite_span(
    tx: &mut Transaction,
    span: &WordSpan,
    new_text: &str,
    style: TextStyle,
) -> EngineResult<()> {
    tx.located();
    if new_text.is_empty() {
        tx.redact(std::slice::from_ref(span), DELETE_PADDING)?;
        return Ok(());
    }
    tx.redact(std::slice::from_ref(span), 0.0)?;
    tx.insert(baseline_origin(&span.bbox), new_text, style.into())
}
