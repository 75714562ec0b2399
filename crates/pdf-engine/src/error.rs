use crate::edit::TransactionPhase;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to open {path}: {reason}")]
    Open { path: PathBuf, reason: String },
    #[error("encrypted PDFs are not supported")]
    EncryptedUnsupported,
    #[error("document has no pages")]
    EmptyDocument,
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: usize, page_count: usize },
    #[error("failed to render page {page}: {reason}")]
    PageRender { page: usize, reason: String },
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("rotation of {0} degrees is not a multiple of 90")]
    InvalidRotation(i64),
    #[error("invalid text style: {0}")]
    InvalidStyle(#[from] doc_model::StyleError),
    #[error("{operation} on page {page} failed in phase {phase}: {source}")]
    Edit {
        operation: &'static str,
        page: usize,
        phase: TransactionPhase,
        #[source]
        source: Box<EngineError>,
    },
    #[error("failed to persist working copy {path}: {reason}")]
    Persist { path: PathBuf, reason: String },
    #[error("malformed page content: {0}")]
    Malformed(String),
    #[error("refusing to overwrite the original document {0}")]
    OverwriteOriginal(PathBuf),
    #[error("document session is closed")]
    Closed,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF structure error: {0}")]
    Pdf(#[from] lopdf::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub(crate) fn persist(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Persist { path: path.into(), reason: reason.to_string() }
    }
}
