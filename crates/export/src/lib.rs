//! Export converters for an open document session.
//!
//! Both sinks are read-only consumers: they pull page text out of a
//! [`DocumentSession`] and never touch the working copy.

use pdf_engine::{DocumentSession, EngineError};
use std::io::Write;

/// Marker written between pages of a flow export.
pub const PAGE_BREAK: char = '\u{0c}';

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    #[error("document error: {0}")]
    Engine(#[from] EngineError),
}

pub type ExportResult<T> = Result<T, ExportError>;

/// Options for the tabular export.
#[derive(Debug, Clone)]
pub struct TableExportConfig {
    pub include_headers: bool,
    pub delimiter: u8,
}

impl Default for TableExportConfig {
    fn default() -> Self {
        Self { include_headers: true, delimiter: b',' }
    }
}

/// Write one row per text line.
///
/// Columns:
/// - page: 1-based page number
/// - line: 1-based line number within the page, counting only non-blank lines
/// - text: the line's words joined by single spaces
pub fn export_table<W: Write>(
    session: &DocumentSession,
    writer: W,
    config: &TableExportConfig,
) -> ExportResult<usize> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(config.delimiter)
        .has_headers(config.include_headers)
        .from_writer(writer);

    if config.include_headers {
        csv_writer.write_record(["page", "line", "text"])?;
    }

    let mut rows = 0;
    for page in 0..session.page_count()? {
        let text = session.page_text(page)?;
        for (index, line) in text.lines().filter(|line| !line.trim().is_empty()).enumerate() {
            csv_writer.write_record([(page + 1).to_string(), (index + 1).to_string(), line.to_owned()])?;
            rows += 1;
        }
    }

    csv_writer.flush()?;
    log::info!("exported {rows} text rows from {}", session.original_path().display());
    Ok(rows)
}

/// Write each page as a paragraph headed `--- Page N ---`, with a form feed
/// between consecutive pages.
pub fn export_flow<W: Write>(session: &DocumentSession, mut writer: W) -> ExportResult<usize> {
    let page_count = session.page_count()?;
    for page in 0..page_count {
        if page > 0 {
            write!(writer, "{PAGE_BREAK}")?;
        }
        writeln!(writer, "--- Page {} ---", page + 1)?;
        let text = session.page_text(page)?;
        if !text.is_empty() {
            writeln!(writer, "{text}")?;
        }
    }

    writer.flush()?;
    log::info!("exported {page_count} pages from {}", session.original_path().display());
    Ok(page_count)
}
