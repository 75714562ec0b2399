//! Document edit engine: a working copy of a PDF that can be rendered,
//! searched and edited in place, with every edit appended to the working copy
//! as an incremental update.

mod annotate;
mod edit;
mod error;
mod fonts;
pub mod geometry;
mod insert;
mod layout;
mod locator;
mod objects;
mod pages;
mod persist;
mod raster;
mod redact;
mod session;

#[cfg(test)]
mod test_support;

pub use edit::{EditOutcome, EditRecord, EditTarget, PersistKind, TransactionPhase};
pub use error::{EngineError, EngineResult};
pub use geometry::{
    to_device_space, to_document_space, PageSize, Point, Rect, RenderedSize, Zoom,
};
pub use locator::WordSpan;
#[cfg(feature = "pdfium")]
pub use raster::PdfiumRasterizer;
pub use raster::{PageRasterizer, PreviewRasterizer, RasterPage, RenderInput};
pub use session::{DocumentSession, SessionOptions};
