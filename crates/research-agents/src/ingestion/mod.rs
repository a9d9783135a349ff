//! Document ingestion
//!
//! Markdown filings are split by [`segment`] and written to the vector index
//! by [`Ingestor`], one partition per document.

pub mod ingestor;
pub mod segmenter;

pub use ingestor::{IngestReport, Ingestor};
pub use segmenter::{DocumentChunk, DocumentSegmenter, segment};
