//! PDF to Markdown conversion layer
//!
//! This module provides the conversion backend behind the batch processor:
//! an owned document model with Markdown serialization and graceful-
//! degradation export chains, plus a PDFium-backed converter.

mod document;
mod engine;

pub use document::{
    markdown_with_fallback, metadata_map, DocItem, DocMetadata, Document, DocumentExport,
    ImageRefMode,
};
pub use engine::{Converter, PdfiumConverter, PipelineOptions};
