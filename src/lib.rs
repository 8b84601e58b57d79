//! PDF to Markdown MCP Server Library
//!
//! This crate converts directories of PDF files to Markdown, exposed two ways:
//! - `convert_pdf` MCP tool: batch conversion over the tool-calling protocol
//! - `process` CLI subcommand: the same batch printed as JSON on stdout
//!
//! Conversion optionally writes one Markdown file per PDF and extracts
//! embedded pictures and tables as PNG files.

pub mod batch;
pub mod convert;
pub mod error;
pub mod scratch;
pub mod server;

pub use batch::{
    find_pdf_files, process_directory, BatchResult, BatchSummary, FileEntry, FileOutcome,
    FileRecord, ProcessOptions,
};
pub use convert::{Converter, Document, PdfiumConverter, PipelineOptions};
pub use error::{Error, Result};
pub use server::{run_server, ConvertPdfParams, ConvertServer};
