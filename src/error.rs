//! Error types for pdf2md-mcp

use thiserror::Error;

/// Result type alias for pdf2md-mcp
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for pdf2md-mcp
#[derive(Error, Debug)]
pub enum Error {
    /// Input directory does not exist
    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: String },

    /// Input path exists but is not a directory
    #[error("Not a directory: {path}")]
    NotADirectory { path: String },

    /// File is not a valid PDF
    #[error("Invalid PDF file: {reason}")]
    InvalidPdf { reason: String },

    /// PDFium error
    #[error("PDFium error: {reason}")]
    Pdfium { reason: String },

    /// Conversion pipeline failure
    #[error("Conversion failed: {reason}")]
    Conversion { reason: String },

    /// Scratch or artifacts directory could not be prepared
    #[error("Scratch environment error: {reason}")]
    Scratch { reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error was ultimately caused by denied filesystem
    /// permissions. The batch loop reports those with dedicated messages.
    pub fn is_permission(&self) -> bool {
        match self {
            Error::Io(e) => e.kind() == std::io::ErrorKind::PermissionDenied,
            Error::Scratch { reason } | Error::Conversion { reason } => {
                reason.to_ascii_lowercase().contains("permission denied")
            }
            _ => false,
        }
    }
}
