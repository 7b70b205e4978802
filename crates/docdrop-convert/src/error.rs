//! Error types for converters and the conversion pipeline.

use thiserror::Error;

use docdrop_store::{BlobId, StoreError};

/// Result type alias for converter operations.
pub type ConvertResult<T> = Result<T, ConvertError>;

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failures raised by a converter.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Reading the source file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The document package is not a readable archive.
    #[error("Invalid document package: {0}")]
    Package(String),

    /// A required part is missing from the package.
    #[error("Missing document part: {0}")]
    MissingPart(String),

    /// The document markup could not be parsed.
    #[error("Malformed document markup at byte {offset}: {reason}")]
    Malformed {
        /// Byte offset in the markup where parsing stopped.
        offset: usize,
        /// What was wrong.
        reason: String,
    },

    /// The content is not valid UTF-8 text.
    #[error("Document is not valid UTF-8 text")]
    Encoding,

    /// No converter handles this kind of file.
    #[error("Unsupported document type: {0}")]
    Unsupported(String),
}

impl From<zip::result::ZipError> for ConvertError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => ConvertError::Io(e),
            zip::result::ZipError::FileNotFound => {
                ConvertError::MissingPart("file not found in archive".to_string())
            }
            other => ConvertError::Package(other.to_string()),
        }
    }
}

/// Failures of a `Convert(id)` call.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The identifier has no stored blob.
    #[error("File not found: {id}")]
    NotFound {
        /// The identifier that was requested.
        id: BlobId,
    },

    /// The converter rejected or failed on the input.
    #[error("Conversion failed: {0}")]
    ConversionFailure(#[source] ConvertError),

    /// The converter exceeded its time budget.
    #[error("Conversion timed out after {secs}s")]
    Timeout {
        /// The budget that was exceeded.
        secs: u64,
    },

    /// The converter task panicked or was aborted.
    #[error("Converter crashed: {0}")]
    Crashed(String),

    /// The caller cancelled the conversion.
    #[error("Conversion cancelled")]
    Cancelled,

    /// The store could not be read.
    #[error("Storage error: {0}")]
    Store(#[source] StoreError),
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id } => PipelineError::NotFound { id },
            other => PipelineError::Store(other),
        }
    }
}

impl From<ConvertError> for PipelineError {
    fn from(err: ConvertError) -> Self {
        PipelineError::ConversionFailure(err)
    }
}
