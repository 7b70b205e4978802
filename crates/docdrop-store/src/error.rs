//! Error types for the blob store.

use std::path::PathBuf;

use thiserror::Error;

use crate::id::BlobId;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error variants for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Wraps I/O errors that are not tied to a single blob write
    /// (for example, the upload directory cannot be read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No stored blob matches the identifier.
    #[error("Blob not found: {id}")]
    NotFound {
        /// The identifier that was looked up.
        id: BlobId,
    },

    /// Persisting an uploaded stream did not complete.
    #[error("Write failed for {path}: {source}")]
    WriteFailure {
        /// Path that was being written.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn write_failure(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::WriteFailure {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_result_alias() {
        let ok: StoreResult<u8> = Ok(7);
        assert!(ok.is_ok());

        let err: StoreResult<u8> = Err(StoreError::NotFound {
            id: BlobId::generate(),
        });
        assert!(err.is_err());
    }

    #[test]
    fn test_io_error_from_std() {
        let std_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StoreError = std_err.into();
        assert!(matches!(err, StoreError::Io(_)));
    }

    #[test]
    fn test_not_found_mentions_id() {
        let id = BlobId::generate();
        let err = StoreError::NotFound { id };
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_write_failure_message() {
        let err = StoreError::write_failure(
            "/tmp/uploads/x.docx",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/uploads/x.docx"));
        assert!(msg.contains("disk full"));
    }
}
