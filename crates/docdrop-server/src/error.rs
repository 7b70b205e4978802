//! Caller-visible failures of the upload/convert service.

use axum::http::StatusCode;
use thiserror::Error;

use docdrop_convert::{ConvertError, PipelineError};
use docdrop_store::StoreError;

/// Result type alias for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Every failure the service surfaces to a client.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request carried no file or no identifier.
    #[error("{0}")]
    NoInput(String),

    /// The upload exceeded the configured size cap.
    #[error("File exceeds the maximum upload size of {limit} bytes")]
    PayloadTooLarge {
        /// Configured cap in bytes.
        limit: u64,
    },

    /// The upload could not be written to the store.
    #[error("Failed to store upload: {0}")]
    WriteFailure(#[source] StoreError),

    /// The identifier names no stored file.
    #[error("File not found")]
    NotFound,

    /// The converter rejected or failed on the stored file.
    #[error("Conversion failed: {0}")]
    ConversionFailure(#[source] ConvertError),

    /// The converter exceeded its time budget.
    #[error("Conversion timed out after {secs}s")]
    Timeout {
        /// Budget that was exceeded.
        secs: u64,
    },

    /// A converter crashed while handling the request.
    #[error("Internal error: {0}")]
    Internal(String),

    /// The service is shutting down.
    #[error("Service is shutting down")]
    Unavailable,

    /// The store directory could not be read.
    #[error("Storage error: {0}")]
    Storage(#[source] StoreError),
}

impl ServiceError {
    /// HTTP status for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NoInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::ConversionFailure(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Internal(_) | ServiceError::WriteFailure(_) | ServiceError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// True if the caller can fix the request.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl From<PipelineError> for ServiceError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NotFound { .. } => ServiceError::NotFound,
            PipelineError::ConversionFailure(e) => ServiceError::ConversionFailure(e),
            PipelineError::Timeout { secs } => ServiceError::Timeout { secs },
            PipelineError::Crashed(reason) => ServiceError::Internal(reason),
            PipelineError::Cancelled => ServiceError::Unavailable,
            PipelineError::Store(e) => ServiceError::Storage(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docdrop_store::BlobId;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ServiceError::NoInput("No file ID provided".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::PayloadTooLarge { limit: 10 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(ServiceError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ServiceError::Timeout { secs: 30 }.status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ServiceError::Unavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert_eq!(
            ServiceError::WriteFailure(StoreError::Io(io)).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_client_vs_server_classification() {
        assert!(ServiceError::NotFound.is_client_error());
        assert!(ServiceError::ConversionFailure(ConvertError::Encoding).is_client_error());
        assert!(!ServiceError::Timeout { secs: 1 }.is_client_error());
        assert!(!ServiceError::Unavailable.is_client_error());
        assert!(!ServiceError::Internal("boom".into()).is_client_error());
    }

    #[test]
    fn test_pipeline_errors_map() {
        let id = BlobId::generate();
        assert!(matches!(
            ServiceError::from(PipelineError::NotFound { id }),
            ServiceError::NotFound
        ));
        assert!(matches!(
            ServiceError::from(PipelineError::Timeout { secs: 3 }),
            ServiceError::Timeout { secs: 3 }
        ));
        assert!(matches!(
            ServiceError::from(PipelineError::Cancelled),
            ServiceError::Unavailable
        ));
        let crashed = ServiceError::from(PipelineError::Crashed("panicked".to_string()));
        assert!(matches!(crashed, ServiceError::Internal(_)));
        assert_eq!(crashed.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(matches!(
            ServiceError::from(PipelineError::ConversionFailure(ConvertError::Encoding)),
            ServiceError::ConversionFailure(ConvertError::Encoding)
        ));
    }

    #[test]
    fn test_messages_are_readable() {
        assert_eq!(ServiceError::NotFound.to_string(), "File not found");
        assert_eq!(
            ServiceError::NoInput("No files were uploaded.".into()).to_string(),
            "No files were uploaded."
        );
        let err = ServiceError::ConversionFailure(ConvertError::MissingPart("word/document.xml".into()));
        assert_eq!(
            err.to_string(),
            "Conversion failed: Missing document part: word/document.xml"
        );
    }
}
