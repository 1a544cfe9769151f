use bridge_traits::BridgeError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("Uploads did not finish within {timeout:?} ({finished}/{submitted} finished)")]
    TerminalStateTimeout {
        submitted: usize,
        finished: usize,
        timeout: Duration,
    },

    #[error("Local file missing: {}", path.display())]
    LocalFileMissing { path: PathBuf },

    #[error("Platform rejected {filename} as already present")]
    DuplicateRejected { filename: String },

    #[error("Id extraction failed for {filename}")]
    IdExtractionFailure { filename: String },

    #[error("Pagination ceiling of {max_pages} pages reached; snapshot may be incomplete")]
    PaginationCeilingExceeded { max_pages: usize },

    #[error("Console session expired: {0}")]
    SessionExpired(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Bridge capability unavailable: {0}")]
    Bridge(String),

    #[error("Upload run cancelled")]
    Cancelled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl UploadError {
    /// Whether a fresh attempt of the same batch may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UploadError::TransientNetwork(_) | UploadError::TerminalStateTimeout { .. }
        )
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, UploadError::SessionExpired(_))
    }
}

impl From<BridgeError> for UploadError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::SessionExpired(msg) => UploadError::SessionExpired(msg),
            BridgeError::OperationFailed(msg) | BridgeError::Timeout(msg) => {
                UploadError::TransientNetwork(msg)
            }
            BridgeError::NotAvailable(msg) => UploadError::Bridge(msg),
            BridgeError::Io(e) => UploadError::Storage(e.to_string()),
        }
    }
}

impl From<sqlx::Error> for UploadError {
    fn from(err: sqlx::Error) -> Self {
        UploadError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, UploadError>;
