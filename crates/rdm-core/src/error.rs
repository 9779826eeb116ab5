//! Engine error taxonomy and classification.
//!
//! Transfer-loop failures are classified once at the loop boundary:
//! `Canceled` surfaces as a paused task and never reaches the error
//! callback; everything else turns the task FAILED and is re-raised.

use thiserror::Error;

use crate::client::TransferError;
use crate::storage::StorageError;

#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    /// Pause-induced abort of the transfer loop.
    #[error("download canceled")]
    Canceled,
    /// Transfer failed for a reason other than cancellation (connection,
    /// HTTP status, or a body that does not match the requested range).
    #[error("network: {0}")]
    Network(String),
    /// A persistence operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A task with the same id is already registered with the manager.
    #[error("task already exists: {0}")]
    TaskExists(String),
}

impl DownloadError {
    /// True for the pause-induced abort, which is never reported as an error.
    pub fn is_canceled(&self) -> bool {
        matches!(self, DownloadError::Canceled)
    }
}

impl From<TransferError> for DownloadError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Canceled => DownloadError::Canceled,
            TransferError::Http(code) => DownloadError::Network(format!("HTTP {}", code)),
            TransferError::Network(msg) => DownloadError::Network(msg),
        }
    }
}
