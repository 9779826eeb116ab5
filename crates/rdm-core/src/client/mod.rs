//! Transfer client port: one byte-range GET per call, abortable from
//! outside via a cancellation token.

pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::chunk::ByteRange;

#[derive(Debug, Clone, Error)]
pub enum TransferError {
    /// The fetch was aborted via its cancellation token.
    #[error("transfer canceled")]
    Canceled,
    /// Server answered with a non-success status.
    #[error("HTTP {0}")]
    Http(u16),
    /// Connection or protocol failure.
    #[error("network: {0}")]
    Network(String),
}

/// Issues a single byte-range GET.
#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Fetches `range` of `url`. Resolves with the raw body bytes, or
    /// `TransferError::Canceled` as soon as `cancel` fires mid-flight.
    async fn get(
        &self,
        url: &str,
        range: ByteRange,
        cancel: &CancellationToken,
    ) -> Result<Bytes, TransferError>;
}
