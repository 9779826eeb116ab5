//! reqwest-backed transfer client, plus a HEAD probe for file info.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, RANGE};
use tokio_util::sync::CancellationToken;

use super::{TransferClient, TransferError};
use crate::chunk::ByteRange;
use crate::naming;

fn network_err(e: reqwest::Error) -> TransferError {
    TransferError::Network(e.to_string())
}

/// Declared length and filename hint reported by a HEAD probe.
#[derive(Debug, Clone)]
pub struct ProbeInfo {
    pub total_size: Option<u64>,
    pub filename: Option<String>,
}

pub struct HttpTransferClient {
    client: reqwest::Client,
}

impl HttpTransferClient {
    pub fn new() -> Result<Self, TransferError> {
        let client = reqwest::Client::builder().build().map_err(network_err)?;
        Ok(Self { client })
    }

    /// HEAD probe for the declared byte length and a filename hint
    /// (Content-Disposition first, then the URL path).
    pub async fn probe(&self, url: &str) -> Result<ProbeInfo, TransferError> {
        let resp = self.client.head(url).send().await.map_err(network_err)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransferError::Http(status.as_u16()));
        }

        let total_size = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok());
        let filename = resp
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_filename)
            .or_else(|| naming::filename_from_url(url));

        Ok(ProbeInfo {
            total_size,
            filename,
        })
    }
}

/// Extracts the plain `filename=` parameter from a Content-Disposition
/// value. The RFC 5987 `filename*` form is not handled.
fn disposition_filename(value: &str) -> Option<String> {
    value
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|v| naming::sanitize_filename(v.trim_matches('"')))
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl TransferClient for HttpTransferClient {
    async fn get(
        &self,
        url: &str,
        range: ByteRange,
        cancel: &CancellationToken,
    ) -> Result<Bytes, TransferError> {
        let request = async {
            let resp = self
                .client
                .get(url)
                .header(RANGE, range.header_value())
                .send()
                .await
                .map_err(network_err)?;
            let status = resp.status();
            if !status.is_success() {
                return Err(TransferError::Http(status.as_u16()));
            }
            resp.bytes().await.map_err(network_err)
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferError::Canceled),
            result = request => result,
        }
    }
}
