//! The chunk-transfer loop.

use super::*;
use crate::client::TransferError;

impl DownloadTask {
    /// Runs the transfer loop over the chunk plan in index order.
    ///
    /// Idempotent no-op when the task is already COMPLETED, or PAUSED (a
    /// paused task is only re-entered through `resume`). Failures are
    /// classified once at this boundary: cancellation surfaces as a paused
    /// task plus `Err(Canceled)`; anything else marks the task FAILED,
    /// records the message, emits a failed event, and re-raises.
    pub async fn download_chunks(&self) -> Result<(), DownloadError> {
        {
            let st = self.state.lock().unwrap();
            match st.metadata.status {
                TaskStatus::Completed => {
                    tracing::debug!(task = %st.metadata.task_id, "already completed");
                    return Ok(());
                }
                TaskStatus::Paused => {
                    tracing::debug!(task = %st.metadata.task_id, "paused; not resuming implicitly");
                    return Ok(());
                }
                _ => {}
            }
        }

        match self.run_transfer().await {
            Ok(()) => Ok(()),
            Err(DownloadError::Canceled) => Err(DownloadError::Canceled),
            Err(err) => {
                let event = {
                    let mut st = self.state.lock().unwrap();
                    st.metadata.status = TaskStatus::Failed;
                    st.metadata.error = Some(err.to_string());
                    tracing::warn!(task = %st.metadata.task_id, error = %err, "transfer failed");
                    TaskEvent::Failed(err.clone())
                };
                self.events.emit(&event);
                Err(err)
            }
        }
    }

    async fn run_transfer(&self) -> Result<(), DownloadError> {
        // Each invocation claims a new epoch. A loop whose epoch has been
        // superseded (a resume/retry started a newer one while this one was
        // unwinding from a cancelled fetch) must neither mutate state nor
        // persist; it exits with the cancellation signal.
        let (url, task_id, chunk_count, my_epoch) = {
            let mut st = self.state.lock().unwrap();
            st.metadata.status = TaskStatus::Active;
            st.epoch += 1;
            (
                st.metadata.file_url.clone(),
                st.metadata.task_id.clone(),
                st.chunks.len(),
                st.epoch,
            )
        };
        tracing::info!(task = %task_id, chunks = chunk_count, "transfer loop started");

        for index in 0..chunk_count {
            let range = {
                let st = self.state.lock().unwrap();
                let chunk = &st.chunks[index];
                if chunk.is_filled() {
                    // Previously fetched bytes are reused as-is; this is what
                    // makes resumption cheap.
                    continue;
                }
                chunk.range()
            };

            // Pause checkpoint before each fetch.
            if self.is_paused() {
                return self.abort_paused(my_epoch).await;
            }

            let token = self.ensure_cancel_token();
            let bytes = match self.client.get(&url, range, &token).await {
                Ok(bytes) => bytes,
                Err(TransferError::Canceled) => return self.abort_paused(my_epoch).await,
                Err(err) => return Err(err.into()),
            };

            // A pause may have landed while the fetch was in flight; the
            // bytes are dropped so the entry stays unfilled for the resume.
            if self.is_paused() {
                return self.abort_paused(my_epoch).await;
            }

            if bytes.len() as u64 != range.len() {
                return Err(DownloadError::Network(format!(
                    "range {} returned {} bytes, expected {}",
                    range.header_value(),
                    bytes.len(),
                    range.len()
                )));
            }

            let (event, chunks_rec, meta_rec) = {
                let mut st = self.state.lock().unwrap();
                if st.epoch != my_epoch {
                    return Err(DownloadError::Canceled);
                }
                st.chunks[index].data = bytes.to_vec();
                st.recompute_progress();
                st.sample_speed();
                (
                    TaskEvent::Progress(st.progress_snapshot()),
                    storage::encode_chunks(&st.chunks)?,
                    storage::encode_metadata(&st.metadata)?,
                )
            };
            self.events.emit(&event);

            // Both records land before the next chunk starts: a crash here
            // loses at most this one chunk's progress.
            self.storage.set(KEY_CHUNKS, chunks_rec).await?;
            self.storage.set(KEY_METADATA, meta_rec).await?;
            tracing::debug!(task = %task_id, chunk = index + 1, of = chunk_count, "chunk stored");
        }

        let (meta, meta_rec) = {
            let mut st = self.state.lock().unwrap();
            if st.epoch != my_epoch {
                return Err(DownloadError::Canceled);
            }
            st.metadata.status = TaskStatus::Completed;
            (
                st.metadata.clone(),
                storage::encode_metadata(&st.metadata)?,
            )
        };
        self.storage.set(KEY_METADATA, meta_rec).await?;
        tracing::info!(task = %task_id, "completed");
        self.events.emit(&TaskEvent::Completed(meta));
        Ok(())
    }

    fn is_paused(&self) -> bool {
        self.state.lock().unwrap().metadata.status == TaskStatus::Paused
    }

    /// Ensures a live cancellation token exists for this loop invocation;
    /// created lazily once and reused across entries so a single pause
    /// cancels whatever fetch is in flight.
    pub(super) fn ensure_cancel_token(&self) -> CancellationToken {
        let mut guard = self.cancel.lock().unwrap();
        guard.get_or_insert_with(CancellationToken::new).clone()
    }

    /// Finalizes a pause-induced abort: PAUSED is persisted and the paused
    /// event emitted before the cancellation signal is raised. A superseded
    /// loop skips the finalization — the newer invocation owns the state.
    async fn abort_paused(&self, my_epoch: u64) -> Result<(), DownloadError> {
        let (meta_rec, task_id) = {
            let st = self.state.lock().unwrap();
            if st.epoch != my_epoch || st.metadata.status != TaskStatus::Paused {
                return Err(DownloadError::Canceled);
            }
            (
                storage::encode_metadata(&st.metadata)?,
                st.metadata.task_id.clone(),
            )
        };
        self.storage.set(KEY_METADATA, meta_rec).await?;
        self.events.emit(&TaskEvent::Paused);
        tracing::debug!(task = %task_id, "transfer loop aborted by pause");
        Err(DownloadError::Canceled)
    }
}
