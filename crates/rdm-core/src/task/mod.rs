//! Single-task engine: chunk plan ownership, transfer loop, progress and
//! speed accounting, persistence round-trips, and pause/resume/cancel.

mod meta;
mod run;
mod speed;


pub use meta::{FileInfo, TaskMetadata, TaskProgress, TaskStatus};

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::chunk::{plan_chunks, Chunk};
use crate::client::TransferClient;
use crate::error::DownloadError;
use crate::events::{EventChannel, TaskEvent};
use crate::storage::{self, StorageScope, KEY_CHUNKS, KEY_METADATA};
use crate::util::calculate_progress;
use speed::SpeedMeter;

/// One file's resumable transfer.
///
/// Owns the chunk plan, metadata, and its isolated persistence scope. All
/// methods take `&self`; the expected shape is shared use behind `Arc` (the
/// manager keeps one `Arc<DownloadTask>` per registry entry).
pub struct DownloadTask {
    state: Mutex<TaskState>,
    cancel: Mutex<Option<CancellationToken>>,
    events: EventChannel,
    storage: Arc<dyn StorageScope>,
    client: Arc<dyn TransferClient>,
}

impl std::fmt::Debug for DownloadTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadTask").finish_non_exhaustive()
    }
}

struct TaskState {
    metadata: TaskMetadata,
    chunks: Vec<Chunk>,
    speed: SpeedMeter,
    /// Bumped at every transfer-loop start; a loop invocation whose epoch
    /// was superseded must not mutate state (see `run_transfer`).
    epoch: u64,
}

impl TaskState {
    /// Recomputes `loaded`/`progress` from the filled entries.
    fn recompute_progress(&mut self) {
        let loaded: u64 = self
            .chunks
            .iter()
            .filter(|c| c.is_filled())
            .map(|c| c.len())
            .sum();
        self.metadata.loaded = loaded;
        self.metadata.progress = calculate_progress(loaded, self.metadata.total);
    }

    fn sample_speed(&mut self) {
        self.speed.sample(self.metadata.loaded);
        self.metadata.speed = self.speed.current().to_string();
    }

    fn progress_snapshot(&self) -> TaskProgress {
        TaskProgress {
            task_id: self.metadata.task_id.clone(),
            loaded: self.metadata.loaded,
            total: self.metadata.total,
            progress: self.metadata.progress,
            speed: self.metadata.speed.clone(),
        }
    }
}

impl DownloadTask {
    /// Builds a task with a freshly computed chunk plan. Call `initialize`
    /// before anything else so previously persisted state can take over.
    pub fn new(
        file: FileInfo,
        storage: Arc<dyn StorageScope>,
        client: Arc<dyn TransferClient>,
        chunk_size: u64,
    ) -> Self {
        let chunks = plan_chunks(file.file_size, chunk_size);
        let metadata = TaskMetadata {
            task_id: file.task_id,
            file_url: file.file_url,
            filename: file.filename,
            status: TaskStatus::Waiting,
            total: file.file_size,
            loaded: 0,
            progress: 0.0,
            speed: "0 KB/s".to_string(),
            error: None,
        };
        Self {
            state: Mutex::new(TaskState {
                metadata,
                chunks,
                speed: SpeedMeter::new(),
                epoch: 0,
            }),
            cancel: Mutex::new(None),
            events: EventChannel::new(),
            storage,
            client,
        }
    }

    /// The task's event channel; the manager wires its fan-out here.
    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    pub fn get_metadata(&self) -> TaskMetadata {
        self.state.lock().unwrap().metadata.clone()
    }

    pub fn get_progress(&self) -> TaskProgress {
        self.state.lock().unwrap().progress_snapshot()
    }

    /// The assembled byte sequence (entries concatenated in index order),
    /// available once the task is COMPLETED. `None` before that.
    pub fn assembled(&self) -> Option<Vec<u8>> {
        let st = self.state.lock().unwrap();
        if st.metadata.status != TaskStatus::Completed {
            return None;
        }
        let mut out = Vec::with_capacity(st.metadata.total as usize);
        for chunk in &st.chunks {
            out.extend_from_slice(&chunk.data);
        }
        Some(out)
    }

    /// Opens the persistence scope and restores any previously persisted
    /// metadata and chunk map, recomputing progress from the filled entries.
    pub async fn initialize(&self) -> Result<(), DownloadError> {
        self.storage.init().await?;

        if let Some(raw) = self.storage.get(KEY_METADATA).await? {
            let saved = storage::decode_metadata(&raw)?;
            tracing::debug!(
                task = %saved.task_id,
                status = saved.status.as_str(),
                "restored persisted metadata"
            );
            self.state.lock().unwrap().metadata = saved;
        }

        if let Some(raw) = self.storage.get(KEY_CHUNKS).await? {
            let chunks = storage::decode_chunks(&raw)?;
            let event = {
                let mut st = self.state.lock().unwrap();
                st.chunks = chunks;
                st.recompute_progress();
                TaskEvent::Progress(st.progress_snapshot())
            };
            self.events.emit(&event);
        }

        Ok(())
    }

    /// Pauses the transfer: flips status, aborts the in-flight fetch via the
    /// loop's token, persists metadata, and emits progress + paused events.
    /// Safe to call when the task is not ACTIVE.
    pub async fn pause(&self) -> Result<(), DownloadError> {
        let (meta_rec, task_id, progress) = {
            let mut st = self.state.lock().unwrap();
            st.metadata.status = TaskStatus::Paused;
            (
                storage::encode_metadata(&st.metadata)?,
                st.metadata.task_id.clone(),
                st.progress_snapshot(),
            )
        };

        if let Some(token) = self.cancel.lock().unwrap().take() {
            token.cancel();
        }

        self.storage.set(KEY_METADATA, meta_rec).await?;
        self.events.emit(&TaskEvent::Progress(progress));
        self.events.emit(&TaskEvent::Paused);
        tracing::info!(task = %task_id, "paused");
        Ok(())
    }

    /// Re-enters the transfer loop, continuing from wherever the plan's
    /// filled/unfilled split left off.
    pub async fn resume(&self) -> Result<(), DownloadError> {
        {
            let mut st = self.state.lock().unwrap();
            st.metadata.status = TaskStatus::Active;
        }
        self.ensure_cancel_token();
        self.download_chunks().await
    }

    /// Clears a prior failure and re-enters the transfer loop.
    pub async fn retry(&self) -> Result<(), DownloadError> {
        {
            let mut st = self.state.lock().unwrap();
            st.metadata.error = None;
            st.metadata.status = TaskStatus::Active;
        }
        self.download_chunks().await
    }

    /// Discards all progress: persisted records, the scope itself, and its
    /// connection handle, then resets in-memory state to an empty plan.
    /// The only path that throws fetched bytes away.
    pub async fn clear_chunks(&self) -> Result<(), DownloadError> {
        self.storage.clear().await?;
        self.storage.delete_store().await?;
        self.storage.close().await?;

        let mut st = self.state.lock().unwrap();
        st.chunks = Vec::new();
        st.metadata.loaded = 0;
        st.metadata.progress = 0.0;
        st.metadata.status = TaskStatus::Waiting;
        tracing::debug!(task = %st.metadata.task_id, "cleared persisted chunks");
        Ok(())
    }

    /// Atomically moves WAITING → ACTIVE. Returns false when the task is in
    /// any other state (already claimed, or the state moved on).
    pub(crate) fn try_claim_waiting(&self) -> bool {
        let mut st = self.state.lock().unwrap();
        if st.metadata.status == TaskStatus::Waiting {
            st.metadata.status = TaskStatus::Active;
            true
        } else {
            false
        }
    }
}
