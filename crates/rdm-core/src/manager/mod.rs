//! Fleet scheduler: admission under a concurrency cap, FIFO promotion of
//! waiting tasks, fleet-wide pause/resume, and subscriber fan-out of the
//! task list.

mod subscribe;

#[cfg(test)]
mod tests;

pub use subscribe::Subscription;

use std::sync::{Arc, Mutex, Weak};

use crate::client::TransferClient;
use crate::config::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CONCURRENT_DOWNLOADS};
use crate::error::DownloadError;
use crate::events::TaskEvent;
use crate::storage::StorageBackend;
use crate::task::{DownloadTask, FileInfo, TaskMetadata, TaskProgress, TaskStatus};
use subscribe::{ListListener, SubscriberSet};

pub type ProgressCallback = Box<dyn Fn(&TaskProgress) + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(&DownloadError) + Send + Sync>;

/// Construction-time options for the manager.
pub struct ManagerOptions {
    /// Persistence namespace; this manager's task scopes live under it.
    pub user_id: String,
    /// Cap on concurrently admitted transfer loops.
    pub max_concurrent_downloads: usize,
    /// Chunk size used when planning new tasks.
    pub chunk_size: u64,
    /// Fleet-wide progress callback, forwarded from every task.
    pub on_progress: Option<ProgressCallback>,
    /// Fleet-wide error callback, forwarded from every task failure.
    pub on_error: Option<ErrorCallback>,
}

impl ManagerOptions {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            on_progress: None,
            on_error: None,
        }
    }
}

struct Registry {
    /// Insertion-ordered; promotion scans front to back (FIFO fairness).
    entries: Vec<Arc<DownloadTask>>,
    /// Number of admitted transfer loops currently executing. Manual
    /// resumes run outside this count by design (see DESIGN.md).
    active: usize,
}

pub(crate) struct ManagerInner {
    user_id: String,
    max_concurrent: usize,
    chunk_size: u64,
    on_progress: Option<ProgressCallback>,
    on_error: Option<ErrorCallback>,
    store: Arc<dyn StorageBackend>,
    client: Arc<dyn TransferClient>,
    registry: Mutex<Registry>,
    pub(crate) subscribers: Mutex<SubscriberSet>,
}

/// Cheap-to-clone handle to the fleet scheduler.
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<ManagerInner>,
}

impl DownloadManager {
    pub fn new(
        options: ManagerOptions,
        store: Arc<dyn StorageBackend>,
        client: Arc<dyn TransferClient>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                user_id: options.user_id,
                max_concurrent: options.max_concurrent_downloads.max(1),
                chunk_size: options.chunk_size,
                on_progress: options.on_progress,
                on_error: options.on_error,
                store,
                client,
                registry: Mutex::new(Registry {
                    entries: Vec::new(),
                    active: 0,
                }),
                subscribers: Mutex::new(SubscriberSet::new()),
            }),
        }
    }

    /// Creates and registers a task, wires its events, and — when a slot is
    /// free — immediately admits it and runs its transfer loop to its first
    /// stop (completion, pause, or failure). A cancellation racing the
    /// create call is swallowed; any other failure propagates.
    pub async fn create_task(&self, file: FileInfo) -> Result<Arc<DownloadTask>, DownloadError> {
        let inner = &self.inner;
        tracing::info!(task = %file.task_id, file = %file.filename, "creating task");

        let scope_name = format!("{}_task_{}", inner.user_id, file.task_id);
        let task_id = file.task_id.clone();
        {
            let reg = inner.registry.lock().unwrap();
            if reg
                .entries
                .iter()
                .any(|t| t.get_metadata().task_id == task_id)
            {
                return Err(DownloadError::TaskExists(task_id));
            }
        }

        let scope = inner.store.open_scope(&scope_name).await?;
        let task = Arc::new(DownloadTask::new(
            file,
            scope,
            Arc::clone(&inner.client),
            inner.chunk_size,
        ));
        task.initialize().await?;

        // Forward task events into the fleet-wide callbacks and subscriber
        // fan-out. Weak so the channel never keeps a dropped manager alive.
        let weak: Weak<ManagerInner> = Arc::downgrade(inner);
        task.events().subscribe(move |event| {
            let Some(mgr) = weak.upgrade() else { return };
            match event {
                TaskEvent::Progress(progress) => {
                    if let Some(cb) = &mgr.on_progress {
                        cb(progress);
                    }
                    mgr.notify_subscribers();
                }
                TaskEvent::Failed(err) => {
                    if let Some(cb) = &mgr.on_error {
                        cb(err);
                    }
                    mgr.notify_subscribers();
                }
                TaskEvent::Completed(_) | TaskEvent::Paused => mgr.notify_subscribers(),
            }
        });

        // Register and decide admission under one lock so a concurrent
        // promotion pass can neither miss nor double-start this task.
        let admitted = {
            let mut reg = inner.registry.lock().unwrap();
            reg.entries.push(Arc::clone(&task));
            if reg.active < inner.max_concurrent {
                reg.active += 1;
                task.try_claim_waiting();
                true
            } else {
                false
            }
        };
        inner.notify_subscribers();

        if admitted {
            match Arc::clone(inner).run_admitted(Arc::clone(&task)).await {
                Ok(()) | Err(DownloadError::Canceled) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(task)
    }

    /// Looks up a registered task by id.
    pub fn get_task(&self, task_id: &str) -> Option<Arc<DownloadTask>> {
        self.inner
            .registry
            .lock()
            .unwrap()
            .entries
            .iter()
            .find(|t| t.get_metadata().task_id == task_id)
            .cloned()
    }

    /// Metadata snapshots of every registered task, in insertion order.
    pub fn get_download_list(&self) -> Vec<TaskMetadata> {
        self.inner.download_list()
    }

    pub async fn pause_task(&self, task_id: &str) -> Result<(), DownloadError> {
        if let Some(task) = self.get_task(task_id) {
            task.pause().await?;
            self.inner.notify_subscribers();
        }
        Ok(())
    }

    /// Resumes a paused task. The restart is immediate: the task does not
    /// re-enter the waiting queue and is not counted against the concurrency
    /// cap (deliberate asymmetry, see DESIGN.md). Resolves when the resumed
    /// loop next stops.
    pub async fn resume_task(&self, task_id: &str) -> Result<(), DownloadError> {
        if let Some(task) = self.get_task(task_id) {
            match task.resume().await {
                Ok(()) | Err(DownloadError::Canceled) => {}
                Err(err) => return Err(err),
            }
            ManagerInner::schedule_promotion(&self.inner);
            self.inner.notify_subscribers();
        }
        Ok(())
    }

    /// Unregisters a task, then clears its persisted records. The registry
    /// removal comes first so the public list never shows a task
    /// mid-teardown.
    pub async fn remove_task(&self, task_id: &str) -> Result<(), DownloadError> {
        let task = {
            let mut reg = self.inner.registry.lock().unwrap();
            reg.entries
                .iter()
                .position(|t| t.get_metadata().task_id == task_id)
                .map(|idx| reg.entries.remove(idx))
        };
        if let Some(task) = task {
            task.clear_chunks().await?;
            self.inner.notify_subscribers();
        }
        Ok(())
    }

    /// Pauses every currently ACTIVE task in parallel, then notifies once.
    pub async fn pause_all_tasks(&self) -> Result<(), DownloadError> {
        let targets = self.inner.tasks_with_status(TaskStatus::Active);
        futures::future::try_join_all(targets.iter().map(|t| t.pause())).await?;
        self.inner.notify_subscribers();
        Ok(())
    }

    /// Resumes every currently PAUSED task in parallel, runs one promotion
    /// pass, then notifies once. Resolves when every resumed loop stops.
    pub async fn resume_all_tasks(&self) -> Result<(), DownloadError> {
        let targets = self.inner.tasks_with_status(TaskStatus::Paused);
        futures::future::try_join_all(targets.iter().map(|t| async move {
            match t.resume().await {
                Ok(()) | Err(DownloadError::Canceled) => Ok(()),
                Err(err) => Err(err),
            }
        }))
        .await?;
        ManagerInner::schedule_promotion(&self.inner);
        self.inner.notify_subscribers();
        Ok(())
    }

    /// Registers a listener and immediately invokes it once with the current
    /// snapshot, so new subscribers never wait for the next change.
    pub fn subscribe(
        &self,
        listener: impl Fn(&[TaskMetadata]) + Send + Sync + 'static,
    ) -> Subscription {
        let listener: ListListener = Arc::new(listener);
        let id = self
            .inner
            .subscribers
            .lock()
            .unwrap()
            .add(Arc::clone(&listener));
        listener(&self.inner.download_list());
        Subscription::new(id, Arc::downgrade(&self.inner))
    }

    /// Tears the fleet down: pauses everything, clears every task's
    /// persisted records in parallel, drops subscribers, empties the
    /// registry, and closes the store. Prior subscribers see nothing
    /// afterwards.
    pub async fn destroy(&self) -> Result<(), DownloadError> {
        self.pause_all_tasks().await?;

        let tasks: Vec<Arc<DownloadTask>> =
            self.inner.registry.lock().unwrap().entries.clone();
        futures::future::try_join_all(tasks.iter().map(|t| t.clear_chunks())).await?;

        self.inner.subscribers.lock().unwrap().clear();
        {
            let mut reg = self.inner.registry.lock().unwrap();
            reg.entries.clear();
            reg.active = 0;
        }
        self.inner.store.close().await?;
        tracing::info!("manager destroyed");
        Ok(())
    }
}

impl ManagerInner {
    fn download_list(&self) -> Vec<TaskMetadata> {
        self.registry
            .lock()
            .unwrap()
            .entries
            .iter()
            .map(|t| t.get_metadata())
            .collect()
    }

    fn tasks_with_status(&self, status: TaskStatus) -> Vec<Arc<DownloadTask>> {
        self.registry
            .lock()
            .unwrap()
            .entries
            .iter()
            .filter(|t| t.get_metadata().status == status)
            .cloned()
            .collect()
    }

    pub(crate) fn notify_subscribers(&self) {
        let list = self.download_list();
        let listeners = self.subscribers.lock().unwrap().listeners();
        for listener in listeners {
            listener(&list);
        }
    }

    /// Runs an admitted task's loop and releases its slot exactly once when
    /// the loop exits — the same moment the completion/pause/failure event
    /// fires — then keeps the fleet saturated.
    async fn run_admitted(
        self: Arc<Self>,
        task: Arc<DownloadTask>,
    ) -> Result<(), DownloadError> {
        let result = task.download_chunks().await;
        {
            let mut reg = self.registry.lock().unwrap();
            reg.active = reg.active.saturating_sub(1);
        }
        Self::schedule_promotion(&self);
        result
    }

    /// Admits the first WAITING task in insertion order, when a slot is
    /// free. A promoted task's failure never escapes: non-cancel errors go
    /// to the error callback and the promotion chain continues either way.
    async fn start_next_download(self: Arc<Self>) {
        let task = {
            let mut reg = self.registry.lock().unwrap();
            if reg.active >= self.max_concurrent {
                return;
            }
            let Some(task) = reg
                .entries
                .iter()
                .find(|t| t.try_claim_waiting())
                .cloned()
            else {
                return;
            };
            reg.active += 1;
            task
        };
        tracing::debug!(task = %task.get_metadata().task_id, "promoting waiting task");
        if let Err(err) = Arc::clone(&self).run_admitted(task).await {
            if !err.is_canceled() {
                if let Some(cb) = &self.on_error {
                    cb(&err);
                }
            }
        }
    }

    /// Fire-and-forget promotion pass.
    pub(crate) fn schedule_promotion(this: &Arc<Self>) {
        let mgr = Arc::clone(this);
        tokio::spawn(async move {
            mgr.start_next_download().await;
        });
    }
}
