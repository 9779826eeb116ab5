//! Task metadata: the status snapshot a transfer persists and publishes.

use serde::{Deserialize, Serialize};

/// Lifecycle states of a transfer.
///
/// `Waiting → Active → {Paused, Completed, Failed}`; `Paused → Active` on
/// resume. `Completed`/`Failed` are terminal for an attempt, but an explicit
/// retry re-enters `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Waiting,
    Active,
    Paused,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Waiting => "waiting",
            TaskStatus::Active => "active",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Completed or Failed: nothing more happens without an external call.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Identity and status snapshot for one transfer.
///
/// Owned exclusively by its `DownloadTask`; the manager and external callers
/// only ever read copies. Persisted as the `"metadata"` record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Unique, caller-assigned id.
    pub task_id: String,
    pub file_url: String,
    pub filename: String,
    pub status: TaskStatus,
    /// Declared byte length, fixed at creation.
    pub total: u64,
    /// Bytes materialized so far.
    pub loaded: u64,
    /// Derived, 0–100, two-decimal precision.
    pub progress: f64,
    /// Formatted rate string, e.g. `"1.00 MB/s"`.
    pub speed: String,
    /// Present only in the FAILED state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-event progress payload.
#[derive(Debug, Clone)]
pub struct TaskProgress {
    pub task_id: String,
    pub loaded: u64,
    pub total: u64,
    pub progress: f64,
    pub speed: String,
}

/// What a caller supplies to create a task.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub task_id: String,
    pub file_url: String,
    pub filename: String,
    pub file_size: u64,
}
