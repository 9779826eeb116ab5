//! Tests for the fleet scheduler (mock clients + memory store).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::chunk::ByteRange;
use crate::client::TransferError;
use crate::storage::memory::MemoryStore;
use crate::storage::{StorageBackend, KEY_METADATA};

/// Completes every fetch immediately with zeroed bytes.
struct InstantClient;

#[async_trait]
impl TransferClient for InstantClient {
    async fn get(
        &self,
        _url: &str,
        range: ByteRange,
        _cancel: &CancellationToken,
    ) -> Result<Bytes, TransferError> {
        Ok(Bytes::from(vec![0u8; range.len() as usize]))
    }
}

/// Holds every fetch until the test releases a permit; cancellable while
/// waiting. Lets tests step the fleet deterministically.
struct GatedClient {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl TransferClient for GatedClient {
    async fn get(
        &self,
        _url: &str,
        range: ByteRange,
        cancel: &CancellationToken,
    ) -> Result<Bytes, TransferError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferError::Canceled),
            permit = self.gate.acquire() => {
                permit.expect("gate closed").forget();
                Ok(Bytes::from(vec![0u8; range.len() as usize]))
            }
        }
    }
}

/// Every fetch fails with a server error.
struct FailingClient;

#[async_trait]
impl TransferClient for FailingClient {
    async fn get(
        &self,
        _url: &str,
        _range: ByteRange,
        _cancel: &CancellationToken,
    ) -> Result<Bytes, TransferError> {
        Err(TransferError::Http(500))
    }
}

fn file_info(id: &str) -> FileInfo {
    FileInfo {
        task_id: id.to_string(),
        file_url: format!("http://example.com/{}.bin", id),
        filename: format!("{}.bin", id),
        file_size: 1024,
    }
}

fn manager_with(
    client: Arc<dyn TransferClient>,
    store: Arc<MemoryStore>,
    cap: usize,
) -> DownloadManager {
    let mut options = ManagerOptions::new("u1");
    options.max_concurrent_downloads = cap;
    options.chunk_size = 1024;
    DownloadManager::new(options, store, client)
}

async fn wait_until<F: Fn() -> bool>(what: &str, f: F) {
    for _ in 0..500 {
        if f() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

fn status_of(manager: &DownloadManager, id: &str) -> Option<TaskStatus> {
    manager
        .get_download_list()
        .iter()
        .find(|m| m.task_id == id)
        .map(|m| m.status)
}

fn spawn_create(manager: &DownloadManager, id: &str) {
    let manager = manager.clone();
    let file = file_info(id);
    tokio::spawn(async move {
        let _ = manager.create_task(file).await;
    });
}

#[tokio::test]
async fn cap_two_with_three_tasks_leaves_exactly_one_waiting() {
    let gate = Arc::new(Semaphore::new(0));
    let client = Arc::new(GatedClient {
        gate: Arc::clone(&gate),
    });
    let store = Arc::new(MemoryStore::new());
    let manager = manager_with(client, store, 2);

    // Track the maximum number of simultaneously active tasks the
    // subscribers ever observe.
    let max_active = Arc::new(AtomicUsize::new(0));
    {
        let max_active = Arc::clone(&max_active);
        manager.subscribe(move |list| {
            let active = list
                .iter()
                .filter(|m| m.status == TaskStatus::Active)
                .count();
            max_active.fetch_max(active, Ordering::SeqCst);
        });
    }

    for (i, id) in ["a", "b", "c"].iter().enumerate() {
        spawn_create(&manager, id);
        let manager = manager.clone();
        wait_until("task registered", move || {
            manager.get_download_list().len() == i + 1
        })
        .await;
    }

    let list = manager.get_download_list();
    assert_eq!(status_of(&manager, "a"), Some(TaskStatus::Active));
    assert_eq!(status_of(&manager, "b"), Some(TaskStatus::Active));
    assert_eq!(status_of(&manager, "c"), Some(TaskStatus::Waiting));
    assert_eq!(
        list.iter()
            .filter(|m| m.status == TaskStatus::Waiting)
            .count(),
        1
    );

    // Free one slot: the waiting task must be promoted.
    gate.add_permits(1);
    {
        let manager = manager.clone();
        wait_until("c promoted", move || {
            status_of(&manager, "c") == Some(TaskStatus::Active)
        })
        .await;
    }

    gate.add_permits(10);
    {
        let manager = manager.clone();
        wait_until("all completed", move || {
            manager
                .get_download_list()
                .iter()
                .all(|m| m.status == TaskStatus::Completed)
        })
        .await;
    }

    assert!(max_active.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn promotion_follows_insertion_order() {
    let gate = Arc::new(Semaphore::new(0));
    let client = Arc::new(GatedClient {
        gate: Arc::clone(&gate),
    });
    let store = Arc::new(MemoryStore::new());
    let manager = manager_with(client, store, 1);

    for (i, id) in ["a", "b", "c"].iter().enumerate() {
        spawn_create(&manager, id);
        let manager = manager.clone();
        wait_until("task registered", move || {
            manager.get_download_list().len() == i + 1
        })
        .await;
    }
    assert_eq!(status_of(&manager, "a"), Some(TaskStatus::Active));
    assert_eq!(status_of(&manager, "b"), Some(TaskStatus::Waiting));
    assert_eq!(status_of(&manager, "c"), Some(TaskStatus::Waiting));

    // Each released slot must go to the least-recently-created waiter.
    gate.add_permits(1);
    {
        let manager = manager.clone();
        wait_until("b promoted", move || {
            status_of(&manager, "b") == Some(TaskStatus::Active)
        })
        .await;
    }
    assert_eq!(status_of(&manager, "c"), Some(TaskStatus::Waiting));

    gate.add_permits(1);
    {
        let manager = manager.clone();
        wait_until("c promoted", move || {
            status_of(&manager, "c") == Some(TaskStatus::Active)
        })
        .await;
    }

    gate.add_permits(1);
    {
        let manager = manager.clone();
        wait_until("all completed", move || {
            manager
                .get_download_list()
                .iter()
                .all(|m| m.status == TaskStatus::Completed)
        })
        .await;
    }
}

#[tokio::test]
async fn subscribe_invokes_immediately_with_current_snapshot() {
    let store = Arc::new(MemoryStore::new());
    let manager = manager_with(Arc::new(InstantClient), store, 2);

    let calls = Arc::new(AtomicUsize::new(0));
    let subscription = {
        let calls = Arc::clone(&calls);
        manager.subscribe(move |list| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                assert!(list.is_empty(), "first snapshot precedes any mutation");
            }
        })
    };
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    manager.create_task(file_info("a")).await.unwrap();
    assert!(calls.load(Ordering::SeqCst) > 1);

    let after = calls.load(Ordering::SeqCst);
    subscription.unsubscribe();
    manager.create_task(file_info("b")).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), after);
}

#[tokio::test]
async fn duplicate_task_id_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let manager = manager_with(Arc::new(InstantClient), store, 2);

    manager.create_task(file_info("a")).await.unwrap();
    let err = manager.create_task(file_info("a")).await.unwrap_err();
    assert!(matches!(err, DownloadError::TaskExists(_)));
    assert_eq!(manager.get_download_list().len(), 1);
}

#[tokio::test]
async fn remove_task_unregisters_then_clears_storage() {
    let store = Arc::new(MemoryStore::new());
    let manager = manager_with(Arc::new(InstantClient), Arc::clone(&store), 2);

    manager.create_task(file_info("a")).await.unwrap();
    manager.remove_task("a").await.unwrap();

    assert!(manager.get_download_list().is_empty());
    let scope = store.open_scope("u1_task_a").await.unwrap();
    assert_eq!(scope.get(KEY_METADATA).await.unwrap(), None);
}

#[tokio::test]
async fn pause_all_then_resume_all_round_trip() {
    let gate = Arc::new(Semaphore::new(0));
    let client = Arc::new(GatedClient {
        gate: Arc::clone(&gate),
    });
    let store = Arc::new(MemoryStore::new());
    let manager = manager_with(client, store, 2);

    spawn_create(&manager, "a");
    spawn_create(&manager, "b");
    {
        let manager = manager.clone();
        wait_until("both active", move || {
            let list = manager.get_download_list();
            list.len() == 2 && list.iter().all(|m| m.status == TaskStatus::Active)
        })
        .await;
    }

    manager.pause_all_tasks().await.unwrap();
    assert!(manager
        .get_download_list()
        .iter()
        .all(|m| m.status == TaskStatus::Paused));

    // Resumed loops run to completion once the gate is open.
    gate.add_permits(10);
    manager.resume_all_tasks().await.unwrap();
    assert!(manager
        .get_download_list()
        .iter()
        .all(|m| m.status == TaskStatus::Completed));
}

#[tokio::test]
async fn failed_immediate_start_propagates_and_reports() {
    let store = Arc::new(MemoryStore::new());
    let errors = Arc::new(Mutex::new(Vec::<String>::new()));
    let mut options = ManagerOptions::new("u1");
    options.max_concurrent_downloads = 2;
    options.chunk_size = 1024;
    options.on_error = {
        let errors = Arc::clone(&errors);
        Some(Box::new(move |err: &DownloadError| {
            errors.lock().unwrap().push(err.to_string());
        }))
    };
    let manager = DownloadManager::new(options, store, Arc::new(FailingClient));

    let err = manager.create_task(file_info("a")).await.unwrap_err();
    assert!(!err.is_canceled());
    assert_eq!(status_of(&manager, "a"), Some(TaskStatus::Failed));
    let captured = errors.lock().unwrap();
    assert_eq!(captured.len(), 1);
    assert!(captured[0].contains("HTTP 500"));
}

#[tokio::test]
async fn destroy_empties_registry_and_silences_subscribers() {
    let store = Arc::new(MemoryStore::new());
    let manager = manager_with(Arc::new(InstantClient), Arc::clone(&store), 2);
    manager.create_task(file_info("a")).await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    {
        let calls = Arc::clone(&calls);
        manager.subscribe(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });
    }

    manager.destroy().await.unwrap();
    assert!(manager.get_download_list().is_empty());

    // Whatever happens next must not reach the old subscriber.
    let after = calls.load(Ordering::SeqCst);
    manager.create_task(file_info("b")).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), after);

    // The destroyed task's records are gone.
    let scope = store.open_scope("u1_task_a").await.unwrap();
    assert_eq!(scope.get(KEY_METADATA).await.unwrap(), None);
}
