//! `rdm get` – download one or more URLs through the task fleet.
//!
//! Task ids are derived from the URL so a re-run of the same command picks
//! the persisted chunk state back up. Ctrl-C pauses the fleet instead of
//! dropping it.

use anyhow::{Context, Result};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rdm_core::client::http::HttpTransferClient;
use rdm_core::client::TransferClient;
use rdm_core::config::RdmConfig;
use rdm_core::error::DownloadError;
use rdm_core::manager::{DownloadManager, ManagerOptions};
use rdm_core::storage::sqlite::SqliteStore;
use rdm_core::task::{FileInfo, TaskStatus};
use rdm_core::util::{format_size, Throttle};

/// Stable per-URL task id so progress survives across runs.
fn task_id_for(url: &str) -> String {
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

pub async fn run_get(
    cfg: &RdmConfig,
    urls: &[String],
    out_dir: &Path,
    jobs: Option<usize>,
) -> Result<()> {
    let store = Arc::new(SqliteStore::open_default(&cfg.namespace).await?);
    let client = Arc::new(HttpTransferClient::new()?);

    let mut options = ManagerOptions::new(cfg.namespace.clone());
    options.max_concurrent_downloads = jobs.unwrap_or(cfg.max_concurrent_downloads);
    options.chunk_size = cfg.chunk_size_bytes;
    options.on_error = Some(Box::new(|err: &DownloadError| {
        eprintln!("download error: {err}");
    }));
    let client_dyn: Arc<dyn TransferClient> = client.clone();
    let manager = DownloadManager::new(options, store, client_dyn);

    // One status render at most every 500ms, plus a completion signal once
    // every expected task reaches a terminal state.
    let expected = urls.len();
    let throttle = Throttle::new(Duration::from_millis(500));
    let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel::<()>();
    let _subscription = manager.subscribe(move |list| {
        throttle.call(|| {
            for meta in list {
                println!(
                    "  {}  {:>6.2}%  {}  [{}]",
                    meta.filename,
                    meta.progress,
                    meta.speed,
                    meta.status.as_str()
                );
            }
        });
        if list.len() == expected && list.iter().all(|m| m.status.is_terminal()) {
            let _ = done_tx.send(());
        }
    });

    // Create every task; admitted ones run their download inside the spawned
    // create call, the rest queue and get promoted as slots free up.
    let mut creates = tokio::task::JoinSet::new();
    for url in urls {
        let manager = manager.clone();
        let client = Arc::clone(&client);
        let url = url.clone();
        creates.spawn(async move {
            let probe = client.probe(&url).await?;
            let total = probe
                .total_size
                .context("server did not report Content-Length")?;
            let filename = probe.filename.unwrap_or_else(|| "download.bin".to_string());
            let file = FileInfo {
                task_id: task_id_for(&url),
                file_url: url.clone(),
                filename,
                file_size: total,
            };
            let task = manager.create_task(file).await?;
            // A task restored in the paused state needs an explicit resume.
            let meta = task.get_metadata();
            if meta.status == TaskStatus::Paused {
                manager.resume_task(&meta.task_id).await?;
            }
            anyhow::Ok(())
        });
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\npausing downloads; re-run the same command to resume");
                manager.pause_all_tasks().await?;
                return Ok(());
            }
            joined = creates.join_next(), if !creates.is_empty() => {
                if let Some(res) = joined {
                    res.context("create task")??;
                }
            }
            _ = done_rx.recv() => break,
        }
    }

    // Write out everything that finished, then drop its persisted chunks.
    for meta in manager.get_download_list() {
        if meta.status == TaskStatus::Completed {
            let Some(task) = manager.get_task(&meta.task_id) else {
                continue;
            };
            if let Some(bytes) = task.assembled() {
                let path = out_dir.join(&meta.filename);
                tokio::fs::write(&path, &bytes)
                    .await
                    .with_context(|| format!("write {}", path.display()))?;
                println!("saved {} ({})", path.display(), format_size(bytes.len() as u64));
                manager.remove_task(&meta.task_id).await?;
            }
        } else {
            eprintln!(
                "{}: {}",
                meta.filename,
                meta.error.as_deref().unwrap_or("not completed")
            );
        }
    }

    Ok(())
}
