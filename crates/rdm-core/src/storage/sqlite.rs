//! SQLite-backed storage (via sqlx): one `records` table keyed by
//! (scope, key), one scope per task.
//!
//! Schema migration runs once when the store is opened, never when a scope
//! is opened — a scope open is just a handle construction.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{StorageBackend, StorageError, StorageScope};

/// Percent-encode a path for a sqlite:// URI so spaces and special
/// characters don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}?mode=rwc", out)
}

fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn backend_err(e: sqlx::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// Handle to the SQLite-backed record store.
///
/// One database file per namespace, stored under the XDG state directory:
/// `~/.local/state/rdm/<namespace>.db`.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) the default store for `namespace` and run migrations.
    pub async fn open_default(namespace: &str) -> Result<Self, StorageError> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("rdm")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let state_dir = xdg_dirs.get_state_home();
        tokio::fs::create_dir_all(&state_dir)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let db_path = state_dir.join(format!("{}.db", namespace));
        Self::open_at(&db_path).await
    }

    /// Open (or create) a store at a specific path. Creates parent dirs if
    /// needed. Intended for tests so the store can live in a temp directory.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        let uri = path_to_sqlite_uri(path);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&uri)
            .await
            .map_err(backend_err)?;

        let store = SqliteStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                scope TEXT NOT NULL,
                key TEXT NOT NULL,
                value BLOB NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (scope, key)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for SqliteStore {
    async fn open_scope(&self, scope: &str) -> Result<Arc<dyn StorageScope>, StorageError> {
        Ok(Arc::new(SqliteScope {
            pool: self.pool.clone(),
            scope: scope.to_string(),
        }))
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}

struct SqliteScope {
    pool: Pool<Sqlite>,
    scope: String,
}

#[async_trait]
impl StorageScope for SqliteScope {
    async fn init(&self) -> Result<(), StorageError> {
        // Migration already ran at store open.
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let row = sqlx::query("SELECT value FROM records WHERE scope = ?1 AND key = ?2")
            .bind(&self.scope)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(row.map(|r| r.get::<Vec<u8>, _>("value")))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO records (scope, key, value, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (scope, key)
            DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(&self.scope)
        .bind(key)
        .bind(value)
        .bind(unix_timestamp())
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM records WHERE scope = ?1 AND key = ?2")
            .bind(&self.scope)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM records WHERE scope = ?1")
            .bind(&self.scope)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn delete_store(&self) -> Result<(), StorageError> {
        // With rows-per-scope, tearing down the scope is the same delete as
        // clear; kept separate to honor the port contract.
        self.clear().await
    }

    async fn close(&self) -> Result<(), StorageError> {
        // The pool is owned by the store; scope handles have nothing to
        // release individually.
        Ok(())
    }
}

#[cfg(test)]
/// Open an in-memory store for tests (no disk I/O).
pub(crate) async fn open_memory() -> Result<SqliteStore, StorageError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .map_err(backend_err)?;
    let store = SqliteStore { pool };
    store.migrate().await?;
    Ok(store)
}
