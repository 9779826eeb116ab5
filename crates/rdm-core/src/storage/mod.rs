//! Persistence port: per-task keyed scopes holding the metadata and chunk
//! records a transfer needs to survive interruption.
//!
//! Each task owns exactly one scope; a scope is never shared between tasks.
//! Backends must tolerate "store not yet created" as a non-fatal empty
//! result on reads and clears.

mod records;

pub mod memory;
pub mod sqlite;


pub use records::{decode_chunks, decode_metadata, encode_chunks, encode_metadata};

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Record key for the task metadata snapshot.
pub const KEY_METADATA: &str = "metadata";

/// Record key for the chunk map.
pub const KEY_CHUNKS: &str = "chunks";

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// The underlying store failed (connection, I/O, SQL).
    #[error("storage backend: {0}")]
    Backend(String),
    /// A persisted record could not be encoded or decoded.
    #[error("storage codec: {0}")]
    Codec(String),
}

/// Opens per-task scopes and owns the store connection.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Opens (creating if needed) the isolated scope for one task's records.
    async fn open_scope(&self, scope: &str) -> Result<Arc<dyn StorageScope>, StorageError>;

    /// Closes the store connection. Scopes opened from this backend must not
    /// be used afterwards.
    async fn close(&self) -> Result<(), StorageError>;
}

/// One task's isolated key/value store.
#[async_trait]
pub trait StorageScope: Send + Sync {
    /// Prepares the scope for use. Backends that migrate at store open may
    /// make this a no-op.
    async fn init(&self) -> Result<(), StorageError>;

    /// Reads a record; `None` when the key (or the scope itself) is absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Writes a record, replacing any previous value.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    /// Deletes one record; absent keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Deletes every record in the scope; an absent scope is not an error.
    async fn clear(&self) -> Result<(), StorageError>;

    /// Tears down the scope itself.
    async fn delete_store(&self) -> Result<(), StorageError>;

    /// Releases this scope's handle on the store connection.
    async fn close(&self) -> Result<(), StorageError>;
}
