//! In-memory storage backend for tests and ephemeral embedders.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{StorageBackend, StorageError, StorageScope};

type ScopeMap = HashMap<String, HashMap<String, Vec<u8>>>;

/// Keeps every scope's records in a shared map; reads on absent scopes
/// return empty, matching the port's tolerance contract.
#[derive(Default)]
pub struct MemoryStore {
    scopes: Arc<Mutex<ScopeMap>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryStore {
    async fn open_scope(&self, scope: &str) -> Result<Arc<dyn StorageScope>, StorageError> {
        Ok(Arc::new(MemoryScope {
            scopes: Arc::clone(&self.scopes),
            scope: scope.to_string(),
        }))
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

struct MemoryScope {
    scopes: Arc<Mutex<ScopeMap>>,
    scope: String,
}

#[async_trait]
impl StorageScope for MemoryScope {
    async fn init(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let scopes = self.scopes.lock().unwrap();
        Ok(scopes.get(&self.scope).and_then(|s| s.get(key)).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        let mut scopes = self.scopes.lock().unwrap();
        scopes
            .entry(self.scope.clone())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut scopes = self.scopes.lock().unwrap();
        if let Some(records) = scopes.get_mut(&self.scope) {
            records.remove(key);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let mut scopes = self.scopes.lock().unwrap();
        if let Some(records) = scopes.get_mut(&self.scope) {
            records.clear();
        }
        Ok(())
    }

    async fn delete_store(&self) -> Result<(), StorageError> {
        self.scopes.lock().unwrap().remove(&self.scope);
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
