//! Small key/value storage port (throttle counters, readiness flags, ids).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::StoreError;

/// Persistent string key/value store supplied by the host.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value. A missing key is `Ok(None)`, not an error.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write several entries atomically: either all land or none do.
    async fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError>;

    /// Delete a key. Deleting an absent key is a no-op.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.set_many(&[(key, value)]).await
    }
}

#[async_trait]
impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }

    async fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        (**self).set_many(entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key).await
    }
}

/// In-memory key/value store for tests/dev. Not durable.
#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        Ok(entries.get(key).cloned())
    }

    async fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        let mut map = self.entries.write().unwrap_or_else(|p| p.into_inner());
        for (key, value) in entries {
            map.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut map = self.entries.write().unwrap_or_else(|p| p.into_inner());
        map.remove(key);
        Ok(())
    }
}
