use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::{session_store::SessionStore, storage::StorageResult};

/// Process-local [`SessionStore`] used when the external cache is unreachable.
///
/// Entries carry their expiry instant and are dropped lazily on access, so no
/// sweeper task is needed for the handful of keys a coordinator keeps alive.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: DashMap<String, (String, Instant)>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let expired = match self.entries.get(key) {
            Some(entry) => {
                let (value, expires_at) = entry.value();
                if Instant::now() < *expires_at {
                    return Some(value.clone());
                }
                true
            }
            None => false,
        };

        if expired {
            self.entries.remove(key);
        }
        None
    }

    /// Synchronous variants used by the store slot without boxing a future.
    pub fn get_sync(&self, key: &str) -> Option<String> {
        self.live_value(key)
    }

    /// Store a value with its TTL.
    pub fn set_sync(&self, key: String, value: String, ttl: Duration) {
        self.entries.insert(key, (value, Instant::now() + ttl));
    }

    /// Remove a key if present.
    pub fn delete_sync(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Whether a live value exists.
    pub fn exists_sync(&self, key: &str) -> bool {
        self.live_value(key).is_some()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: String) -> BoxFuture<'static, StorageResult<Option<String>>> {
        let value = self.live_value(&key);
        Box::pin(async move { Ok(value) })
    }

    fn set(
        &self,
        key: String,
        value: String,
        ttl: Duration,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.set_sync(key, value, ttl);
        Box::pin(async move { Ok(()) })
    }

    fn delete(&self, key: String) -> BoxFuture<'static, StorageResult<()>> {
        self.delete_sync(&key);
        Box::pin(async move { Ok(()) })
    }

    fn exists(&self, key: String) -> BoxFuture<'static, StorageResult<bool>> {
        let found = self.exists_sync(&key);
        Box::pin(async move { Ok(found) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move { Ok(()) })
    }
}
