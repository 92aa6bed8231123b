/// Session registry and single-writer session handles.
pub mod registry;
/// Session data model and per-session state machine.
pub mod session;

use std::{sync::Arc, time::Duration};

use axum::extract::ws::Message;
use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::sync::{RwLock, mpsc, watch};
use tracing::warn;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        content::ContentSource,
        session_store::{SessionStore, memory::MemorySessionStore},
    },
};

pub use self::registry::{SessionHandle, SessionRegistry};

/// Shared handle to the application state.
pub type SharedState = Arc<AppState>;

/// Handle used to push messages to a connected client.
#[derive(Clone)]
pub struct WsConnection {
    /// Connection identifier.
    pub id: Uuid,
    /// Writer-task channel for this socket.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Best-effort snapshot store: an optional external backend with a
/// process-local fallback. Backend failures are logged and absorbed; the
/// degraded flag is the only external signal.
pub struct SessionStoreSlot {
    external: RwLock<Option<Arc<dyn SessionStore>>>,
    local: MemorySessionStore,
    degraded: watch::Sender<bool>,
}

impl SessionStoreSlot {
    fn new() -> Self {
        let (degraded_tx, _rx) = watch::channel(true);
        Self {
            external: RwLock::new(None),
            local: MemorySessionStore::new(),
            degraded: degraded_tx,
        }
    }

    /// Install an external backend and leave degraded mode.
    pub async fn install(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.external.write().await;
            *guard = Some(store);
        }
        let _ = self.degraded.send(false);
    }

    /// Drop the external backend and enter degraded mode.
    pub async fn clear(&self) {
        {
            let mut guard = self.external.write().await;
            guard.take();
        }
        let _ = self.degraded.send(true);
    }

    /// Whether the slot is running on the local fallback only.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.external.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Current external backend, if installed.
    pub async fn external(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.external.read().await;
        guard.as_ref().cloned()
    }

    /// Fetch a value, preferring the external backend and falling back to the
    /// local map when it is absent or failing.
    pub async fn get(&self, key: &str) -> Option<String> {
        if let Some(store) = self.external().await {
            match store.get(key.to_string()).await {
                Ok(Some(value)) => return Some(value),
                Ok(None) => {}
                Err(err) => warn!(key, error = %err, "session store read failed"),
            }
        }
        self.local.get_sync(key)
    }

    /// Store a value in both the external backend (best-effort) and the local
    /// fallback, so a backend outage never loses the working set.
    pub async fn set(&self, key: &str, value: String, ttl: Duration) {
        if let Some(store) = self.external().await
            && let Err(err) = store.set(key.to_string(), value.clone(), ttl).await
        {
            warn!(key, error = %err, "session store write failed");
        }
        self.local.set_sync(key.to_string(), value, ttl);
    }

    /// Delete a key everywhere. Absent keys are fine.
    pub async fn delete(&self, key: &str) {
        if let Some(store) = self.external().await
            && let Err(err) = store.delete(key.to_string()).await
        {
            warn!(key, error = %err, "session store delete failed");
        }
        self.local.delete_sync(key);
    }

    /// Whether a live value exists under `key`.
    pub async fn exists(&self, key: &str) -> bool {
        if let Some(store) = self.external().await {
            match store.exists(key.to_string()).await {
                Ok(found) => return found || self.local.exists_sync(key),
                Err(err) => warn!(key, error = %err, "session store exists failed"),
            }
        }
        self.local.exists_sync(key)
    }
}

/// Central application state: registry, content source, snapshot store, and
/// live connections.
pub struct AppState {
    config: AppConfig,
    content: Arc<dyn ContentSource>,
    store: SessionStoreSlot,
    registry: SessionRegistry,
    connections: DashMap<Uuid, WsConnection>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned
    /// cheaply. The store starts degraded until a backend is installed.
    pub fn new(config: AppConfig, content: Arc<dyn ContentSource>) -> SharedState {
        Arc::new(Self {
            config,
            content,
            store: SessionStoreSlot::new(),
            registry: SessionRegistry::new(),
            connections: DashMap::new(),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Quiz content and identity backend.
    pub fn content(&self) -> &Arc<dyn ContentSource> {
        &self.content
    }

    /// Snapshot store slot.
    pub fn store(&self) -> &SessionStoreSlot {
        &self.store
    }

    /// Active session registry.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Registry of live client sockets keyed by connection id.
    pub fn connections(&self) -> &DashMap<Uuid, WsConnection> {
        &self.connections
    }
}

/// Current wall-clock time as epoch milliseconds.
pub fn epoch_ms() -> u64 {
    let now = OffsetDateTime::now_utc();
    (now.unix_timestamp_nanos() / 1_000_000) as u64
}
