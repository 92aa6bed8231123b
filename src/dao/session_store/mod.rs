//! Best-effort key/value persistence for session snapshots.
//!
//! The contract is deliberately minimal: get, set-with-ttl, delete, exists.
//! Snapshots let a join-by-code request reaching a sibling process (or a
//! restarted coordinator) locate a session shell and rehydrate it.

/// External HTTP key/value backend.
pub mod http;
/// Process-local fallback backend.
pub mod memory;

use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::storage::{StorageError, StorageResult};

/// Key under which a session snapshot is stored.
pub fn session_key(id: Uuid) -> String {
    format!("session:{id}")
}

/// Key under which a join code maps to a session id. Codes are upper-cased on
/// storage so lookups stay case-insensitive.
pub fn join_code_key(code: &str) -> String {
    format!("join-code:{}", code.to_ascii_uppercase())
}

/// Minimal persisted view of a session, enough to rebuild a shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session identifier.
    pub id: Uuid,
    /// Quiz the session plays.
    pub quiz_id: i64,
    /// Join code, when the session is joinable by code.
    pub join_code: Option<String>,
    /// Session status at snapshot time ("WAITING" etc.).
    pub status: String,
    /// Session kind ("SOLO" / "MULTIPLAYER" / "FRIEND_1V1").
    pub kind: String,
    /// Capacity of the session.
    pub max_players: usize,
    /// RFC3339 creation timestamp.
    pub created_at: String,
    /// Registered players.
    pub players: Vec<SnapshotPlayer>,
}

/// Per-player slice of a [`SessionSnapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPlayer {
    /// User identifier.
    pub user_id: i64,
    /// Display name at snapshot time.
    pub display_name: String,
    /// Ready flag at snapshot time.
    pub is_ready: bool,
    /// Whether the player is a scripted AI opponent.
    #[serde(default)]
    pub is_ai: bool,
}

impl SessionSnapshot {
    /// Encode the snapshot as the stored string value.
    pub fn encode(&self) -> StorageResult<String> {
        serde_json::to_string(self)
            .map_err(|source| StorageError::decode("encoding session snapshot".into(), source))
    }

    /// Decode a stored value back into a snapshot.
    pub fn decode(raw: &str) -> StorageResult<Self> {
        serde_json::from_str(raw)
            .map_err(|source| StorageError::decode("decoding session snapshot".into(), source))
    }
}

/// Minimal key/value contract implemented by snapshot backends.
pub trait SessionStore: Send + Sync {
    /// Fetch the value stored under `key`, if any.
    fn get(&self, key: String) -> BoxFuture<'static, StorageResult<Option<String>>>;
    /// Store `value` under `key` with a bounded lifetime.
    fn set(&self, key: String, value: String, ttl: Duration)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Remove the value stored under `key`; absent keys are not an error.
    fn delete(&self, key: String) -> BoxFuture<'static, StorageResult<()>>;
    /// Whether a live value exists under `key`.
    fn exists(&self, key: String) -> BoxFuture<'static, StorageResult<bool>>;
    /// Probe backend connectivity.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
