//! Authoritative in-memory index of active sessions.
//!
//! Three maps are kept consistent: session id → handle, user id → session id,
//! join code → session id. The registry is the only place allowed to insert
//! or remove entries; per-session mutation goes through the handle's lock so
//! each session has a single writer.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use rand::Rng;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::{
    error::MatchError,
    state::session::{Session, UserId},
};

/// Alphabet for join codes.
const JOIN_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
/// Length of a join code.
pub const JOIN_CODE_LENGTH: usize = 6;
/// Collision retries before giving up on code generation.
const JOIN_CODE_MAX_ATTEMPTS: usize = 5;

/// Shared handle serializing all mutation of one session.
#[derive(Debug)]
pub struct SessionHandle {
    /// Session id, readable without taking the lock.
    pub id: Uuid,
    session: Mutex<Session>,
}

impl SessionHandle {
    fn new(session: Session) -> Arc<Self> {
        Arc::new(Self {
            id: session.id,
            session: Mutex::new(session),
        })
    }

    /// Acquire the single-writer lock for this session.
    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().await
    }
}

/// Concurrent index maps over the active sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, Arc<SessionHandle>>,
    by_user: DashMap<UserId, Uuid>,
    by_join_code: DashMap<String, Uuid>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw a fresh join code: 6 uniform characters from `[A-Z0-9]`, retried
    /// a bounded number of times on collision with a live code.
    pub fn generate_join_code(&self) -> Result<String, MatchError> {
        let mut rng = rand::rng();
        for _ in 0..JOIN_CODE_MAX_ATTEMPTS {
            let code: String = (0..JOIN_CODE_LENGTH)
                .map(|_| {
                    let index = rng.random_range(0..JOIN_CODE_CHARSET.len());
                    JOIN_CODE_CHARSET[index] as char
                })
                .collect();
            if !self.by_join_code.contains_key(&code) {
                return Ok(code);
            }
        }
        Err(MatchError::JoinCodeExhausted)
    }

    /// Register a session, indexing its join code and every already-present
    /// player. Human players may only be in one live session at a time; each
    /// user slot is claimed atomically through the map entry, so two racing
    /// inserts can never both win the same user.
    pub fn insert(&self, session: Session) -> Result<Arc<SessionHandle>, MatchError> {
        let id = session.id;
        let mut claimed: Vec<UserId> = Vec::new();
        for player in session.players.values().filter(|player| !player.is_ai) {
            let conflict = match self.by_user.entry(player.user_id) {
                Entry::Occupied(_) => true,
                Entry::Vacant(slot) => {
                    slot.insert(id);
                    claimed.push(player.user_id);
                    false
                }
            };
            if conflict {
                for user_id in claimed {
                    self.by_user.remove_if(&user_id, |_, mapped| *mapped == id);
                }
                return Err(MatchError::AlreadyInSession);
            }
        }

        if let Some(code) = &session.join_code {
            self.by_join_code.insert(code.to_ascii_uppercase(), id);
        }

        let handle = SessionHandle::new(session);
        self.sessions.insert(id, handle.clone());
        Ok(handle)
    }

    /// Look up a session by id.
    pub fn get(&self, id: Uuid) -> Option<Arc<SessionHandle>> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    /// Look up a session by join code, case-insensitively.
    pub fn get_by_join_code(&self, code: &str) -> Option<Arc<SessionHandle>> {
        let id = *self.by_join_code.get(&code.to_ascii_uppercase())?;
        self.get(id)
    }

    /// The session a user is currently registered in, if any.
    pub fn get_by_user(&self, user_id: UserId) -> Option<Arc<SessionHandle>> {
        let id = *self.by_user.get(&user_id)?;
        self.get(id)
    }

    /// Claim a user slot for a session. The claim goes through the map entry,
    /// so of two racing joins into different sessions exactly one wins; a
    /// repeat claim for the same session is fine.
    pub fn try_bind_user(&self, user_id: UserId, session_id: Uuid) -> Result<(), MatchError> {
        let bound = match self.by_user.entry(user_id) {
            Entry::Occupied(slot) => *slot.get() == session_id,
            Entry::Vacant(slot) => {
                slot.insert(session_id);
                true
            }
        };
        if bound {
            Ok(())
        } else {
            Err(MatchError::AlreadyInSession)
        }
    }

    /// Release a user slot, but only if it still points at the given session.
    pub fn unbind_user(&self, user_id: UserId, session_id: Uuid) {
        self.by_user.remove_if(&user_id, |_, mapped| *mapped == session_id);
    }

    /// Drop a join code from the lookup table, e.g. once the session leaves
    /// the waiting state. The session keeps the code for display.
    pub fn release_join_code(&self, code: &str) {
        self.by_join_code.remove(&code.to_ascii_uppercase());
    }

    /// Ids of all live sessions.
    pub fn session_ids(&self) -> Vec<Uuid> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    /// Remove a session and purge all three indexes. Idempotent.
    pub async fn remove(&self, id: Uuid) -> Option<Arc<SessionHandle>> {
        let (_, handle) = self.sessions.remove(&id)?;

        let (join_code, user_ids) = {
            let session = handle.lock().await;
            (
                session.join_code.clone(),
                session
                    .players
                    .values()
                    .filter(|player| !player.is_ai)
                    .map(|player| player.user_id)
                    .collect::<Vec<_>>(),
            )
        };

        if let Some(code) = join_code {
            self.by_join_code.remove(&code.to_ascii_uppercase());
        }
        for user_id in user_ids {
            // Another session may have claimed the user meanwhile.
            self.by_user.remove_if(&user_id, |_, mapped| *mapped == id);
        }

        Some(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session::MatchKind;

    fn waiting_session(creator: UserId) -> Session {
        let mut session = Session::new(MatchKind::Friend1v1, 1, 2, 30, Vec::new());
        session
            .add_player(creator, format!("user-{creator}"), None, false)
            .unwrap();
        session
    }

    #[test]
    fn join_codes_have_expected_shape() {
        let registry = SessionRegistry::new();
        let code = registry.generate_join_code().unwrap();
        assert_eq!(code.len(), JOIN_CODE_LENGTH);
        assert!(
            code.chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        );
    }

    #[tokio::test]
    async fn join_code_lookup_is_case_insensitive() {
        let registry = SessionRegistry::new();
        let mut session = waiting_session(1);
        let code = registry.generate_join_code().unwrap();
        session.join_code = Some(code.clone());
        let handle = registry.insert(session).unwrap();

        let found = registry.get_by_join_code(&code.to_lowercase()).unwrap();
        assert_eq!(found.id, handle.id);
    }

    #[tokio::test]
    async fn user_index_points_at_current_session() {
        let registry = SessionRegistry::new();
        let handle = registry.insert(waiting_session(7)).unwrap();
        assert_eq!(registry.get_by_user(7).unwrap().id, handle.id);

        let err = registry.insert(waiting_session(7)).unwrap_err();
        assert!(matches!(err, MatchError::AlreadyInSession));
    }

    #[test]
    fn user_slot_is_claimed_exactly_once() {
        let registry = SessionRegistry::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        registry.try_bind_user(1, first).unwrap();
        // Repeat claim for the same session is a no-op.
        registry.try_bind_user(1, first).unwrap();
        let err = registry.try_bind_user(1, second).unwrap_err();
        assert!(matches!(err, MatchError::AlreadyInSession));

        // Unbinding checks the owner, so the loser cannot free the slot.
        registry.unbind_user(1, second);
        let err = registry.try_bind_user(1, second).unwrap_err();
        assert!(matches!(err, MatchError::AlreadyInSession));

        registry.unbind_user(1, first);
        registry.try_bind_user(1, second).unwrap();
    }

    #[tokio::test]
    async fn remove_purges_all_indexes_and_is_idempotent() {
        let registry = SessionRegistry::new();
        let mut session = waiting_session(7);
        session.join_code = Some("ABC123".into());
        let handle = registry.insert(session).unwrap();
        let id = handle.id;

        assert!(registry.remove(id).await.is_some());
        assert!(registry.get(id).is_none());
        assert!(registry.get_by_user(7).is_none());
        assert!(registry.get_by_join_code("abc123").is_none());
        assert!(registry.remove(id).await.is_none());
    }
}
