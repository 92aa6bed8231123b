//! Match coordinator: session creation and joining, ready gating, answer
//! intake, timer-driven round advancement, and completion.
//!
//! Every mutation of a session happens under its handle's lock, so commands
//! arriving concurrently from the gateway, the round timer, and the AI
//! responder are linearized per session.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::session_store::{SessionSnapshot, join_code_key, session_key},
    dto::ws::{Identity, PlayerView, QuestionView, ServerMessage},
    error::MatchError,
    services::{ai_service, websocket_service},
    state::{
        SessionHandle, SharedState, epoch_ms,
        session::{Advance, AnswerOutcome, MatchKind, MatchStatus, Session, UserId},
    },
};

/// Create a session of the given kind with the caller as first player.
///
/// Loads the question snapshot up front; a missing/inactive quiz fails with
/// `ContentUnavailable` and an empty quiz with `NoQuestions`, so an
/// unplayable session is never registered.
pub async fn create_match(
    state: &SharedState,
    identity: &Identity,
    kind: MatchKind,
    quiz_id: i64,
    connection: Option<Uuid>,
    opponent_id: Option<i64>,
) -> Result<(Arc<SessionHandle>, Option<String>), MatchError> {
    if state.registry().get_by_user(identity.user_id).is_some() {
        return Err(MatchError::AlreadyInSession);
    }

    let quiz = state
        .content()
        .find_quiz(quiz_id)
        .await
        .map_err(MatchError::content)?
        .filter(|quiz| quiz.is_active)
        .ok_or_else(|| {
            MatchError::ContentUnavailable(format!("quiz `{quiz_id}` not found or inactive"))
        })?;

    let questions: Vec<_> = state
        .content()
        .load_questions(quiz_id)
        .await
        .map_err(MatchError::content)?
        .into_iter()
        .map(Into::into)
        .collect();
    if questions.is_empty() {
        return Err(MatchError::NoQuestions);
    }

    let config = state.config();
    let max_players = match kind {
        MatchKind::Solo | MatchKind::Friend1v1 => 2,
        MatchKind::Multiplayer => config.max_open_players,
    };
    let time_limit = quiz
        .time_limit_seconds
        .unwrap_or(config.default_time_limit_seconds);

    let mut session = Session::new(kind, quiz_id, max_players, time_limit, questions);
    let join_code = match kind {
        MatchKind::Solo => None,
        MatchKind::Multiplayer | MatchKind::Friend1v1 => {
            Some(state.registry().generate_join_code()?)
        }
    };
    session.join_code = join_code.clone();

    session.add_player(
        identity.user_id,
        identity.display_name.clone(),
        connection,
        false,
    )?;

    if kind == MatchKind::Solo {
        let opponent = match opponent_id {
            Some(id) => config
                .opponent(id)
                .ok_or_else(|| MatchError::ContentUnavailable(format!("opponent `{id}` unknown")))?,
            None => config
                .default_opponent()
                .ok_or_else(|| MatchError::InvalidState("no AI opponents configured".into()))?,
        };
        session.add_player(-opponent.id, opponent.name.clone(), None, true)?;
    }

    let handle = state.registry().insert(session)?;
    info!(session_id = %handle.id, ?kind, quiz_id, user_id = identity.user_id, "match created");

    let session = handle.lock().await;
    persist_snapshot(state, &session).await;
    drop(session);

    Ok((handle, join_code))
}

/// Join a session by its shareable code, rebinding if the caller is already a
/// member. Falls back to a store snapshot when the local registry misses, so
/// a code minted by a sibling process still resolves.
pub async fn join_by_code(
    state: &SharedState,
    identity: &Identity,
    join_code: &str,
    connection: Option<Uuid>,
) -> Result<(Arc<SessionHandle>, Vec<PlayerView>), MatchError> {
    let handle = match state.registry().get_by_join_code(join_code) {
        Some(handle) => handle,
        None => rehydrate_by_key(state, &join_code_key(join_code)).await?,
    };
    register_or_rebind(state, identity, handle, connection).await
}

/// Attach to a session by id, e.g. after a page reload. Known players are
/// rebound; new players may still join while the session is waiting.
pub async fn connect_to_match(
    state: &SharedState,
    identity: &Identity,
    match_id: Uuid,
    connection: Option<Uuid>,
) -> Result<(Arc<SessionHandle>, Vec<PlayerView>), MatchError> {
    let handle = match state.registry().get(match_id) {
        Some(handle) => handle,
        None => rehydrate_by_key(state, &session_key(match_id)).await?,
    };
    register_or_rebind(state, identity, handle, connection).await
}

async fn register_or_rebind(
    state: &SharedState,
    identity: &Identity,
    handle: Arc<SessionHandle>,
    connection: Option<Uuid>,
) -> Result<(Arc<SessionHandle>, Vec<PlayerView>), MatchError> {
    let mut session = handle.lock().await;
    if session.players.contains_key(&identity.user_id) {
        state.registry().try_bind_user(identity.user_id, handle.id)?;
        match connection {
            Some(connection) => {
                session.rebind_connection(identity.user_id, connection)?;
            }
            None => {}
        }
    } else {
        // Claim the user slot before touching the roster, so two racing joins
        // into different sessions cannot both register the player.
        state.registry().try_bind_user(identity.user_id, handle.id)?;
        if let Err(err) = session.add_player(
            identity.user_id,
            identity.display_name.clone(),
            connection,
            false,
        ) {
            state.registry().unbind_user(identity.user_id, handle.id);
            return Err(err);
        }
    }
    persist_snapshot(state, &session).await;

    let roster: Vec<PlayerView> = session.players.values().map(Into::into).collect();
    drop(session);

    Ok((handle, roster))
}

/// Rebuild a session shell from a store snapshot, reloading its question
/// snapshot from the content backend.
async fn rehydrate_by_key(
    state: &SharedState,
    key: &str,
) -> Result<Arc<SessionHandle>, MatchError> {
    let raw = state
        .store()
        .get(key)
        .await
        .ok_or_else(|| MatchError::SessionNotFound(format!("no session under `{key}`")))?;

    // A join-code key stores the session id; a session key stores the
    // snapshot itself. Chase the indirection when needed.
    let snapshot = match SessionSnapshot::decode(&raw) {
        Ok(snapshot) => snapshot,
        Err(_) => {
            let id: Uuid = raw
                .trim()
                .trim_matches('"')
                .parse()
                .map_err(|_| MatchError::SessionNotFound(format!("corrupt entry under `{key}`")))?;
            if let Some(handle) = state.registry().get(id) {
                return Ok(handle);
            }
            let raw = state
                .store()
                .get(&session_key(id))
                .await
                .ok_or_else(|| MatchError::SessionNotFound(format!("session `{id}` expired")))?;
            SessionSnapshot::decode(&raw)
                .map_err(|err| MatchError::SessionNotFound(err.to_string()))?
        }
    };

    if snapshot.status != MatchStatus::Waiting.as_str() {
        return Err(MatchError::InvalidState(
            "match is no longer joinable".into(),
        ));
    }

    let kind = MatchKind::parse(&snapshot.kind)
        .ok_or_else(|| MatchError::SessionNotFound("snapshot has unknown kind".into()))?;

    let quiz = state
        .content()
        .find_quiz(snapshot.quiz_id)
        .await
        .map_err(MatchError::content)?
        .ok_or_else(|| {
            MatchError::ContentUnavailable(format!("quiz `{}` no longer exists", snapshot.quiz_id))
        })?;
    let questions: Vec<_> = state
        .content()
        .load_questions(snapshot.quiz_id)
        .await
        .map_err(MatchError::content)?
        .into_iter()
        .map(Into::into)
        .collect();
    if questions.is_empty() {
        return Err(MatchError::NoQuestions);
    }

    let config = state.config();
    let max_players = snapshot.max_players.max(2);
    let time_limit = quiz
        .time_limit_seconds
        .unwrap_or(config.default_time_limit_seconds);

    let mut session = Session::new(kind, snapshot.quiz_id, max_players, time_limit, questions);
    session.id = snapshot.id;
    session.join_code = snapshot.join_code.clone();
    for player in &snapshot.players {
        session.add_player(
            player.user_id,
            player.display_name.clone(),
            None,
            player.is_ai,
        )?;
        if player.is_ready {
            session.set_ready(player.user_id, true)?;
        }
    }

    info!(session_id = %snapshot.id, "rehydrated session from store snapshot");
    state.registry().insert(session)
}

/// Mark the caller ready and start the match when the start condition holds.
pub async fn set_ready(
    state: &SharedState,
    identity: &Identity,
    ready: bool,
) -> Result<(), MatchError> {
    let handle = state
        .registry()
        .get_by_user(identity.user_id)
        .ok_or_else(|| MatchError::SessionNotFound("you are not in a match".into()))?;

    let mut session = handle.lock().await;
    let player = session.set_ready(identity.user_id, ready)?;
    let event = ServerMessage::PlayerReady {
        user_id: player.user_id,
        username: player.display_name.clone(),
        is_ready: player.is_ready,
    };
    websocket_service::broadcast_to_session(state, &session, &event);

    if session.ready_to_start() {
        start_session(state, &mut session).await;
    } else {
        persist_snapshot(state, &session).await;
    }

    Ok(())
}

/// Transition a waiting session into its first round: deal question zero,
/// arm the round timer, and wake the AI responder.
async fn start_session(state: &SharedState, session: &mut Session) {
    match session.start(epoch_ms()) {
        Ok(question) => {
            let event = ServerMessage::MatchStarted {
                question: QuestionView::from(question),
                question_index: 0,
                total_questions: session.questions.len(),
            };
            if let Some(code) = &session.join_code {
                state.registry().release_join_code(code);
                state.store().delete(&join_code_key(code)).await;
            }
            info!(session_id = %session.id, total = session.questions.len(), "match started");
            websocket_service::broadcast_to_session(state, session, &event);
            arm_round_timer(state, session, 0);
            ai_service::schedule_round(state, session);
            persist_snapshot(state, session).await;
        }
        Err(err) => {
            // Creation blocks empty quizzes, so this only fires if content
            // changed under us. The session stays WAITING.
            warn!(session_id = %session.id, error = %err, "match could not start");
            websocket_service::broadcast_to_session(
                state,
                session,
                &ServerMessage::Error {
                    message: err.to_string(),
                },
            );
        }
    }
}

/// Score a submission for the calling player. On success the private outcome
/// is returned for the gateway to deliver; when this was the last answer of
/// the round, the session advances immediately without waiting for the timer.
pub async fn submit_answer(
    state: &SharedState,
    identity: &Identity,
    question_id: i64,
    selected_options: Vec<i64>,
    time_spent_seconds: f64,
) -> Result<AnswerOutcome, MatchError> {
    let handle = state
        .registry()
        .get_by_user(identity.user_id)
        .ok_or_else(|| MatchError::SessionNotFound("you are not in a match".into()))?;

    let mut session = handle.lock().await;
    let outcome = session.submit_answer(
        identity.user_id,
        question_id,
        selected_options.into_iter().collect::<BTreeSet<_>>(),
        time_spent_seconds,
    )?;

    // Deliver the private result while still holding the lock, so the
    // submitter sees it before any advance broadcast their answer triggers.
    let event = ServerMessage::AnswerResult {
        is_correct: outcome.is_correct,
        points: outcome.points_awarded,
        correct_options: outcome.correct_option_ids.clone(),
        total_score: outcome.total_score,
    };
    if let Some(connection) = session
        .players
        .get(&identity.user_id)
        .and_then(|player| player.connection)
    {
        websocket_service::send_to_connection(state, connection, &event);
    }

    if session.all_answered() {
        advance_locked(state, &mut session).await;
    }

    Ok(outcome)
}

/// Synthetic submission path for AI players; reuses the exact scoring and
/// advance logic of human submissions.
pub(crate) async fn submit_ai_answer(
    state: &SharedState,
    session_id: Uuid,
    user_id: UserId,
    question_id: i64,
    selected_options: BTreeSet<i64>,
    time_spent_seconds: f64,
) {
    let Some(handle) = state.registry().get(session_id) else {
        return;
    };
    let mut session = handle.lock().await;

    // The round may have advanced while the AI was "thinking".
    if session.status != MatchStatus::InProgress
        || session.current_question().map(|q| q.id) != Some(question_id)
    {
        return;
    }

    match session.submit_answer(user_id, question_id, selected_options, time_spent_seconds) {
        Ok(outcome) => {
            debug!(
                session_id = %session_id,
                user_id,
                correct = outcome.is_correct,
                points = outcome.points_awarded,
                "AI answer scored"
            );
            if session.all_answered() {
                advance_locked(state, &mut session).await;
            }
        }
        Err(err) => debug!(session_id = %session_id, user_id, error = %err, "AI answer rejected"),
    }
}

/// Advance past the current question. Must be called with the session lock
/// held; fires at most once per round because callers re-validate the round
/// index under that same lock.
pub(crate) async fn advance_locked(state: &SharedState, session: &mut Session) {
    match session.advance(epoch_ms()) {
        Ok(Advance::NextQuestion(index)) => {
            let question = &session.questions[index];
            let event = ServerMessage::NextQuestion {
                question: QuestionView::from(question),
                question_index: index,
                total_questions: session.questions.len(),
            };
            websocket_service::broadcast_to_session(state, session, &event);
            arm_round_timer(state, session, index);
            ai_service::schedule_round(state, session);
        }
        Ok(Advance::Completed) => complete_session(state, session).await,
        Err(err) => warn!(session_id = %session.id, error = %err, "advance rejected"),
    }
}

/// Compute and broadcast final results, then schedule teardown after a short
/// grace so the completion event reaches every member first.
async fn complete_session(state: &SharedState, session: &mut Session) {
    let results = session.results();
    let views: Vec<_> = results.iter().map(Into::into).collect();
    let winner = results.first().map(Into::into);
    let event = ServerMessage::MatchCompleted {
        match_id: session.id,
        results: views,
        winner,
        completed_at: crate::dto::format_timestamp(time::OffsetDateTime::now_utc()),
    };
    info!(session_id = %session.id, players = session.players.len(), "match completed");
    websocket_service::broadcast_to_session(state, session, &event);

    let session_id = session.id;
    let grace = state.config().completion_grace;
    let state = state.clone();
    tokio::spawn(async move {
        sleep(grace).await;
        teardown_session(&state, session_id).await;
    });
}

/// Remove a session from the registry and purge its store keys. Idempotent.
pub async fn teardown_session(state: &SharedState, session_id: Uuid) {
    let Some(handle) = state.registry().remove(session_id).await else {
        return;
    };
    let join_code = {
        let session = handle.lock().await;
        session.join_code.clone()
    };
    state.store().delete(&session_key(session_id)).await;
    if let Some(code) = join_code {
        state.store().delete(&join_code_key(code.as_str())).await;
    }
    debug!(session_id = %session_id, "session torn down");
}

/// Arm the authoritative backstop for the round at `round_index`: when the
/// timer fires, the session advances no matter how many players answered.
/// The captured index makes a superseded timer a no-op.
fn arm_round_timer(state: &SharedState, session: &Session, round_index: usize) {
    let session_id = session.id;
    let limit = Duration::from_secs(u64::from(session.time_limit_seconds));
    let state = state.clone();

    tokio::spawn(async move {
        sleep(limit).await;
        let Some(handle) = state.registry().get(session_id) else {
            return;
        };
        let mut session = handle.lock().await;
        if session.status == MatchStatus::InProgress
            && session.current_question_index == Some(round_index)
        {
            debug!(session_id = %session_id, round_index, "round timer fired");
            advance_locked(&state, &mut session).await;
        }
    });
}

/// Best-effort snapshot persistence; failures are absorbed by the store slot.
async fn persist_snapshot(state: &SharedState, session: &Session) {
    let snapshot = SessionSnapshot::from(session);
    let ttl = state.config().snapshot_ttl;
    match snapshot.encode() {
        Ok(encoded) => {
            state
                .store()
                .set(&session_key(session.id), encoded, ttl)
                .await;
            if session.status == MatchStatus::Waiting
                && let Some(code) = &session.join_code
            {
                state
                    .store()
                    .set(&join_code_key(code), session.id.to_string(), ttl)
                    .await;
            }
        }
        Err(err) => warn!(session_id = %session.id, error = %err, "snapshot encoding failed"),
    }
}
