use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::session_store::{SessionSnapshot, join_code_key, session_key},
    dto::{
        matches::{
            CreateFriendMatchRequest, CreateFriendMatchResponse, MatchSummary, OpponentView,
        },
        ws::Identity,
    },
    error::AppError,
    services::match_service,
    state::{
        SharedState,
        session::{MatchKind, MatchStatus},
    },
};

#[utoipa::path(
    get,
    path = "/matches",
    tag = "matches",
    responses((status = 200, description = "Joinable open matches", body = [MatchSummary]))
)]
/// List sessions that are still waiting for players and have a free seat.
pub async fn list_matches(State(state): State<SharedState>) -> Json<Vec<MatchSummary>> {
    let mut summaries = Vec::new();
    for id in state.registry().session_ids() {
        let Some(handle) = state.registry().get(id) else {
            continue;
        };
        let session = handle.lock().await;
        if session.status == MatchStatus::Waiting && session.players.len() < session.max_players {
            summaries.push(MatchSummary::from(&*session));
        }
    }
    Json(summaries)
}

#[utoipa::path(
    get,
    path = "/matches/{id}",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Match summary", body = MatchSummary),
        (status = 404, description = "Unknown match")
    )
)]
/// Look up one match by id, falling back to a store snapshot when the local
/// registry misses.
pub async fn get_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchSummary>, AppError> {
    if let Some(handle) = state.registry().get(id) {
        let session = handle.lock().await;
        return Ok(Json(MatchSummary::from(&*session)));
    }

    let raw = state
        .store()
        .get(&session_key(id))
        .await
        .ok_or_else(|| AppError::NotFound(format!("match `{id}` not found")))?;
    let snapshot = SessionSnapshot::decode(&raw)
        .map_err(|err| AppError::Internal(format!("corrupt snapshot for match `{id}`: {err}")))?;
    Ok(Json(MatchSummary::from(&snapshot)))
}

#[utoipa::path(
    get,
    path = "/matches/code/{code}",
    tag = "matches",
    params(("code" = String, Path, description = "Case-insensitive join code")),
    responses(
        (status = 200, description = "Match summary", body = MatchSummary),
        (status = 404, description = "Unknown join code")
    )
)]
/// Resolve a join code to its match summary.
pub async fn get_match_by_code(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<MatchSummary>, AppError> {
    if let Some(handle) = state.registry().get_by_join_code(&code) {
        let session = handle.lock().await;
        return Ok(Json(MatchSummary::from(&*session)));
    }

    let raw = state
        .store()
        .get(&join_code_key(&code))
        .await
        .ok_or_else(|| AppError::NotFound(format!("join code `{code}` not found")))?;
    let id: Uuid = raw
        .trim()
        .trim_matches('"')
        .parse()
        .map_err(|_| AppError::Internal(format!("corrupt entry for join code `{code}`")))?;
    get_match(State(state), Path(id)).await
}

#[utoipa::path(
    post,
    path = "/matches/friend",
    tag = "matches",
    request_body = CreateFriendMatchRequest,
    responses(
        (status = 200, description = "Friend match created", body = CreateFriendMatchResponse),
        (status = 404, description = "Unknown user or quiz"),
        (status = 409, description = "User already in a match")
    )
)]
/// Create a private 1v1 match over plain HTTP; the creator attaches over the
/// WebSocket afterwards with `connect_to_match`.
pub async fn create_friend_match(
    State(state): State<SharedState>,
    Json(payload): Json<CreateFriendMatchRequest>,
) -> Result<Json<CreateFriendMatchResponse>, AppError> {
    payload.validate()?;

    let user = state
        .content()
        .find_user(payload.user_id)
        .await
        .map_err(|err| AppError::ServiceUnavailable(err.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("user `{}` not found", payload.user_id)))?;
    let identity = Identity::from(user);

    let (handle, join_code) = match_service::create_match(
        &state,
        &identity,
        MatchKind::Friend1v1,
        payload.quiz_id,
        None,
        None,
    )
    .await?;
    let join_code = join_code
        .ok_or_else(|| AppError::Internal("friend match created without a join code".into()))?;

    Ok(Json(CreateFriendMatchResponse {
        match_id: handle.id,
        join_code,
    }))
}

#[utoipa::path(
    get,
    path = "/opponents",
    tag = "matches",
    responses((status = 200, description = "AI opponent catalog", body = [OpponentView]))
)]
/// List the configured AI opponents available for solo matches.
pub async fn list_opponents(State(state): State<SharedState>) -> Json<Vec<OpponentView>> {
    Json(
        state
            .config()
            .opponents()
            .iter()
            .map(Into::into)
            .collect(),
    )
}

/// Configure the match routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/matches", get(list_matches))
        .route("/matches/friend", post(create_friend_match))
        .route("/matches/code/{code}", get(get_match_by_code))
        .route("/matches/{id}", get(get_match))
        .route("/opponents", get(list_opponents))
}
