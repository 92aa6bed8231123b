use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::AiOpponent,
    dao::session_store::SessionSnapshot,
    dto::ws::PlayerView,
    state::session::{Difficulty, MatchKind, MatchStatus, Session, UserId},
};

/// Public summary of a session, for listings and join-code resolution.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    /// Session id.
    pub match_id: Uuid,
    /// Quiz the session plays.
    pub quiz_id: i64,
    /// Match kind.
    pub kind: MatchKind,
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Join code, when the session is joinable by code.
    pub join_code: Option<String>,
    /// Capacity.
    pub max_players: usize,
    /// Current roster.
    pub players: Vec<PlayerView>,
    /// Creation timestamp (RFC3339).
    pub created_at: String,
}

impl From<&Session> for MatchSummary {
    fn from(value: &Session) -> Self {
        Self {
            match_id: value.id,
            quiz_id: value.quiz_id,
            kind: value.kind,
            status: value.status,
            join_code: value.join_code.clone(),
            max_players: value.max_players,
            players: value.players.values().map(Into::into).collect(),
            created_at: super::format_timestamp(value.created_at),
        }
    }
}

impl From<&SessionSnapshot> for MatchSummary {
    fn from(value: &SessionSnapshot) -> Self {
        Self {
            match_id: value.id,
            quiz_id: value.quiz_id,
            kind: serde_json::from_value(serde_json::Value::String(value.kind.clone()))
                .unwrap_or(MatchKind::Multiplayer),
            status: serde_json::from_value(serde_json::Value::String(value.status.clone()))
                .unwrap_or(MatchStatus::Waiting),
            join_code: value.join_code.clone(),
            max_players: value.max_players,
            players: value
                .players
                .iter()
                .map(|player| PlayerView {
                    user_id: player.user_id,
                    username: player.display_name.clone(),
                    is_ready: player.is_ready,
                    is_ai: player.is_ai,
                })
                .collect(),
            created_at: value.created_at.clone(),
        }
    }
}

/// Body of `POST /matches/friend`: create a friend session without an open
/// realtime connection. The creator connects afterwards via
/// `connect_to_match`.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateFriendMatchRequest {
    /// Quiz to play.
    #[validate(range(min = 1))]
    pub quiz_id: i64,
    /// Creator's user id.
    pub user_id: UserId,
}

/// Response of `POST /matches/friend`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateFriendMatchResponse {
    /// Session id to reconnect to.
    pub match_id: Uuid,
    /// Shareable code.
    pub join_code: String,
}

/// Catalog entry of an AI opponent, for client display.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpponentView {
    /// Catalog id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Tier the opponent is pitched at.
    pub tier: Difficulty,
    /// Probability (percent) of answering correctly.
    pub accuracy_percent: u8,
    /// Avatar asset name.
    pub avatar: String,
}

impl From<&AiOpponent> for OpponentView {
    fn from(value: &AiOpponent) -> Self {
        Self {
            id: value.id,
            name: value.name.clone(),
            tier: value.tier,
            accuracy_percent: value.accuracy_percent,
            avatar: value.avatar.clone(),
        }
    }
}
