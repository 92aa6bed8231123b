//! WebSocket message surface: commands accepted from clients and the events
//! broadcast back, plus the sanitized projections they carry.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::content::UserInfo,
    state::session::{Player, PlayerResult, Question, UserId},
};

/// Credential carried by an `authenticate` command: either a signed token or
/// a direct identity payload (a deliberately permissive mode for trusted
/// non-browser clients).
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum AuthPayload {
    /// Signed token to be resolved by the identity backend.
    Token(String),
    /// Self-declared identity.
    Direct(DirectIdentity),
}

/// Self-declared identity accepted in trusted-client mode.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct DirectIdentity {
    /// User identifier.
    #[serde(rename = "userId")]
    pub user_id: UserId,
    /// Handle shown to other players.
    #[validate(length(min = 1, max = 64))]
    pub username: String,
    /// Optional given name.
    #[serde(rename = "firstName")]
    pub first_name: Option<String>,
    /// Optional family name.
    #[serde(rename = "lastName")]
    pub last_name: Option<String>,
}

/// Canonical identity a connection resolves to, regardless of which
/// [`AuthPayload`] shape produced it.
#[derive(Debug, Clone)]
pub struct Identity {
    /// User identifier.
    pub user_id: UserId,
    /// Handle.
    pub username: String,
    /// Human-facing name.
    pub display_name: String,
}

impl From<UserInfo> for Identity {
    fn from(value: UserInfo) -> Self {
        let display_name = value.display_name();
        Self {
            user_id: value.id,
            username: value.username,
            display_name,
        }
    }
}

impl From<DirectIdentity> for Identity {
    fn from(value: DirectIdentity) -> Self {
        let display_name = match (value.first_name.as_deref(), value.last_name.as_deref()) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.to_string(),
            _ => value.username.clone(),
        };
        Self {
            user_id: value.user_id,
            username: value.username,
            display_name,
        }
    }
}

/// Commands accepted from match WebSocket clients.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Resolve the caller's identity; required before any other command.
    Authenticate {
        /// Token or direct identity.
        payload: AuthPayload,
    },
    /// Create an open multiplayer match.
    CreateMatch {
        /// Quiz to play.
        quiz_id: i64,
    },
    /// Create a solo match against an AI opponent.
    CreateSoloMatch {
        /// Quiz to play.
        quiz_id: i64,
        /// Catalog id of the opponent; the default roster entry when absent.
        opponent_id: Option<i64>,
    },
    /// Create a private 1v1 match joinable by code.
    CreateFriendMatch {
        /// Quiz to play.
        quiz_id: i64,
    },
    /// Join a match by its shareable code.
    JoinMatch {
        /// Case-insensitive join code.
        join_code: String,
    },
    /// Reconnect to a match by id, e.g. after a page reload.
    ConnectToMatch {
        /// Session id.
        match_id: Uuid,
    },
    /// Mark the caller ready (or not). Absence of the flag means ready.
    PlayerReady {
        /// Explicit readiness; defaults to true.
        ready: Option<bool>,
    },
    /// Submit an answer for the active question.
    SubmitAnswer {
        /// Question being answered.
        question_id: i64,
        /// Selected option ids.
        selected_options: Vec<i64>,
        /// Seconds spent on the question.
        time_spent: f64,
    },
    /// Anything unrecognized; answered with an error event.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse a raw text frame.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Events pushed to match WebSocket clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Identity resolved.
    Authenticated {
        /// The resolved user.
        user: UserView,
    },
    /// Identity resolution failed; no session action was taken.
    AuthError {
        /// Failure description.
        message: String,
    },
    /// Open or solo match created.
    MatchCreated {
        /// Session id.
        match_id: Uuid,
        /// Join code for joinable kinds.
        join_code: Option<String>,
    },
    /// Friend match created.
    FriendMatchCreated {
        /// Session id.
        match_id: Uuid,
        /// Shareable code.
        join_code: String,
    },
    /// The caller joined a match by code.
    MatchJoined {
        /// Session id.
        match_id: Uuid,
        /// Current roster.
        players: Vec<PlayerView>,
    },
    /// The caller reconnected to a match by id.
    MatchConnected {
        /// Session id.
        match_id: Uuid,
        /// Current roster.
        players: Vec<PlayerView>,
    },
    /// Roster changed.
    PlayerListUpdated {
        /// Current roster.
        players: Vec<PlayerView>,
    },
    /// A player's readiness changed.
    PlayerReady {
        /// User identifier.
        user_id: UserId,
        /// Handle.
        username: String,
        /// New readiness.
        is_ready: bool,
    },
    /// First round dealt.
    MatchStarted {
        /// Sanitized question.
        question: QuestionView,
        /// Zero-based index of the question.
        question_index: usize,
        /// Question count.
        total_questions: usize,
    },
    /// Round advanced.
    NextQuestion {
        /// Sanitized question.
        question: QuestionView,
        /// Zero-based index of the question.
        question_index: usize,
        /// Question count.
        total_questions: usize,
    },
    /// Private scoring outcome, sent to the submitter only.
    AnswerResult {
        /// Whether the submission was correct.
        is_correct: bool,
        /// Points granted.
        points: u32,
        /// Correct option ids.
        correct_options: Vec<i64>,
        /// Submitter's total.
        total_score: u32,
    },
    /// Final scoreboard, broadcast exactly once.
    MatchCompleted {
        /// Session id.
        match_id: Uuid,
        /// Rows sorted descending by score; ties keep join order.
        results: Vec<PlayerResultView>,
        /// Top row, when any player is registered.
        winner: Option<PlayerResultView>,
        /// Completion timestamp (RFC3339).
        completed_at: String,
    },
    /// A player's connection dropped; they stay registered.
    PlayerDisconnected {
        /// User identifier.
        user_id: UserId,
        /// Handle.
        username: String,
    },
    /// Command-level failure scoped to the offending connection.
    Error {
        /// Failure description.
        message: String,
    },
}

/// Client-facing user record.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    /// User identifier.
    pub id: UserId,
    /// Handle.
    pub username: String,
    /// Human-facing name.
    pub display_name: String,
}

impl From<&Identity> for UserView {
    fn from(value: &Identity) -> Self {
        Self {
            id: value.user_id,
            username: value.username.clone(),
            display_name: value.display_name.clone(),
        }
    }
}

/// Roster entry sent with join/ready events.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    /// User identifier.
    pub user_id: UserId,
    /// Handle.
    pub username: String,
    /// Readiness.
    pub is_ready: bool,
    /// Whether the seat is a scripted opponent.
    pub is_ai: bool,
}

impl From<&Player> for PlayerView {
    fn from(value: &Player) -> Self {
        Self {
            user_id: value.user_id,
            username: value.display_name.clone(),
            is_ready: value.is_ready,
            is_ai: value.is_ai,
        }
    }
}

/// Sanitized question projection: correctness flags never leave the server
/// before the answer is locked in.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    /// Question id.
    pub id: i64,
    /// Question text.
    pub text: String,
    /// Authoring difficulty.
    pub difficulty: crate::state::session::Difficulty,
    /// Base points for a correct answer.
    pub point_value: u32,
    /// Options without correctness flags.
    pub options: Vec<OptionView>,
}

/// Sanitized option projection.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OptionView {
    /// Option id.
    pub id: i64,
    /// Option text.
    pub text: String,
}

impl From<&Question> for QuestionView {
    fn from(value: &Question) -> Self {
        Self {
            id: value.id,
            text: value.text.clone(),
            difficulty: value.difficulty,
            point_value: value.point_value,
            options: value
                .options
                .iter()
                .map(|option| OptionView {
                    id: option.id,
                    text: option.text.clone(),
                })
                .collect(),
        }
    }
}

/// Scoreboard row.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResultView {
    /// User identifier.
    pub user_id: UserId,
    /// Handle.
    pub username: String,
    /// Final score.
    pub score: u32,
    /// Correct answer count.
    pub correct_answers: usize,
    /// Submitted answer count.
    pub total_answers: usize,
    /// Rounded accuracy percentage.
    pub accuracy: u32,
}

impl From<&PlayerResult> for PlayerResultView {
    fn from(value: &PlayerResult) -> Self {
        Self {
            user_id: value.user_id,
            username: value.display_name.clone(),
            score: value.score,
            correct_answers: value.correct_answers,
            total_answers: value.total_answers,
            accuracy: value.accuracy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_payload_accepts_both_shapes() {
        let token: AuthPayload = serde_json::from_str("\"abc.def.ghi\"").unwrap();
        assert!(matches!(token, AuthPayload::Token(_)));

        let direct: AuthPayload =
            serde_json::from_str(r#"{"userId": 7, "username": "alice"}"#).unwrap();
        match direct {
            AuthPayload::Direct(identity) => {
                assert_eq!(identity.user_id, 7);
                assert_eq!(identity.username, "alice");
            }
            other => panic!("expected direct identity, got {other:?}"),
        }
    }

    #[test]
    fn client_messages_parse_from_wire_shape() {
        let message =
            ClientMessage::from_json_str(r#"{"type": "join_match", "joinCode": "ab12cd"}"#)
                .unwrap();
        match message {
            ClientMessage::JoinMatch { join_code } => assert_eq!(join_code, "ab12cd"),
            other => panic!("unexpected message: {other:?}"),
        }

        let message = ClientMessage::from_json_str(
            r#"{"type": "submit_answer", "questionId": 10, "selectedOptions": [2, 1], "timeSpent": 3.5}"#,
        )
        .unwrap();
        match message {
            ClientMessage::SubmitAnswer {
                question_id,
                selected_options,
                time_spent,
            } => {
                assert_eq!(question_id, 10);
                assert_eq!(selected_options, vec![2, 1]);
                assert!((time_spent - 3.5).abs() < f64::EPSILON);
            }
            other => panic!("unexpected message: {other:?}"),
        }

        let message = ClientMessage::from_json_str(r#"{"type": "wave_hello"}"#).unwrap();
        assert!(matches!(message, ClientMessage::Unknown));
    }

    #[test]
    fn server_messages_serialize_with_type_tag() {
        let raw = serde_json::to_value(ServerMessage::PlayerReady {
            user_id: 7,
            username: "alice".into(),
            is_ready: true,
        })
        .unwrap();
        assert_eq!(raw["type"], "player_ready");
        assert_eq!(raw["userId"], 7);
        assert_eq!(raw["isReady"], true);
    }
}
