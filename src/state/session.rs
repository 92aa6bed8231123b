//! Session data model and the per-session state machine: ready gating,
//! answer scoring, round advancement, and results computation.
//!
//! Everything here is pure in-memory computation; content loading and
//! persistence happen before a session handle is locked.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::{
        content::{QuestionEntity, QuestionOptionEntity},
        session_store::{SessionSnapshot, SnapshotPlayer},
    },
    error::MatchError,
};

/// External user identifier. AI opponents use negated catalog ids so they can
/// never collide with real accounts.
pub type UserId = i64;

/// Lifecycle status of a session. Transitions only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum MatchStatus {
    /// Players are joining and readying up.
    #[serde(rename = "WAITING")]
    Waiting,
    /// Rounds are running.
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    /// Results have been computed; the session is awaiting teardown.
    #[serde(rename = "COMPLETED")]
    Completed,
}

/// What kind of match a session hosts, which drives the start policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum MatchKind {
    /// One human against a scripted AI opponent.
    #[serde(rename = "SOLO")]
    Solo,
    /// Open room, starts once at least two present players are ready.
    #[serde(rename = "MULTIPLAYER")]
    Multiplayer,
    /// Private 1v1 joined by code.
    #[serde(rename = "FRIEND_1V1")]
    Friend1v1,
}

impl MatchStatus {
    /// Wire string used in snapshots and summaries.
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Waiting => "WAITING",
            MatchStatus::InProgress => "IN_PROGRESS",
            MatchStatus::Completed => "COMPLETED",
        }
    }
}

impl MatchKind {
    /// Wire string used in snapshots and summaries.
    pub fn as_str(self) -> &'static str {
        match self {
            MatchKind::Solo => "SOLO",
            MatchKind::Multiplayer => "MULTIPLAYER",
            MatchKind::Friend1v1 => "FRIEND_1V1",
        }
    }

    /// Inverse of [`MatchKind::as_str`], for snapshot rehydration.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "SOLO" => Some(MatchKind::Solo),
            "MULTIPLAYER" => Some(MatchKind::Multiplayer),
            "FRIEND_1V1" => Some(MatchKind::Friend1v1),
            _ => None,
        }
    }
}

/// Authoring difficulty of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Easy question.
    Easy,
    /// Medium question.
    Medium,
    /// Hard question.
    Hard,
}

impl Difficulty {
    /// Scale factor applied to AI response delays: harder questions make the
    /// scripted opponent "think" longer.
    pub fn ai_delay_scale(self) -> f64 {
        match self {
            Difficulty::Easy => 0.8,
            Difficulty::Medium => 1.0,
            Difficulty::Hard => 1.2,
        }
    }

    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("easy") => Difficulty::Easy,
            Some("hard") => Difficulty::Hard,
            _ => Difficulty::Medium,
        }
    }
}

/// Default base points for a correct answer.
pub const DEFAULT_POINT_VALUE: u32 = 100;

/// A question snapshotted at session creation, correctness retained
/// server-side only.
#[derive(Debug, Clone)]
pub struct Question {
    /// Question id as authored.
    pub id: i64,
    /// Question text.
    pub text: String,
    /// Authoring difficulty.
    pub difficulty: Difficulty,
    /// Options in authored order.
    pub options: Vec<QuestionOption>,
    /// Base points for a correct answer.
    pub point_value: u32,
}

/// One answer option of a snapshotted question.
#[derive(Debug, Clone)]
pub struct QuestionOption {
    /// Option id as authored.
    pub id: i64,
    /// Option text.
    pub text: String,
    /// Whether the option belongs to the correct answer set.
    pub is_correct: bool,
}

impl Question {
    /// Ids of the options making up the correct answer set.
    pub fn correct_option_ids(&self) -> BTreeSet<i64> {
        self.options
            .iter()
            .filter(|option| option.is_correct)
            .map(|option| option.id)
            .collect()
    }
}

impl From<QuestionEntity> for Question {
    fn from(value: QuestionEntity) -> Self {
        Self {
            id: value.id,
            text: value.text,
            difficulty: Difficulty::parse(value.difficulty.as_deref()),
            options: value.options.into_iter().map(Into::into).collect(),
            point_value: value.point_value.unwrap_or(DEFAULT_POINT_VALUE),
        }
    }
}

impl From<QuestionOptionEntity> for QuestionOption {
    fn from(value: QuestionOptionEntity) -> Self {
        Self {
            id: value.id,
            text: value.text,
            is_correct: value.is_correct,
        }
    }
}

/// One scored submission, created at most once per (player, question).
#[derive(Debug, Clone)]
pub struct AnswerRecord {
    /// Question the answer belongs to.
    pub question_id: i64,
    /// Selected option ids, order-insensitive.
    pub selected_option_ids: BTreeSet<i64>,
    /// Whether the selection matched the correct set exactly.
    pub is_correct: bool,
    /// Seconds the player reported spending on the question.
    pub time_spent_seconds: f64,
    /// Points granted for this answer.
    pub points_awarded: u32,
}

/// A participant's live state within a session.
#[derive(Debug, Clone)]
pub struct Player {
    /// User identifier (negative for AI opponents).
    pub user_id: UserId,
    /// Name shown to other players.
    pub display_name: String,
    /// Connection currently bound to this player, if any. A registered player
    /// may be momentarily disconnected.
    pub connection: Option<Uuid>,
    /// Accumulated score, monotonically non-decreasing.
    pub score: u32,
    /// Ready flag gating the start transition.
    pub is_ready: bool,
    /// Whether the player is driven by the scripted AI responder.
    pub is_ai: bool,
    /// Scored answers in submission order.
    pub answers: Vec<AnswerRecord>,
}

impl Player {
    fn new(user_id: UserId, display_name: String, connection: Option<Uuid>, is_ai: bool) -> Self {
        Self {
            user_id,
            display_name,
            connection,
            score: 0,
            is_ready: is_ai,
            is_ai,
            answers: Vec::new(),
        }
    }

    /// Whether this player already answered the given question.
    pub fn has_answered(&self, question_id: i64) -> bool {
        self.answers
            .iter()
            .any(|record| record.question_id == question_id)
    }
}

/// Private outcome of a scored submission, sent to the submitter only.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    /// Whether the submission was correct.
    pub is_correct: bool,
    /// Points granted.
    pub points_awarded: u32,
    /// Correct option ids, revealed after the answer is locked in.
    pub correct_option_ids: Vec<i64>,
    /// Player total after this answer.
    pub total_score: u32,
}

/// Result of advancing past the current question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Moved to the question at this index.
    NextQuestion(usize),
    /// No questions left; the session is now completed.
    Completed,
}

/// One row of the final scoreboard.
#[derive(Debug, Clone)]
pub struct PlayerResult {
    /// User identifier.
    pub user_id: UserId,
    /// Display name.
    pub display_name: String,
    /// Final score.
    pub score: u32,
    /// Number of correct answers.
    pub correct_answers: usize,
    /// Number of submitted answers.
    pub total_answers: usize,
    /// Rounded percentage of correct answers (0 when none submitted).
    pub accuracy: u32,
}

/// The unit of a live game: immutable question snapshot plus mutable player
/// and round state. All mutation goes through the owning session handle, one
/// writer at a time.
#[derive(Debug)]
pub struct Session {
    /// Opaque unique session id.
    pub id: Uuid,
    /// Short shareable code, set while the session is joinable by code.
    pub join_code: Option<String>,
    /// Quiz the session plays.
    pub quiz_id: i64,
    /// Match kind.
    pub kind: MatchKind,
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Capacity.
    pub max_players: usize,
    /// Per-question time limit in seconds.
    pub time_limit_seconds: u32,
    /// Index of the active question; `None` before the first round.
    pub current_question_index: Option<usize>,
    /// Epoch milliseconds at which the active question was dealt.
    pub question_started_at_ms: Option<u64>,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
    /// Immutable ordered question snapshot.
    pub questions: Vec<Question>,
    /// Players in join order; iteration order is the results tie-break.
    pub players: IndexMap<UserId, Player>,
}

impl Session {
    /// Build a new session in the waiting state.
    pub fn new(
        kind: MatchKind,
        quiz_id: i64,
        max_players: usize,
        time_limit_seconds: u32,
        questions: Vec<Question>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            join_code: None,
            quiz_id,
            kind,
            status: MatchStatus::Waiting,
            max_players,
            time_limit_seconds,
            current_question_index: None,
            question_started_at_ms: None,
            created_at: OffsetDateTime::now_utc(),
            questions,
            players: IndexMap::new(),
        }
    }

    /// Register a new player. Fails once the session has left the waiting
    /// state or is at capacity.
    pub fn add_player(
        &mut self,
        user_id: UserId,
        display_name: String,
        connection: Option<Uuid>,
        is_ai: bool,
    ) -> Result<&Player, MatchError> {
        if self.status != MatchStatus::Waiting {
            return Err(MatchError::InvalidState(
                "players can only join while the match is waiting".into(),
            ));
        }
        if self.players.contains_key(&user_id) {
            return Err(MatchError::AlreadyInSession);
        }
        if self.players.len() >= self.max_players {
            return Err(MatchError::SessionFull);
        }

        self.players
            .insert(user_id, Player::new(user_id, display_name, connection, is_ai));
        Ok(&self.players[&user_id])
    }

    /// Bind (or rebind) a connection to an already-registered player, e.g.
    /// after a page reload.
    pub fn rebind_connection(
        &mut self,
        user_id: UserId,
        connection: Uuid,
    ) -> Result<&Player, MatchError> {
        let player = self
            .players
            .get_mut(&user_id)
            .ok_or_else(|| MatchError::InvalidState("player is not part of this match".into()))?;
        player.connection = Some(connection);
        Ok(player)
    }

    /// Clear the connection of whichever player held it, returning that
    /// player. The player stays registered for reconnection.
    pub fn drop_connection(&mut self, connection: Uuid) -> Option<&Player> {
        let user_id = self
            .players
            .values()
            .find(|player| player.connection == Some(connection))
            .map(|player| player.user_id)?;
        let player = self.players.get_mut(&user_id)?;
        player.connection = None;
        Some(player)
    }

    /// Flip a player's ready flag.
    pub fn set_ready(&mut self, user_id: UserId, ready: bool) -> Result<&Player, MatchError> {
        if self.status != MatchStatus::Waiting {
            return Err(MatchError::InvalidState(
                "readiness can only change while the match is waiting".into(),
            ));
        }
        let player = self
            .players
            .get_mut(&user_id)
            .ok_or_else(|| MatchError::InvalidState("player is not part of this match".into()))?;
        player.is_ready = ready;
        Ok(player)
    }

    /// Whether the start condition holds: every registered player is ready and
    /// the kind-specific capacity policy is met. SOLO and FRIEND_1V1 wait for
    /// the exact capacity; open multiplayer starts at two or more.
    pub fn ready_to_start(&self) -> bool {
        if self.status != MatchStatus::Waiting {
            return false;
        }
        if !self.players.values().all(|player| player.is_ready) {
            return false;
        }
        match self.kind {
            MatchKind::Solo | MatchKind::Friend1v1 => self.players.len() == self.max_players,
            MatchKind::Multiplayer => self.players.len() >= 2,
        }
    }

    /// Transition WAITING → IN_PROGRESS and deal the first question.
    pub fn start(&mut self, now_ms: u64) -> Result<&Question, MatchError> {
        if self.status != MatchStatus::Waiting {
            return Err(MatchError::InvalidState(
                "match has already started".into(),
            ));
        }
        if self.questions.is_empty() {
            return Err(MatchError::NoQuestions);
        }

        self.status = MatchStatus::InProgress;
        self.current_question_index = Some(0);
        self.question_started_at_ms = Some(now_ms);
        Ok(&self.questions[0])
    }

    /// The question currently being played, if any.
    pub fn current_question(&self) -> Option<&Question> {
        self.current_question_index
            .and_then(|index| self.questions.get(index))
    }

    /// Score a submission against the active question.
    ///
    /// Rejected without side effect when the session is not running, the
    /// player is unknown, the question is no longer the active one, or the
    /// player already answered this round.
    pub fn submit_answer(
        &mut self,
        user_id: UserId,
        question_id: i64,
        selected_option_ids: BTreeSet<i64>,
        time_spent_seconds: f64,
    ) -> Result<AnswerOutcome, MatchError> {
        if self.status != MatchStatus::InProgress {
            return Err(MatchError::InvalidState(
                "answers are only accepted while the match is in progress".into(),
            ));
        }

        let time_limit = self.time_limit_seconds;
        // Client-reported timing is untrusted; clamp it into the round window
        // before it can reach the score arithmetic.
        let time_spent_seconds = if time_spent_seconds.is_finite() {
            time_spent_seconds.clamp(0.0, f64::from(time_limit))
        } else {
            f64::from(time_limit)
        };
        let question = self
            .current_question()
            .filter(|question| question.id == question_id)
            .ok_or_else(|| {
                MatchError::InvalidState("question is no longer the active one".into())
            })?;

        let correct_ids = question.correct_option_ids();
        let is_correct = selected_option_ids == correct_ids;
        let points_awarded = if is_correct {
            question.point_value + time_bonus(time_limit, time_spent_seconds)
        } else {
            0
        };

        let player = self
            .players
            .get_mut(&user_id)
            .ok_or_else(|| MatchError::InvalidState("player is not part of this match".into()))?;
        if player.has_answered(question_id) {
            return Err(MatchError::DuplicateAnswer);
        }

        player.score += points_awarded;
        player.answers.push(AnswerRecord {
            question_id,
            selected_option_ids,
            is_correct,
            time_spent_seconds,
            points_awarded,
        });

        Ok(AnswerOutcome {
            is_correct,
            points_awarded,
            correct_option_ids: correct_ids.into_iter().collect(),
            total_score: player.score,
        })
    }

    /// Whether every registered player has answered the active question.
    pub fn all_answered(&self) -> bool {
        match self.current_question() {
            Some(question) => self
                .players
                .values()
                .all(|player| player.has_answered(question.id)),
            None => false,
        }
    }

    /// Move to the next question, or complete the session when none are left.
    /// Callers must re-validate the round index before invoking this from a
    /// timer so a superseded timer cannot advance twice.
    pub fn advance(&mut self, now_ms: u64) -> Result<Advance, MatchError> {
        let index = match (self.status, self.current_question_index) {
            (MatchStatus::InProgress, Some(index)) => index,
            _ => {
                return Err(MatchError::InvalidState(
                    "no round is currently in progress".into(),
                ));
            }
        };

        if index + 1 < self.questions.len() {
            self.current_question_index = Some(index + 1);
            self.question_started_at_ms = Some(now_ms);
            Ok(Advance::NextQuestion(index + 1))
        } else {
            self.status = MatchStatus::Completed;
            self.question_started_at_ms = None;
            Ok(Advance::Completed)
        }
    }

    /// Final scoreboard, sorted descending by score. The sort is stable over
    /// join order, which is the tie-break.
    pub fn results(&self) -> Vec<PlayerResult> {
        let mut results: Vec<PlayerResult> = self
            .players
            .values()
            .map(|player| {
                let correct_answers = player
                    .answers
                    .iter()
                    .filter(|record| record.is_correct)
                    .count();
                let total_answers = player.answers.len();
                let accuracy = if total_answers == 0 {
                    0
                } else {
                    ((100.0 * correct_answers as f64) / total_answers as f64).round() as u32
                };
                PlayerResult {
                    user_id: player.user_id,
                    display_name: player.display_name.clone(),
                    score: player.score,
                    correct_answers,
                    total_answers,
                    accuracy,
                }
            })
            .collect();

        results.sort_by(|a, b| b.score.cmp(&a.score));
        results
    }
}

impl From<&Session> for SessionSnapshot {
    fn from(value: &Session) -> Self {
        Self {
            id: value.id,
            quiz_id: value.quiz_id,
            join_code: value.join_code.clone(),
            status: value.status.as_str().to_string(),
            kind: value.kind.as_str().to_string(),
            max_players: value.max_players,
            created_at: value
                .created_at
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "invalid-timestamp".into()),
            players: value
                .players
                .values()
                .map(|player| SnapshotPlayer {
                    user_id: player.user_id,
                    display_name: player.display_name.clone(),
                    is_ready: player.is_ready,
                    is_ai: player.is_ai,
                })
                .collect(),
        }
    }
}

/// Time bonus for a correct answer: two points per second left on the clock.
fn time_bonus(time_limit_seconds: u32, time_spent_seconds: f64) -> u32 {
    let remaining = f64::from(time_limit_seconds) - time_spent_seconds;
    (remaining * 2.0).floor().max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: i64, correct: &[i64], wrong: &[i64]) -> Question {
        let mut options = Vec::new();
        for &option_id in correct {
            options.push(QuestionOption {
                id: option_id,
                text: format!("option {option_id}"),
                is_correct: true,
            });
        }
        for &option_id in wrong {
            options.push(QuestionOption {
                id: option_id,
                text: format!("option {option_id}"),
                is_correct: false,
            });
        }
        Question {
            id,
            text: format!("question {id}"),
            difficulty: Difficulty::Medium,
            options,
            point_value: DEFAULT_POINT_VALUE,
        }
    }

    fn two_player_session(questions: Vec<Question>) -> Session {
        let mut session = Session::new(MatchKind::Friend1v1, 1, 2, 30, questions);
        session.add_player(1, "alice".into(), None, false).unwrap();
        session.add_player(2, "bob".into(), None, false).unwrap();
        session.set_ready(1, true).unwrap();
        session.set_ready(2, true).unwrap();
        session
    }

    #[test]
    fn capacity_is_enforced() {
        let mut session = Session::new(MatchKind::Friend1v1, 1, 2, 30, vec![question(10, &[2], &[1])]);
        session.add_player(1, "alice".into(), None, false).unwrap();
        session.add_player(2, "bob".into(), None, false).unwrap();
        let err = session.add_player(3, "carol".into(), None, false).unwrap_err();
        assert!(matches!(err, MatchError::SessionFull));
        assert_eq!(session.players.len(), 2);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut session = Session::new(MatchKind::Multiplayer, 1, 4, 30, vec![question(10, &[2], &[1])]);
        session.add_player(1, "alice".into(), None, false).unwrap();
        let err = session.add_player(1, "alice".into(), None, false).unwrap_err();
        assert!(matches!(err, MatchError::AlreadyInSession));
    }

    #[test]
    fn start_requires_questions() {
        let mut session = Session::new(MatchKind::Friend1v1, 1, 2, 30, Vec::new());
        session.add_player(1, "alice".into(), None, false).unwrap();
        session.add_player(2, "bob".into(), None, false).unwrap();
        let err = session.start(0).unwrap_err();
        assert!(matches!(err, MatchError::NoQuestions));
        assert_eq!(session.status, MatchStatus::Waiting);
    }

    #[test]
    fn ready_policy_per_kind() {
        let mut friend = Session::new(MatchKind::Friend1v1, 1, 2, 30, vec![question(10, &[2], &[1])]);
        friend.add_player(1, "alice".into(), None, false).unwrap();
        friend.set_ready(1, true).unwrap();
        assert!(!friend.ready_to_start(), "1v1 waits for full capacity");

        let mut open = Session::new(MatchKind::Multiplayer, 1, 8, 30, vec![question(10, &[2], &[1])]);
        open.add_player(1, "alice".into(), None, false).unwrap();
        open.add_player(2, "bob".into(), None, false).unwrap();
        open.set_ready(1, true).unwrap();
        open.set_ready(2, true).unwrap();
        assert!(open.ready_to_start(), "open room starts at two ready players");
    }

    #[test]
    fn scoring_is_deterministic() {
        let mut session = two_player_session(vec![question(10, &[2], &[1, 3])]);
        session.start(1_000).unwrap();

        let outcome = session
            .submit_answer(1, 10, BTreeSet::from([2]), 10.0)
            .unwrap();
        assert!(outcome.is_correct);
        assert_eq!(outcome.points_awarded, 140, "100 + floor((30 - 10) * 2)");
        assert_eq!(outcome.total_score, 140);

        let outcome = session
            .submit_answer(2, 10, BTreeSet::from([1]), 5.0)
            .unwrap();
        assert!(!outcome.is_correct);
        assert_eq!(outcome.points_awarded, 0);
        assert_eq!(outcome.correct_option_ids, vec![2]);
    }

    #[test]
    fn partial_selection_earns_nothing() {
        let mut session = two_player_session(vec![question(10, &[2, 3], &[1])]);
        session.start(0).unwrap();
        let outcome = session
            .submit_answer(1, 10, BTreeSet::from([2]), 1.0)
            .unwrap();
        assert!(!outcome.is_correct, "exact set equality, no partial credit");
    }

    #[test]
    fn overtime_answer_keeps_base_points_only() {
        let mut session = two_player_session(vec![question(10, &[2], &[1])]);
        session.start(0).unwrap();
        let outcome = session
            .submit_answer(1, 10, BTreeSet::from([2]), 45.0)
            .unwrap();
        assert_eq!(outcome.points_awarded, DEFAULT_POINT_VALUE);
    }

    #[test]
    fn negative_time_spent_cannot_inflate_the_score() {
        let mut session = two_player_session(vec![question(10, &[2], &[1])]);
        session.start(0).unwrap();
        let outcome = session
            .submit_answer(1, 10, BTreeSet::from([2]), -3.0e9)
            .unwrap();
        assert_eq!(
            outcome.points_awarded,
            DEFAULT_POINT_VALUE + 60,
            "clamped to zero spent: 100 + floor(30 * 2)"
        );
        assert_eq!(session.players[&1].score, outcome.points_awarded);
    }

    #[test]
    fn non_finite_time_spent_earns_base_points_only() {
        let mut session = two_player_session(vec![question(10, &[2], &[1])]);
        session.start(0).unwrap();
        let outcome = session
            .submit_answer(1, 10, BTreeSet::from([2]), f64::NAN)
            .unwrap();
        assert_eq!(outcome.points_awarded, DEFAULT_POINT_VALUE);

        let outcome = session
            .submit_answer(2, 10, BTreeSet::from([2]), f64::NEG_INFINITY)
            .unwrap();
        assert_eq!(outcome.points_awarded, DEFAULT_POINT_VALUE);
    }

    #[test]
    fn duplicate_answer_is_rejected() {
        let mut session = two_player_session(vec![question(10, &[2], &[1])]);
        session.start(0).unwrap();
        session
            .submit_answer(1, 10, BTreeSet::from([2]), 10.0)
            .unwrap();
        let err = session
            .submit_answer(1, 10, BTreeSet::from([1]), 12.0)
            .unwrap_err();
        assert!(matches!(err, MatchError::DuplicateAnswer));
        assert_eq!(session.players[&1].answers.len(), 1);
        assert_eq!(session.players[&1].score, 140, "score unchanged by the retry");
    }

    #[test]
    fn stale_question_is_rejected() {
        let mut session = two_player_session(vec![
            question(10, &[2], &[1]),
            question(11, &[4], &[5]),
        ]);
        session.start(0).unwrap();
        session.advance(1_000).unwrap();
        let err = session
            .submit_answer(1, 10, BTreeSet::from([2]), 3.0)
            .unwrap_err();
        assert!(matches!(err, MatchError::InvalidState(_)));
    }

    #[test]
    fn answers_outside_running_state_are_rejected() {
        let mut session = two_player_session(vec![question(10, &[2], &[1])]);
        let err = session
            .submit_answer(1, 10, BTreeSet::from([2]), 3.0)
            .unwrap_err();
        assert!(matches!(err, MatchError::InvalidState(_)));
    }

    #[test]
    fn advance_walks_questions_then_completes() {
        let mut session = two_player_session(vec![
            question(10, &[2], &[1]),
            question(11, &[4], &[5]),
        ]);
        session.start(0).unwrap();
        assert_eq!(session.advance(1).unwrap(), Advance::NextQuestion(1));
        assert_eq!(session.advance(2).unwrap(), Advance::Completed);
        assert_eq!(session.status, MatchStatus::Completed);

        let err = session.advance(3).unwrap_err();
        assert!(matches!(err, MatchError::InvalidState(_)));
    }

    #[test]
    fn all_answered_tracks_current_round() {
        let mut session = two_player_session(vec![question(10, &[2], &[1])]);
        session.start(0).unwrap();
        assert!(!session.all_answered());
        session
            .submit_answer(1, 10, BTreeSet::from([2]), 1.0)
            .unwrap();
        assert!(!session.all_answered());
        session
            .submit_answer(2, 10, BTreeSet::from([1]), 1.0)
            .unwrap();
        assert!(session.all_answered());
    }

    #[test]
    fn results_sorted_by_score_with_join_order_ties() {
        let mut session = Session::new(MatchKind::Multiplayer, 1, 4, 30, vec![question(10, &[2], &[1])]);
        session.add_player(1, "alice".into(), None, false).unwrap();
        session.add_player(2, "bob".into(), None, false).unwrap();
        session.add_player(3, "carol".into(), None, false).unwrap();
        for id in [1, 2, 3] {
            session.set_ready(id, true).unwrap();
        }
        session.start(0).unwrap();
        // alice 140, bob 300 via manual score poke, carol 0
        session
            .submit_answer(1, 10, BTreeSet::from([2]), 10.0)
            .unwrap();
        session
            .submit_answer(3, 10, BTreeSet::from([1]), 10.0)
            .unwrap();
        session.players.get_mut(&2).unwrap().score = 300;

        let results = session.results();
        let scores: Vec<u32> = results.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![300, 140, 0]);
        assert_eq!(results[0].user_id, 2);
        assert_eq!(results[1].accuracy, 100);
        assert_eq!(results[2].accuracy, 0);
    }

    #[test]
    fn tie_break_is_join_order() {
        let mut session = Session::new(MatchKind::Multiplayer, 1, 4, 30, vec![question(10, &[2], &[1])]);
        session.add_player(7, "first".into(), None, false).unwrap();
        session.add_player(3, "second".into(), None, false).unwrap();
        let results = session.results();
        assert_eq!(results[0].user_id, 7);
        assert_eq!(results[1].user_id, 3);
    }

    #[test]
    fn disconnect_keeps_player_registered() {
        let conn = Uuid::new_v4();
        let mut session = Session::new(MatchKind::Friend1v1, 1, 2, 30, vec![question(10, &[2], &[1])]);
        session.add_player(1, "alice".into(), Some(conn), false).unwrap();
        let dropped = session.drop_connection(conn).unwrap();
        assert_eq!(dropped.user_id, 1);
        assert!(session.players.contains_key(&1));
        assert!(session.players[&1].connection.is_none());
    }
}
