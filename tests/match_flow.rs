//! End-to-end coordinator flows against an in-process fixture content source.

use std::{sync::Arc, time::Duration};

use axum::extract::ws::Message;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use uuid::Uuid;
use quiz_arena_back::{
    config::AppConfig,
    dao::{
        content::{ContentSource, QuestionEntity, QuestionOptionEntity, QuizInfo, UserInfo},
        storage::StorageResult,
    },
    dto::ws::Identity,
    error::MatchError,
    services::match_service,
    state::{
        AppState, SharedState, WsConnection,
        session::{MatchKind, MatchStatus},
    },
};

const QUIZ_ID: i64 = 42;
const TIME_LIMIT: u32 = 5;

/// Static content backend serving one quiz with two single-choice questions.
#[derive(Clone)]
struct FixtureContent {
    questions: Vec<QuestionEntity>,
}

impl FixtureContent {
    fn new() -> Self {
        Self {
            questions: vec![fixture_question(10), fixture_question(11)],
        }
    }

    fn empty() -> Self {
        Self {
            questions: Vec::new(),
        }
    }
}

fn fixture_question(id: i64) -> QuestionEntity {
    QuestionEntity {
        id,
        text: format!("question {id}"),
        difficulty: Some("medium".into()),
        options: vec![
            QuestionOptionEntity {
                id: id * 10 + 1,
                text: "wrong".into(),
                is_correct: false,
            },
            QuestionOptionEntity {
                id: id * 10 + 2,
                text: "right".into(),
                is_correct: true,
            },
        ],
        point_value: None,
    }
}

impl ContentSource for FixtureContent {
    fn find_quiz(&self, quiz_id: i64) -> BoxFuture<'static, StorageResult<Option<QuizInfo>>> {
        let quiz = (quiz_id == QUIZ_ID).then(|| QuizInfo {
            id: QUIZ_ID,
            title: "fixture quiz".into(),
            time_limit_seconds: Some(TIME_LIMIT),
            is_active: true,
        });
        Box::pin(async move { Ok(quiz) })
    }

    fn load_questions(
        &self,
        quiz_id: i64,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        let questions = if quiz_id == QUIZ_ID {
            self.questions.clone()
        } else {
            Vec::new()
        };
        Box::pin(async move { Ok(questions) })
    }

    fn find_user(&self, user_id: i64) -> BoxFuture<'static, StorageResult<Option<UserInfo>>> {
        Box::pin(async move {
            Ok(Some(UserInfo {
                id: user_id,
                username: format!("user-{user_id}"),
                first_name: None,
                last_name: None,
                is_active: true,
            }))
        })
    }

    fn resolve_token(&self, _token: String) -> BoxFuture<'static, StorageResult<Option<UserInfo>>> {
        Box::pin(async move { Ok(None) })
    }
}

fn fixture_state() -> SharedState {
    AppState::new(AppConfig::default(), Arc::new(FixtureContent::new()))
}

fn identity(user_id: i64, name: &str) -> Identity {
    Identity {
        user_id,
        username: name.to_string(),
        display_name: name.to_string(),
    }
}

fn correct_option(question_id: i64) -> i64 {
    question_id * 10 + 2
}

#[tokio::test(start_paused = true)]
async fn friend_match_runs_to_completion() {
    let state = fixture_state();
    let alice = identity(1, "alice");
    let bob = identity(2, "bob");

    let (handle, join_code) =
        match_service::create_match(&state, &alice, MatchKind::Friend1v1, QUIZ_ID, None, None)
            .await
            .unwrap();
    let join_code = join_code.unwrap();
    assert_eq!(join_code.len(), 6);
    assert!(
        join_code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    );

    // Join codes are case-insensitive.
    let (joined, roster) = match_service::join_by_code(&state, &bob, &join_code.to_lowercase(), None)
        .await
        .unwrap();
    assert_eq!(joined.id, handle.id);
    assert_eq!(roster.len(), 2);

    match_service::set_ready(&state, &alice, true).await.unwrap();
    {
        let session = handle.lock().await;
        assert_eq!(session.status, MatchStatus::Waiting, "1v1 waits for both");
    }
    match_service::set_ready(&state, &bob, true).await.unwrap();
    {
        let session = handle.lock().await;
        assert_eq!(session.status, MatchStatus::InProgress);
        assert_eq!(session.current_question_index, Some(0));
    }
    assert!(
        state.registry().get_by_join_code(&join_code).is_none(),
        "join code is released at start"
    );

    // Round one: both answer, the session advances without the timer.
    let outcome = match_service::submit_answer(&state, &alice, 10, vec![correct_option(10)], 1.0)
        .await
        .unwrap();
    assert!(outcome.is_correct);
    assert_eq!(outcome.points_awarded, 108, "100 + floor((5 - 1) * 2)");

    match_service::submit_answer(&state, &bob, 10, vec![correct_option(10)], 2.0)
        .await
        .unwrap();
    {
        let session = handle.lock().await;
        assert_eq!(session.current_question_index, Some(1));
    }

    // Round two completes the match.
    match_service::submit_answer(&state, &alice, 11, vec![correct_option(11)], 1.0)
        .await
        .unwrap();
    let outcome = match_service::submit_answer(&state, &bob, 11, vec![111], 1.0)
        .await
        .unwrap();
    assert!(!outcome.is_correct);

    {
        let session = handle.lock().await;
        assert_eq!(session.status, MatchStatus::Completed);
        let results = session.results();
        assert_eq!(results[0].user_id, alice.user_id);
        assert!(results[0].score > results[1].score);
    }

    // Teardown happens after the completion grace.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(state.registry().get(handle.id).is_none());
    assert!(state.registry().get_by_user(alice.user_id).is_none());
}

#[tokio::test(start_paused = true)]
async fn round_timer_advances_unanswered_rounds() {
    let state = fixture_state();
    let alice = identity(1, "alice");
    let bob = identity(2, "bob");

    let (handle, join_code) =
        match_service::create_match(&state, &alice, MatchKind::Friend1v1, QUIZ_ID, None, None)
            .await
            .unwrap();
    match_service::join_by_code(&state, &bob, &join_code.unwrap(), None)
        .await
        .unwrap();
    match_service::set_ready(&state, &alice, true).await.unwrap();
    match_service::set_ready(&state, &bob, true).await.unwrap();

    tokio::time::sleep(Duration::from_secs(u64::from(TIME_LIMIT) + 1)).await;
    {
        let session = handle.lock().await;
        assert_eq!(session.status, MatchStatus::InProgress);
        assert_eq!(session.current_question_index, Some(1), "timer advanced round");
    }

    tokio::time::sleep(Duration::from_secs(u64::from(TIME_LIMIT) + 1)).await;
    {
        let session = handle.lock().await;
        assert_eq!(session.status, MatchStatus::Completed);
        for result in session.results() {
            assert_eq!(result.score, 0, "nobody answered anything");
        }
    }
}

#[tokio::test]
async fn full_friend_match_rejects_a_third_player() {
    let state = fixture_state();
    let alice = identity(1, "alice");
    let bob = identity(2, "bob");
    let carol = identity(3, "carol");

    let (_, join_code) =
        match_service::create_match(&state, &alice, MatchKind::Friend1v1, QUIZ_ID, None, None)
            .await
            .unwrap();
    let join_code = join_code.unwrap();

    match_service::join_by_code(&state, &bob, &join_code, None)
        .await
        .unwrap();
    let err = match_service::join_by_code(&state, &carol, &join_code, None)
        .await
        .unwrap_err();
    assert!(matches!(err, MatchError::SessionFull));
    assert!(state.registry().get_by_user(carol.user_id).is_none());
}

#[tokio::test]
async fn duplicate_submission_is_rejected_with_score_intact() {
    let state = fixture_state();
    let alice = identity(1, "alice");
    let bob = identity(2, "bob");

    let (handle, join_code) =
        match_service::create_match(&state, &alice, MatchKind::Friend1v1, QUIZ_ID, None, None)
            .await
            .unwrap();
    match_service::join_by_code(&state, &bob, &join_code.unwrap(), None)
        .await
        .unwrap();
    match_service::set_ready(&state, &alice, true).await.unwrap();
    match_service::set_ready(&state, &bob, true).await.unwrap();

    let first = match_service::submit_answer(&state, &alice, 10, vec![correct_option(10)], 1.0)
        .await
        .unwrap();
    let err = match_service::submit_answer(&state, &alice, 10, vec![101], 2.0)
        .await
        .unwrap_err();
    assert!(matches!(err, MatchError::DuplicateAnswer));

    let session = handle.lock().await;
    assert_eq!(session.players[&alice.user_id].score, first.total_score);
}

#[tokio::test]
async fn empty_quiz_never_produces_a_session() {
    let state = AppState::new(AppConfig::default(), Arc::new(FixtureContent::empty()));
    let alice = identity(1, "alice");

    let err =
        match_service::create_match(&state, &alice, MatchKind::Friend1v1, QUIZ_ID, None, None)
            .await
            .unwrap_err();
    assert!(matches!(err, MatchError::NoQuestions));
    assert!(state.registry().session_ids().is_empty());
    assert!(state.registry().get_by_user(alice.user_id).is_none());
}

#[tokio::test]
async fn creator_cannot_open_a_second_match() {
    let state = fixture_state();
    let alice = identity(1, "alice");

    match_service::create_match(&state, &alice, MatchKind::Friend1v1, QUIZ_ID, None, None)
        .await
        .unwrap();
    let err =
        match_service::create_match(&state, &alice, MatchKind::Multiplayer, QUIZ_ID, None, None)
            .await
            .unwrap_err();
    assert!(matches!(err, MatchError::AlreadyInSession));
}

#[tokio::test]
async fn join_code_resolves_from_snapshot_after_registry_loss() {
    let state = fixture_state();
    let alice = identity(1, "alice");
    let bob = identity(2, "bob");

    let (handle, join_code) =
        match_service::create_match(&state, &alice, MatchKind::Friend1v1, QUIZ_ID, None, None)
            .await
            .unwrap();
    let join_code = join_code.unwrap();
    let original_id = handle.id;

    // Simulate a coordinator restart: registry gone, snapshots survive.
    state.registry().remove(original_id).await.unwrap();
    assert!(state.registry().get_by_join_code(&join_code).is_none());

    let (rehydrated, roster) = match_service::join_by_code(&state, &bob, &join_code, None)
        .await
        .unwrap();
    assert_eq!(rehydrated.id, original_id, "session id survives rehydration");
    assert_eq!(roster.len(), 2, "snapshot players plus the joiner");

    let session = rehydrated.lock().await;
    assert!(session.players.contains_key(&alice.user_id));
    assert_eq!(session.status, MatchStatus::Waiting);
}

#[tokio::test(start_paused = true)]
async fn solo_match_plays_against_a_ready_opponent() {
    let state = fixture_state();
    let alice = identity(1, "alice");

    let (handle, join_code) =
        match_service::create_match(&state, &alice, MatchKind::Solo, QUIZ_ID, None, None)
            .await
            .unwrap();
    assert!(join_code.is_none(), "solo matches are not joinable");

    {
        let session = handle.lock().await;
        assert_eq!(session.players.len(), 2);
        let opponent = session
            .players
            .values()
            .find(|player| player.is_ai)
            .unwrap();
        assert!(opponent.is_ready, "AI seats are ready from the start");
        assert!(opponent.user_id < 0);
    }

    // The only human readying up starts the match.
    match_service::set_ready(&state, &alice, true).await.unwrap();
    {
        let session = handle.lock().await;
        assert_eq!(session.status, MatchStatus::InProgress);
    }

    match_service::submit_answer(&state, &alice, 10, vec![correct_option(10)], 1.0)
        .await
        .unwrap();

    // The AI answer lands within the round; once it does, the round advances.
    tokio::time::sleep(Duration::from_secs(u64::from(TIME_LIMIT))).await;
    let session = handle.lock().await;
    assert_eq!(session.current_question_index, Some(1));
    let opponent = session
        .players
        .values()
        .find(|player| player.is_ai)
        .unwrap();
    assert_eq!(opponent.answers.len(), 1, "one AI answer per round");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_never_exceed_capacity() {
    let state = fixture_state();
    let creator = identity(1, "creator");

    let (handle, join_code) =
        match_service::create_match(&state, &creator, MatchKind::Multiplayer, QUIZ_ID, None, None)
            .await
            .unwrap();
    let join_code = join_code.unwrap();
    let capacity = state.config().max_open_players;

    let mut tasks = Vec::new();
    for n in 0..(capacity + 4) {
        let state = state.clone();
        let join_code = join_code.clone();
        let joiner = identity(100 + n as i64, &format!("joiner-{n}"));
        tasks.push(tokio::spawn(async move {
            let result = match_service::join_by_code(&state, &joiner, &join_code, None).await;
            (joiner.user_id, result)
        }));
    }

    let mut admitted = 0;
    for task in tasks {
        let (user_id, result) = task.await.unwrap();
        match result {
            Ok(_) => admitted += 1,
            Err(err) => {
                assert!(matches!(err, MatchError::SessionFull), "unexpected: {err}");
                assert!(
                    state.registry().get_by_user(user_id).is_none(),
                    "rejected joiner must not stay indexed"
                );
            }
        }
    }

    assert_eq!(admitted, capacity - 1, "creator holds one seat");
    let session = handle.lock().await;
    assert_eq!(session.players.len(), capacity);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_joins_land_a_user_in_exactly_one_session() {
    for _ in 0..50 {
        let state = fixture_state();
        let bob = identity(2, "bob");

        let mut codes = Vec::new();
        let mut handles = Vec::new();
        for creator_id in [30, 40] {
            let creator = identity(creator_id, &format!("creator-{creator_id}"));
            let (handle, join_code) = match_service::create_match(
                &state,
                &creator,
                MatchKind::Friend1v1,
                QUIZ_ID,
                None,
                None,
            )
            .await
            .unwrap();
            codes.push(join_code.unwrap());
            handles.push(handle);
        }

        let mut tasks = Vec::new();
        for code in codes {
            let state = state.clone();
            let bob = bob.clone();
            tasks.push(tokio::spawn(async move {
                match_service::join_by_code(&state, &bob, &code, None).await
            }));
        }
        let mut successes = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1, "exactly one of two racing joins may win");

        let mut memberships = 0;
        for handle in &handles {
            let session = handle.lock().await;
            if session.players.contains_key(&bob.user_id) {
                memberships += 1;
            }
        }
        assert_eq!(memberships, 1, "user must appear in exactly one roster");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_submissions_record_one_answer() {
    let state = fixture_state();
    let alice = identity(1, "alice");
    let bob = identity(2, "bob");

    let (handle, join_code) =
        match_service::create_match(&state, &alice, MatchKind::Friend1v1, QUIZ_ID, None, None)
            .await
            .unwrap();
    match_service::join_by_code(&state, &bob, &join_code.unwrap(), None)
        .await
        .unwrap();
    match_service::set_ready(&state, &alice, true).await.unwrap();
    match_service::set_ready(&state, &bob, true).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let state = state.clone();
        let alice = alice.clone();
        tasks.push(tokio::spawn(async move {
            match_service::submit_answer(&state, &alice, 10, vec![correct_option(10)], 1.0).await
        }));
    }

    let mut accepted = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Ok(outcome) => accepted.push(outcome),
            Err(err) => assert!(matches!(err, MatchError::DuplicateAnswer), "unexpected: {err}"),
        }
    }
    assert_eq!(accepted.len(), 1, "one submission wins, the rest are duplicates");

    let session = handle.lock().await;
    let player = &session.players[&alice.user_id];
    assert_eq!(player.answers.len(), 1);
    assert_eq!(player.score, accepted[0].points_awarded);
}

/// Collect the `type` tags of everything queued on a connection channel.
fn drain_event_types(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<String> {
    let mut types = Vec::new();
    while let Ok(message) = rx.try_recv() {
        if let Message::Text(text) = message {
            let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
            types.push(value["type"].as_str().unwrap_or_default().to_string());
        }
    }
    types
}

fn attach_connection(state: &SharedState) -> (Uuid, mpsc::UnboundedReceiver<Message>) {
    let id = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();
    state.connections().insert(id, WsConnection { id, tx });
    (id, rx)
}

#[tokio::test]
async fn answer_result_reaches_the_last_submitter_before_the_advance() {
    let state = fixture_state();
    let alice = identity(1, "alice");
    let bob = identity(2, "bob");
    let (alice_conn, mut alice_rx) = attach_connection(&state);
    let (bob_conn, mut bob_rx) = attach_connection(&state);

    let (_, join_code) = match_service::create_match(
        &state,
        &alice,
        MatchKind::Friend1v1,
        QUIZ_ID,
        Some(alice_conn),
        None,
    )
    .await
    .unwrap();
    match_service::join_by_code(&state, &bob, &join_code.unwrap(), Some(bob_conn))
        .await
        .unwrap();
    match_service::set_ready(&state, &alice, true).await.unwrap();
    match_service::set_ready(&state, &bob, true).await.unwrap();

    match_service::submit_answer(&state, &alice, 10, vec![correct_option(10)], 1.0)
        .await
        .unwrap();
    let events = drain_event_types(&mut alice_rx);
    assert!(
        events.contains(&"answer_result".to_string()),
        "submitter gets a private result: {events:?}"
    );

    // Bob's answer closes the round; his private result must land before the
    // round-advance broadcast it triggers.
    match_service::submit_answer(&state, &bob, 10, vec![correct_option(10)], 1.0)
        .await
        .unwrap();
    let events = drain_event_types(&mut bob_rx);
    let result_at = events.iter().position(|e| e == "answer_result");
    let advance_at = events.iter().position(|e| e == "next_question");
    assert!(result_at.is_some() && advance_at.is_some(), "got: {events:?}");
    assert!(
        result_at < advance_at,
        "answer_result must precede next_question: {events:?}"
    );
}
