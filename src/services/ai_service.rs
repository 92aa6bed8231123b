//! Scripted AI opponents.
//!
//! Each round, every AI seat gets one scheduled submission: a randomized
//! think delay drawn from the opponent's profile and a selection that is
//! correct with the profile's accuracy. The submission goes through the same
//! scoring path as a human answer, so the coordinator treats both alike.

use std::{collections::BTreeSet, time::Duration};

use rand::Rng;
use tokio::time::sleep;
use tracing::debug;

use crate::{
    services::match_service,
    state::{
        SharedState,
        session::{Question, Session, UserId},
    },
};

/// Floor for the think delay so an AI answer never looks instantaneous.
const MIN_THINK_SECONDS: f64 = 0.5;

/// Schedule one submission per AI seat for the session's active question.
/// Must be called with the session lock held, right after a round is dealt.
pub(crate) fn schedule_round(state: &SharedState, session: &Session) {
    let Some(question) = session.current_question() else {
        return;
    };

    for player in session.players.values() {
        if !player.is_ai || player.has_answered(question.id) {
            continue;
        }
        let plan = plan_answer(state, player.user_id, session.time_limit_seconds, question);
        debug!(
            session_id = %session.id,
            user_id = player.user_id,
            question_id = question.id,
            delay_seconds = plan.delay_seconds,
            "AI answer scheduled"
        );

        let state = state.clone();
        let session_id = session.id;
        let user_id = player.user_id;
        let question_id = question.id;
        tokio::spawn(async move {
            sleep(Duration::from_secs_f64(plan.delay_seconds)).await;
            match_service::submit_ai_answer(
                &state,
                session_id,
                user_id,
                question_id,
                plan.selection,
                plan.delay_seconds,
            )
            .await;
        });
    }
}

struct PlannedAnswer {
    delay_seconds: f64,
    selection: BTreeSet<i64>,
}

/// Decide, up front, when the AI answers and what it picks. Rolling the dice
/// at scheduling time keeps the spawned task free of shared state.
fn plan_answer(
    state: &SharedState,
    user_id: UserId,
    time_limit_seconds: u32,
    question: &Question,
) -> PlannedAnswer {
    let mut rng = rand::rng();
    let profile = state.config().opponent(-user_id);

    let (min, max, accuracy) = match profile {
        Some(profile) => (
            profile.response_min_seconds,
            profile.response_max_seconds.max(profile.response_min_seconds),
            profile.accuracy_percent,
        ),
        // A seat without a catalog entry still answers, at middling strength.
        None => (3.0, 9.0, 50),
    };

    let drawn = rng.random_range(min..=max) * question.difficulty.ai_delay_scale();
    // Keep the answer inside the round: the timer would discard it otherwise.
    let ceiling = (f64::from(time_limit_seconds) - 1.0).max(MIN_THINK_SECONDS);
    let delay_seconds = drawn.clamp(MIN_THINK_SECONDS, ceiling);

    let correct = question.correct_option_ids();
    let answers_correctly = rng.random_range(0..100) < u32::from(accuracy);
    let selection = if answers_correctly {
        correct
    } else {
        wrong_selection(&mut rng, question, &correct)
    };

    PlannedAnswer {
        delay_seconds,
        selection,
    }
}

/// Pick a plausible wrong answer: one incorrect option when any exists,
/// otherwise an empty selection (which can never equal a non-empty correct
/// set).
fn wrong_selection(
    rng: &mut impl Rng,
    question: &Question,
    correct: &BTreeSet<i64>,
) -> BTreeSet<i64> {
    let incorrect: Vec<i64> = question
        .options
        .iter()
        .filter(|option| !correct.contains(&option.id))
        .map(|option| option.id)
        .collect();
    match incorrect.is_empty() {
        true => BTreeSet::new(),
        false => BTreeSet::from([incorrect[rng.random_range(0..incorrect.len())]]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session::{Difficulty, QuestionOption};

    fn question() -> Question {
        Question {
            id: 10,
            text: "q".into(),
            difficulty: Difficulty::Medium,
            options: vec![
                QuestionOption {
                    id: 1,
                    text: "a".into(),
                    is_correct: false,
                },
                QuestionOption {
                    id: 2,
                    text: "b".into(),
                    is_correct: true,
                },
            ],
            point_value: 100,
        }
    }

    #[test]
    fn wrong_selection_never_matches_correct_set() {
        let question = question();
        let correct = question.correct_option_ids();
        let mut rng = rand::rng();
        for _ in 0..50 {
            let picked = wrong_selection(&mut rng, &question, &correct);
            assert_ne!(picked, correct);
        }
    }

    #[test]
    fn wrong_selection_is_empty_when_every_option_is_correct() {
        let mut question = question();
        for option in &mut question.options {
            option.is_correct = true;
        }
        let correct = question.correct_option_ids();
        let mut rng = rand::rng();
        assert!(wrong_selection(&mut rng, &question, &correct).is_empty());
    }
}
