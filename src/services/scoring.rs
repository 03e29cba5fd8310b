//! Points and per-participant tallies, always recomputed from the response log.

use std::collections::HashMap;

use uuid::Uuid;

use crate::state::game::{Question, Quiz, Response};

/// Points for one answer.
///
/// Incorrect or missing answers score nothing. A correct answer earns the full base at
/// `elapsed_ms = 0`, decaying linearly to half the base at `elapsed_ms = time_limit_ms`, and
/// never below half. A zero-length window awards full points.
pub fn points(base: u32, is_correct: bool, elapsed_ms: u64, time_limit_ms: u64) -> u32 {
    if !is_correct {
        return 0;
    }
    if time_limit_ms == 0 {
        return base;
    }

    let elapsed = u128::from(elapsed_ms.min(time_limit_ms));
    let limit = u128::from(time_limit_ms);
    let base_wide = u128::from(base);

    // floor(base * (1 - 0.5 * elapsed / limit)) == floor(base * (2 * limit - elapsed) / (2 * limit))
    let decayed = base_wide * (2 * limit - elapsed) / (2 * limit);
    let floor = base_wide / 2;
    u32::try_from(decayed.max(floor)).unwrap_or(u32::MAX)
}

/// Points earned by `response` on `question`.
pub fn response_points(question: &Question, response: &Response) -> u32 {
    points(
        question.points,
        question.is_correct(response.answer_id),
        response.response_time_ms,
        question.time_limit_ms(),
    )
}

/// Aggregate of one participant's current responses.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    /// Sum of points.
    pub points: u32,
    /// Responses that picked the canonical correct answer.
    pub correct: u32,
    /// Distinct questions with a response, answered or timed out.
    pub completed: u32,
    /// Distinct questions with a picked answer.
    pub answered: u32,
}

/// Tally every participant's responses against the quiz.
///
/// Only the latest response per (participant, question) counts and responses to questions
/// outside the quiz are ignored, so the result never depends on storage iteration order.
pub fn tally(quiz: &Quiz, responses: &[Response]) -> HashMap<Uuid, Tally> {
    let questions: HashMap<Uuid, &Question> = quiz
        .questions
        .iter()
        .map(|question| (question.id, question))
        .collect();

    let mut current: HashMap<(Uuid, Uuid), &Response> = HashMap::new();
    for response in responses {
        if !questions.contains_key(&response.question_id) {
            continue;
        }
        current
            .entry((response.participant_id, response.question_id))
            .and_modify(|kept| {
                if (response.created_at, response.id) > (kept.created_at, kept.id) {
                    *kept = response;
                }
            })
            .or_insert(response);
    }

    let mut tallies: HashMap<Uuid, Tally> = HashMap::new();
    for ((participant_id, question_id), response) in current {
        let Some(question) = questions.get(&question_id) else {
            continue;
        };
        let entry = tallies.entry(participant_id).or_default();
        entry.completed += 1;
        if response.answer_id.is_some() {
            entry.answered += 1;
        }
        if question.is_correct(response.answer_id) {
            entry.correct += 1;
        }
        entry.points = entry.points.saturating_add(response_points(question, response));
    }
    tallies
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::state::game::{Answer, Visibility};

    #[test]
    fn speed_bonus_bounds() {
        assert_eq!(points(1000, true, 0, 20_000), 1000);
        assert_eq!(points(1000, true, 20_000, 20_000), 500);
        assert_eq!(points(1000, true, 10_000, 20_000), 750);
        assert_eq!(points(1000, false, 0, 20_000), 0);
        assert_eq!(points(1000, false, 20_000, 20_000), 0);
    }

    #[test]
    fn late_answers_keep_the_floor() {
        assert_eq!(points(1000, true, 90_000, 20_000), 500);
        assert_eq!(points(999, true, 20_000, 20_000), 499);
        assert_eq!(points(1000, true, 5_000, 0), 1000);
    }

    fn quiz() -> Quiz {
        let question = |order_index| Question {
            id: Uuid::new_v4(),
            text: format!("q{order_index}"),
            time_limit_secs: 20,
            points: 1000,
            order_index,
            answers: vec![
                Answer {
                    id: Uuid::new_v4(),
                    text: "right".into(),
                    color: None,
                    is_correct: true,
                    order_index: 0,
                },
                Answer {
                    id: Uuid::new_v4(),
                    text: "wrong".into(),
                    color: None,
                    is_correct: false,
                    order_index: 1,
                },
            ],
        };
        Quiz {
            id: Uuid::new_v4(),
            title: "t".into(),
            description: None,
            visibility: Visibility::Public,
            owner_id: Uuid::new_v4(),
            created_at: SystemTime::UNIX_EPOCH,
            questions: vec![question(0), question(1)],
        }
    }

    fn response(
        participant_id: Uuid,
        question: &Question,
        answer: Option<usize>,
        at_secs: u64,
    ) -> Response {
        Response {
            id: Uuid::new_v4(),
            session_id: Uuid::nil(),
            participant_id,
            question_id: question.id,
            answer_id: answer.map(|index| question.answers[index].id),
            response_time_ms: 0,
            created_at: SystemTime::UNIX_EPOCH + Duration::from_secs(at_secs),
        }
    }

    #[test]
    fn only_latest_response_per_question_counts() {
        let quiz = quiz();
        let player = Uuid::new_v4();
        let q0 = &quiz.questions[0];
        let responses = vec![
            response(player, q0, Some(0), 1),
            response(player, q0, Some(1), 2),
            response(player, &quiz.questions[1], None, 3),
        ];

        let tallies = tally(&quiz, &responses);
        let tally = tallies[&player];
        assert_eq!(tally.points, 0);
        assert_eq!(tally.correct, 0);
        assert_eq!(tally.completed, 2);
        assert_eq!(tally.answered, 1);
    }

    #[test]
    fn foreign_questions_are_ignored() {
        let quiz = quiz();
        let other = self::quiz();
        let player = Uuid::new_v4();
        let responses = vec![response(player, &other.questions[0], Some(0), 1)];
        assert!(tally(&quiz, &responses).is_empty());
    }
}
