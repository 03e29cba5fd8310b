use std::{cmp::Reverse, collections::HashMap};

use uuid::Uuid;

use crate::{
    dto::results::{
        LeaderboardEntry, LeaderboardResponse, PersonalStatsResponse, QuestionStat,
        QuestionStatsResponse,
    },
    error::ServiceError,
    services::{scoring::Tally, session_board::SessionBoard},
    state::{
        SharedState,
        game::{Participant, Response},
    },
};

/// Standings of a session, recomputed from its response log.
pub async fn leaderboard(state: &SharedState, session_id: Uuid) -> Result<LeaderboardResponse, ServiceError> {
    let store = state.require_quiz_store().await?;
    let board = SessionBoard::load(store.as_ref(), session_id).await?;
    Ok(leaderboard_of(&board))
}

/// Per-question statistics. Host only.
pub async fn question_stats(
    state: &SharedState,
    session_id: Uuid,
    caller: Option<Uuid>,
) -> Result<QuestionStatsResponse, ServiceError> {
    let store = state.require_quiz_store().await?;
    let board = SessionBoard::load(store.as_ref(), session_id).await?;
    if !board.session.is_host(caller) {
        return Err(ServiceError::Forbidden(
            "only the host can read question statistics".into(),
        ));
    }
    Ok(question_stats_of(&board))
}

/// Summary of one participant's game.
pub async fn personal_stats(
    state: &SharedState,
    session_id: Uuid,
    participant_id: Uuid,
) -> Result<PersonalStatsResponse, ServiceError> {
    let store = state.require_quiz_store().await?;
    let board = SessionBoard::load(store.as_ref(), session_id).await?;
    personal_stats_of(&board, participant_id).ok_or_else(|| {
        ServiceError::NotFound(format!("participant `{participant_id}` not found"))
    })
}

/// Participants by score descending, ties kept in join order.
fn standings<'a>(
    participants: &'a [Participant],
    tallies: &HashMap<Uuid, Tally>,
) -> Vec<(&'a Participant, Tally)> {
    let mut ordered: Vec<(&Participant, Tally)> = participants
        .iter()
        .map(|participant| {
            (
                participant,
                tallies.get(&participant.id).copied().unwrap_or_default(),
            )
        })
        .collect();
    ordered.sort_by_key(|(participant, tally)| (Reverse(tally.points), participant.join_seq));
    ordered
}

/// Competition rank: 1 + number of scores strictly greater than `points`.
fn rank_of(points: u32, scores: &[u32]) -> u32 {
    let ahead = scores.iter().filter(|score| **score > points).count();
    u32::try_from(ahead).unwrap_or(u32::MAX).saturating_add(1)
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

pub fn leaderboard_of(board: &SessionBoard) -> LeaderboardResponse {
    let tallies = board.tallies();
    let ordered = standings(&board.participants, &tallies);
    let scores: Vec<u32> = ordered.iter().map(|(_, tally)| tally.points).collect();

    let entries = ordered
        .iter()
        .zip(1u32..)
        .map(|((participant, tally), position)| LeaderboardEntry {
            position,
            rank: rank_of(tally.points, &scores),
            participant_id: participant.id,
            nickname: participant.nickname.clone(),
            score: tally.points,
            correct_count: tally.correct,
            answered_count: tally.answered,
        })
        .collect();

    LeaderboardResponse {
        session_id: board.session.id,
        is_final: board.is_final(),
        total_participants: count(board.participants.len()),
        entries,
    }
}

pub fn question_stats_of(board: &SessionBoard) -> QuestionStatsResponse {
    // Responses of participants who left no longer count.
    let current: Vec<&Response> = board
        .responses
        .iter()
        .filter(|response| board.participant(response.participant_id).is_some())
        .collect();

    let questions = board
        .quiz
        .questions
        .iter()
        .map(|question| {
            let responses: Vec<&&Response> = current
                .iter()
                .filter(|response| response.question_id == question.id)
                .collect();
            let answered: Vec<u64> = responses
                .iter()
                .filter(|response| response.answer_id.is_some())
                .map(|response| response.response_time_ms)
                .collect();
            let average_response_ms = (!answered.is_empty())
                .then(|| answered.iter().sum::<u64>() / answered.len() as u64);

            QuestionStat {
                question_id: question.id,
                order_index: question.order_index,
                text: question.text.clone(),
                total_responses: count(responses.len()),
                correct_count: count(
                    responses
                        .iter()
                        .filter(|response| question.is_correct(response.answer_id))
                        .count(),
                ),
                unanswered_count: count(responses.len() - answered.len()),
                average_response_ms,
            }
        })
        .collect();

    QuestionStatsResponse {
        session_id: board.session.id,
        is_final: board.is_final(),
        questions,
    }
}

pub fn personal_stats_of(board: &SessionBoard, participant_id: Uuid) -> Option<PersonalStatsResponse> {
    let participant = board.participant(participant_id)?;
    let tallies = board.tallies();
    let tally = tallies.get(&participant_id).copied().unwrap_or_default();
    let scores: Vec<u32> = board
        .participants
        .iter()
        .map(|other| tallies.get(&other.id).map(|t| t.points).unwrap_or(0))
        .collect();

    Some(PersonalStatsResponse {
        session_id: board.session.id,
        participant_id,
        nickname: participant.nickname.clone(),
        rank: rank_of(tally.points, &scores),
        total_participants: count(board.participants.len()),
        points: tally.points,
        correct_count: tally.correct,
        answered_count: tally.answered,
        total_questions: board.total_questions(),
        is_final: board.is_final(),
    })
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::state::{
        game::{Answer, GameSession, Question, Quiz, Visibility},
        state_machine::{SessionMode, SessionStatus},
    };

    fn question(order_index: u32) -> Question {
        Question {
            id: Uuid::new_v4(),
            text: format!("question {order_index}"),
            time_limit_secs: 20,
            points: 100,
            order_index,
            answers: (0..2)
                .map(|index| Answer {
                    id: Uuid::new_v4(),
                    text: format!("answer {index}"),
                    color: None,
                    is_correct: index == 0,
                    order_index: index,
                })
                .collect(),
        }
    }

    fn board(questions: u32, players: &[&str]) -> SessionBoard {
        let quiz = Quiz {
            id: Uuid::new_v4(),
            title: "Geography".into(),
            description: None,
            visibility: Visibility::Public,
            owner_id: Uuid::new_v4(),
            created_at: SystemTime::UNIX_EPOCH,
            questions: (0..questions).map(question).collect(),
        };
        let mut session = GameSession::new(
            quiz.id,
            quiz.owner_id,
            "123456".into(),
            SessionMode::HostedMultiplayer,
            SystemTime::UNIX_EPOCH,
        );
        session.status = SessionStatus::Finished;
        let participants = players
            .iter()
            .zip(1u64..)
            .map(|(nickname, join_seq)| Participant {
                id: Uuid::new_v4(),
                session_id: session.id,
                user_id: None,
                nickname: (*nickname).into(),
                score: 0,
                joined_at: SystemTime::UNIX_EPOCH,
                join_seq,
            })
            .collect();
        SessionBoard {
            session,
            quiz,
            participants,
            responses: Vec::new(),
        }
    }

    fn answer(board: &mut SessionBoard, player: usize, question: usize, correct: bool, ms: u64) {
        let q = &board.quiz.questions[question];
        let answer_id = q.answers[if correct { 0 } else { 1 }].id;
        board.responses.push(Response {
            id: Uuid::new_v4(),
            session_id: board.session.id,
            participant_id: board.participants[player].id,
            question_id: q.id,
            answer_id: Some(answer_id),
            response_time_ms: ms,
            created_at: SystemTime::UNIX_EPOCH + Duration::from_millis(ms),
        });
    }

    #[test]
    fn leaderboard_breaks_ties_by_join_order() {
        // Scores 300, 300, 500.
        let mut board = board(5, &["ana", "budi", "citra"]);
        for q in 0..3 {
            answer(&mut board, 0, q, true, 0);
            answer(&mut board, 1, q, true, 0);
        }
        for q in 0..5 {
            answer(&mut board, 2, q, true, 0);
        }

        let leaderboard = leaderboard_of(&board);
        assert!(leaderboard.is_final);
        assert_eq!(leaderboard.total_participants, 3);
        let lines: Vec<(&str, u32, u32, u32)> = leaderboard
            .entries
            .iter()
            .map(|entry| (entry.nickname.as_str(), entry.position, entry.rank, entry.score))
            .collect();
        assert_eq!(
            lines,
            [("citra", 1, 1, 500), ("ana", 2, 2, 300), ("budi", 3, 2, 300)]
        );
    }

    #[test]
    fn personal_stats_recompute_from_responses() {
        let mut board = board(3, &["ana", "budi"]);
        answer(&mut board, 0, 0, true, 0);
        answer(&mut board, 0, 1, false, 0);
        answer(&mut board, 1, 0, true, 0);
        answer(&mut board, 1, 1, true, 0);
        // Stale cached score must not matter.
        board.participants[0].score = 9_999;

        let ana = board.participants[0].id;
        let stats = personal_stats_of(&board, ana).expect("participant exists");
        assert_eq!(stats.rank, 2);
        assert_eq!(stats.points, 100);
        assert_eq!(stats.correct_count, 1);
        assert_eq!(stats.answered_count, 2);
        assert_eq!(stats.total_questions, 3);
        assert!(personal_stats_of(&board, Uuid::new_v4()).is_none());
    }

    #[test]
    fn question_stats_count_correct_and_unanswered() {
        let mut board = board(2, &["ana", "budi", "citra"]);
        answer(&mut board, 0, 0, true, 1_000);
        answer(&mut board, 1, 0, false, 3_000);
        let q0 = board.quiz.questions[0].id;
        board.responses.push(Response {
            id: Uuid::new_v4(),
            session_id: board.session.id,
            participant_id: board.participants[2].id,
            question_id: q0,
            answer_id: None,
            response_time_ms: 20_000,
            created_at: SystemTime::UNIX_EPOCH,
        });

        let stats = question_stats_of(&board);
        let first = &stats.questions[0];
        assert_eq!(first.total_responses, 3);
        assert_eq!(first.correct_count, 1);
        assert_eq!(first.unanswered_count, 1);
        assert_eq!(first.average_response_ms, Some(2_000));
        assert_eq!(stats.questions[1].total_responses, 0);
        assert_eq!(stats.questions[1].average_response_ms, None);
    }
}
