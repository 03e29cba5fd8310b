use std::{cmp::Reverse, collections::HashMap};

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{models::ParticipantEntity, storage::StorageError},
    dto::{
        roster::{JoinRequest, JoinResponse, ParticipantSummary, ProgressEntry, ProgressResponse},
        session::SessionSummary,
    },
    error::{Rejection, ServiceError},
    services::{
        scoring::Tally,
        session_board::{SessionBoard, find_session},
        session_service::open_session_by_pin,
    },
    state::{
        SessionNotification, SharedState,
        clock::{self, ClockReading},
        game::Participant,
        state_machine::{SessionPhase, SessionStatus},
    },
};

/// Admit a player into a hosted session's lobby.
///
/// Late joins are refused even when the countdown starts while the insert is in flight: the
/// session is re-read after the write and the participant withdrawn if play has begun.
pub async fn join(
    state: &SharedState,
    payload: JoinRequest,
    user_id: Option<Uuid>,
) -> Result<JoinResponse, ServiceError> {
    let store = state.require_quiz_store().await?;
    let session = open_session_by_pin(state, &payload.pin).await?;

    if !session.mode.uses_roster() {
        return Err(Rejection::RosterClosed.into());
    }
    if session.status != SessionStatus::Waiting {
        return Err(Rejection::LateJoin.into());
    }

    let nickname = payload.nickname.trim().to_owned();
    let participants = store.list_participants(session.id).await?;
    if participants
        .iter()
        .any(|participant| participant.nickname == nickname)
    {
        return Err(Rejection::DuplicateNickname.into());
    }

    let join_seq = participants
        .iter()
        .map(|participant| participant.join_seq)
        .max()
        .unwrap_or(0)
        + 1;
    let participant = Participant {
        id: Uuid::new_v4(),
        session_id: session.id,
        user_id,
        nickname,
        score: 0,
        joined_at: state.now(),
        join_seq,
    };

    match store
        .insert_participant(ParticipantEntity::from(participant.clone()))
        .await
    {
        Ok(()) => {}
        Err(StorageError::Conflict { .. }) => return Err(Rejection::DuplicateNickname.into()),
        Err(err) => {
            warn!(session_id = %session.id, error = %err, "failed to insert participant");
            return Err(err.into());
        }
    }

    let current = find_session(store.as_ref(), session.id).await?;
    if current.status != SessionStatus::Waiting {
        if let Err(err) = store.delete_participant(participant.id).await {
            warn!(participant_id = %participant.id, error = %err, "failed to withdraw late participant");
        }
        return Err(Rejection::LateJoin.into());
    }

    info!(
        session_id = %session.id,
        participant_id = %participant.id,
        nickname = %participant.nickname,
        "participant joined"
    );
    state.hubs().publish(
        session.id,
        SessionNotification::ParticipantJoined {
            participant_id: participant.id,
        },
    );

    Ok(JoinResponse {
        participant: ParticipantSummary::from(&participant),
        session: SessionSummary::new(&current, ClockReading::at(&current, state.now())),
    })
}

/// Remove a participant from a lobby. Only the player themself or the host may do it, and
/// only while the session is waiting.
pub async fn leave(
    state: &SharedState,
    session_id: Uuid,
    participant_id: Uuid,
    caller: Option<Uuid>,
) -> Result<(), ServiceError> {
    let store = state.require_quiz_store().await?;
    let session = find_session(store.as_ref(), session_id).await?;

    let participant: Participant = store
        .find_participant(participant_id)
        .await?
        .filter(|participant| participant.session_id == session_id)
        .map(Into::into)
        .ok_or_else(|| {
            ServiceError::NotFound(format!("participant `{participant_id}` not found"))
        })?;

    let is_self = caller.is_some() && participant.user_id == caller;
    if !is_self && !session.is_host(caller) {
        return Err(ServiceError::Forbidden(
            "only the player or the host can remove a participant".into(),
        ));
    }
    if clock::phase(&session, state.now()) != SessionPhase::Waiting {
        return Err(ServiceError::InvalidState(
            "players can only leave before the game starts".into(),
        ));
    }

    if store.delete_participant(participant_id).await? {
        info!(session_id = %session_id, participant_id = %participant_id, "participant left");
        state
            .hubs()
            .publish(session_id, SessionNotification::ParticipantLeft { participant_id });
    }
    Ok(())
}

/// Completion progress of every participant, recomputed from the response log.
pub async fn progress(state: &SharedState, session_id: Uuid) -> Result<ProgressResponse, ServiceError> {
    let store = state.require_quiz_store().await?;
    let board = SessionBoard::load(store.as_ref(), session_id).await?;
    Ok(progress_of(&board))
}

/// Progress entries ordered by completion, then score, then join order.
pub fn progress_of(board: &SessionBoard) -> ProgressResponse {
    let tallies = board.tallies();
    let total_questions = board.total_questions();
    let entries = rank_progress(&board.participants, &tallies, total_questions);

    ProgressResponse {
        session_id: board.session.id,
        total_questions,
        entries,
        is_final: board.is_final(),
    }
}

fn rank_progress(
    participants: &[Participant],
    tallies: &HashMap<Uuid, Tally>,
    total_questions: u32,
) -> Vec<ProgressEntry> {
    let mut ordered: Vec<(&Participant, Tally)> = participants
        .iter()
        .map(|participant| {
            let tally = tallies.get(&participant.id).copied().unwrap_or_default();
            (participant, tally)
        })
        .collect();
    ordered.sort_by_key(|(participant, tally)| {
        (
            Reverse(tally.completed),
            Reverse(tally.points),
            participant.join_seq,
        )
    });

    ordered
        .into_iter()
        .map(|(participant, tally)| ProgressEntry {
            participant_id: participant.id,
            nickname: participant.nickname.clone(),
            completed: tally.completed,
            total_questions,
            progress: fraction(tally.completed, total_questions),
            score: tally.points,
        })
        .collect()
}

fn fraction(completed: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    f64::from(completed.min(total)) / f64::from(total)
}
