use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::{
    dao::{
        models::{SessionModeEntity, SessionStatusEntity},
        quiz_store::{SessionGuard, SessionPatch},
    },
    state::{clock, game::GameSession},
};

/// How a session is played. Guards on join and end depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// A host drives start and end for every joined player.
    HostedMultiplayer,
    /// One player, self-paced, with per-question time limits.
    SoloTimed,
    /// One player, self-paced, no timers.
    PracticeUntimed,
}

impl SessionMode {
    /// Whether players join through the roster. Self-paced modes get a single implicit
    /// participant instead.
    pub fn uses_roster(self) -> bool {
        matches!(self, SessionMode::HostedMultiplayer)
    }

    /// Whether one player plays alone at their own pace.
    pub fn is_self_paced(self) -> bool {
        !self.uses_roster()
    }
}

/// Status as stored on the session row. It only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Lobby, no countdown requested.
    Waiting,
    /// Countdown requested; play starts at `started_at`.
    Active,
    /// Terminal.
    Finished,
}

/// Phase observed by clients, derived from status and timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Lobby.
    Waiting,
    /// `countdown_started_at` set, `started_at` still in the future.
    CountingDown,
    /// Play in progress.
    Active,
    /// Terminal.
    Finished,
}

/// Why a session was finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The session-wide clock reached zero.
    TimerExpired,
    /// The host ended the game explicitly.
    HostAborted,
    /// The single player of a self-paced session answered the last question.
    PlayerCompleted,
    /// Every participant of a hosted session answered every question.
    AllAnswered,
}

/// Events accepted by the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Host asks to begin the countdown with the given session budget.
    StartCountdown {
        /// Session-wide budget in minutes, `None` for untimed play.
        total_time_minutes: Option<u32>,
    },
    /// Finish the session.
    EndSession(EndReason),
}

/// Error returned when an event cannot be applied from the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// Phase the session was in.
    pub from: SessionPhase,
    /// Rejected event.
    pub event: SessionEvent,
}

/// Errors raised while planning a transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// The event is not valid from the current phase.
    #[error(transparent)]
    InvalidTransition(InvalidTransition),
    /// A timer-driven end was requested while time remains.
    #[error("session clock has not expired yet")]
    ClockRunning,
    /// The end reason does not apply to this session mode.
    #[error("{reason:?} does not apply to {mode:?} sessions")]
    WrongMode {
        /// Mode of the session.
        mode: SessionMode,
        /// Rejected reason.
        reason: EndReason,
    },
}

/// A validated transition ready to be written with one conditional update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Phase observed when planning.
    pub from: SessionPhase,
    /// Phase the session will be in once the patch lands.
    pub to: SessionPhase,
    /// Event that produced the plan.
    pub event: SessionEvent,
    /// Precondition the stored row must still satisfy.
    pub guard: SessionGuard,
    /// Columns to write.
    pub patch: SessionPatch,
}

/// Outcome of planning an event against a session snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Write the transition.
    Apply(Transition),
    /// The event already took effect; nothing to write.
    AlreadyApplied {
        /// Current phase.
        phase: SessionPhase,
    },
}

/// Stateless planner for session transitions, parameterised by countdown lengths.
#[derive(Debug, Clone, Copy)]
pub struct SessionStateMachine {
    hosted_countdown: Duration,
    solo_countdown: Duration,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(5))
    }
}

impl SessionStateMachine {
    /// Build a planner with the given pre-game countdown lengths.
    pub fn new(hosted_countdown: Duration, solo_countdown: Duration) -> Self {
        Self {
            hosted_countdown,
            solo_countdown,
        }
    }

    /// Countdown length used for `mode`.
    pub fn countdown_for(&self, mode: SessionMode) -> Duration {
        match mode {
            SessionMode::HostedMultiplayer => self.hosted_countdown,
            SessionMode::SoloTimed | SessionMode::PracticeUntimed => self.solo_countdown,
        }
    }

    /// Validate `event` against `session` as observed at `now`.
    pub fn plan(
        &self,
        session: &GameSession,
        event: SessionEvent,
        now: SystemTime,
    ) -> Result<Plan, PlanError> {
        let from = clock::phase(session, now);
        let invalid = || PlanError::InvalidTransition(InvalidTransition { from, event });

        match event {
            SessionEvent::StartCountdown { total_time_minutes } => match from {
                SessionPhase::Waiting => {
                    let started_at = now + self.countdown_for(session.mode);
                    Ok(Plan::Apply(Transition {
                        from,
                        to: SessionPhase::CountingDown,
                        event,
                        guard: SessionGuard::status_in(&[SessionStatusEntity::Waiting])
                            .with_countdown_unset(),
                        patch: SessionPatch {
                            status: Some(SessionStatusEntity::Active),
                            total_time_minutes: Some(total_time_minutes),
                            countdown_started_at: Some(now),
                            started_at: Some(started_at),
                            ..SessionPatch::default()
                        },
                    }))
                }
                SessionPhase::CountingDown | SessionPhase::Active => {
                    Ok(Plan::AlreadyApplied { phase: from })
                }
                SessionPhase::Finished => Err(invalid()),
            },
            SessionEvent::EndSession(reason) => {
                if from == SessionPhase::Finished {
                    return Ok(Plan::AlreadyApplied { phase: from });
                }

                let allowed_from: &[SessionStatusEntity] = match reason {
                    // Hosts may abort from the lobby and during the countdown too.
                    EndReason::HostAborted => {
                        &[SessionStatusEntity::Waiting, SessionStatusEntity::Active]
                    }
                    EndReason::TimerExpired => {
                        if from != SessionPhase::Active {
                            return Err(invalid());
                        }
                        if !clock::is_expired(session, now) {
                            return Err(PlanError::ClockRunning);
                        }
                        &[SessionStatusEntity::Active]
                    }
                    EndReason::PlayerCompleted | EndReason::AllAnswered => {
                        let mode_fits = match reason {
                            EndReason::PlayerCompleted => session.mode.is_self_paced(),
                            _ => session.mode.uses_roster(),
                        };
                        if !mode_fits {
                            return Err(PlanError::WrongMode {
                                mode: session.mode,
                                reason,
                            });
                        }
                        if from != SessionPhase::Active {
                            return Err(invalid());
                        }
                        &[SessionStatusEntity::Active]
                    }
                };

                // Play never began when aborted mid-countdown; pull the start back to the end.
                let started_at = (from == SessionPhase::CountingDown).then_some(now);
                Ok(Plan::Apply(Transition {
                    from,
                    to: SessionPhase::Finished,
                    event,
                    guard: SessionGuard::status_in(allowed_from),
                    patch: SessionPatch {
                        status: Some(SessionStatusEntity::Finished),
                        started_at,
                        ended_at: Some(now),
                        ..SessionPatch::default()
                    },
                }))
            }
        }
    }
}

impl From<SessionModeEntity> for SessionMode {
    fn from(value: SessionModeEntity) -> Self {
        match value {
            SessionModeEntity::HostedMultiplayer => SessionMode::HostedMultiplayer,
            SessionModeEntity::SoloTimed => SessionMode::SoloTimed,
            SessionModeEntity::PracticeUntimed => SessionMode::PracticeUntimed,
        }
    }
}

impl From<SessionMode> for SessionModeEntity {
    fn from(value: SessionMode) -> Self {
        match value {
            SessionMode::HostedMultiplayer => SessionModeEntity::HostedMultiplayer,
            SessionMode::SoloTimed => SessionModeEntity::SoloTimed,
            SessionMode::PracticeUntimed => SessionModeEntity::PracticeUntimed,
        }
    }
}

impl From<SessionStatusEntity> for SessionStatus {
    fn from(value: SessionStatusEntity) -> Self {
        match value {
            SessionStatusEntity::Waiting => SessionStatus::Waiting,
            SessionStatusEntity::Active => SessionStatus::Active,
            SessionStatusEntity::Finished => SessionStatus::Finished,
        }
    }
}

impl From<SessionStatus> for SessionStatusEntity {
    fn from(value: SessionStatus) -> Self {
        match value {
            SessionStatus::Waiting => SessionStatusEntity::Waiting,
            SessionStatus::Active => SessionStatusEntity::Active,
            SessionStatus::Finished => SessionStatusEntity::Finished,
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::dao::models::GameSessionEntity;

    fn t0() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    fn waiting(mode: SessionMode) -> GameSession {
        GameSession {
            id: Uuid::new_v4(),
            quiz_id: Uuid::new_v4(),
            host_id: Uuid::new_v4(),
            access_pin: "123456".into(),
            mode,
            status: SessionStatus::Waiting,
            total_time_minutes: None,
            countdown_started_at: None,
            started_at: None,
            ended_at: None,
            created_at: t0(),
        }
    }

    fn apply(session: &mut GameSession, plan: Plan) {
        let Plan::Apply(transition) = plan else {
            panic!("expected a transition");
        };
        let mut row: GameSessionEntity = session.clone().into();
        assert!(transition.guard.matches(&row));
        transition.patch.apply_to(&mut row);
        *session = row.into();
    }

    #[test]
    fn start_countdown_sets_both_timestamps_at_once() {
        let sm = SessionStateMachine::default();
        let mut session = waiting(SessionMode::HostedMultiplayer);
        let plan = sm
            .plan(
                &session,
                SessionEvent::StartCountdown {
                    total_time_minutes: Some(5),
                },
                t0(),
            )
            .unwrap();
        apply(&mut session, plan);

        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.countdown_started_at, Some(t0()));
        assert_eq!(session.started_at, Some(t0() + Duration::from_secs(10)));
        assert_eq!(session.total_time_minutes, Some(5));
        assert_eq!(clock::phase(&session, t0()), SessionPhase::CountingDown);
    }

    #[test]
    fn start_countdown_twice_does_not_restart_the_clock() {
        let sm = SessionStateMachine::default();
        let mut session = waiting(SessionMode::SoloTimed);
        let event = SessionEvent::StartCountdown {
            total_time_minutes: None,
        };
        let plan = sm.plan(&session, event, t0()).unwrap();
        apply(&mut session, plan);
        assert_eq!(session.started_at, Some(t0() + Duration::from_secs(5)));

        let later = t0() + Duration::from_secs(2);
        assert_eq!(
            sm.plan(&session, event, later).unwrap(),
            Plan::AlreadyApplied {
                phase: SessionPhase::CountingDown
            }
        );
    }

    #[test]
    fn end_is_a_no_op_once_finished() {
        let sm = SessionStateMachine::default();
        let mut session = waiting(SessionMode::HostedMultiplayer);
        let end = SessionEvent::EndSession(EndReason::HostAborted);
        let plan = sm.plan(&session, end, t0()).unwrap();
        apply(&mut session, plan);
        assert_eq!(session.ended_at, Some(t0()));

        let again = sm
            .plan(&session, end, t0() + Duration::from_secs(1))
            .unwrap();
        assert_eq!(
            again,
            Plan::AlreadyApplied {
                phase: SessionPhase::Finished
            }
        );

        let start = sm.plan(
            &session,
            SessionEvent::StartCountdown {
                total_time_minutes: Some(1),
            },
            t0(),
        );
        assert!(matches!(start, Err(PlanError::InvalidTransition(_))));
    }

    #[test]
    fn abort_during_countdown_keeps_timestamps_ordered() {
        let sm = SessionStateMachine::default();
        let mut session = waiting(SessionMode::HostedMultiplayer);
        let plan = sm.plan(
            &session,
            SessionEvent::StartCountdown {
                total_time_minutes: Some(5),
            },
            t0(),
        )
        .unwrap();
        apply(&mut session, plan);

        let aborted_at = t0() + Duration::from_secs(2);
        let plan = sm.plan(
            &session,
            SessionEvent::EndSession(EndReason::HostAborted),
            aborted_at,
        )
        .unwrap();
        apply(&mut session, plan);

        assert_eq!(session.status, SessionStatus::Finished);
        assert_eq!(session.countdown_started_at, Some(t0()));
        assert_eq!(session.started_at, Some(aborted_at));
        assert_eq!(session.ended_at, Some(aborted_at));
    }

    #[test]
    fn timer_end_requires_expired_clock() {
        let sm = SessionStateMachine::default();
        let mut session = waiting(SessionMode::HostedMultiplayer);
        let plan = sm.plan(
            &session,
            SessionEvent::StartCountdown {
                total_time_minutes: Some(1),
            },
            t0(),
        )
        .unwrap();
        apply(&mut session, plan);
        let expired = SessionEvent::EndSession(EndReason::TimerExpired);

        let mid_game = t0() + Duration::from_secs(40);
        assert_eq!(
            sm.plan(&session, expired, mid_game),
            Err(PlanError::ClockRunning)
        );

        let after = t0() + Duration::from_secs(70);
        assert!(matches!(
            sm.plan(&session, expired, after),
            Ok(Plan::Apply(_))
        ));
    }

    #[test]
    fn completion_reasons_are_mode_specific() {
        let sm = SessionStateMachine::default();
        let mut hosted = waiting(SessionMode::HostedMultiplayer);
        hosted.status = SessionStatus::Active;
        hosted.started_at = Some(t0());
        let err = sm
            .plan(
                &hosted,
                SessionEvent::EndSession(EndReason::PlayerCompleted),
                t0(),
            )
            .unwrap_err();
        assert!(matches!(err, PlanError::WrongMode { .. }));

        let mut solo = waiting(SessionMode::PracticeUntimed);
        let err = sm
            .plan(&solo, SessionEvent::EndSession(EndReason::PlayerCompleted), t0())
            .unwrap_err();
        assert!(matches!(err, PlanError::InvalidTransition(_)));

        solo.status = SessionStatus::Active;
        solo.started_at = Some(t0());
        assert!(matches!(
            sm.plan(&solo, SessionEvent::EndSession(EndReason::PlayerCompleted), t0()),
            Ok(Plan::Apply(_))
        ));
    }
}
