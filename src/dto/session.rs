use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::{format_system_time, roster::ParticipantSummary, validation::validate_nickname},
    state::{
        clock::ClockReading,
        game::GameSession,
        state_machine::{EndReason, SessionMode, SessionPhase, SessionStatus},
    },
};

/// Payload used to open a new session on a quiz.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    /// Quiz to play.
    pub quiz_id: Uuid,
    /// Game mode; hosted multiplayer when omitted.
    #[serde(default = "default_mode")]
    pub mode: SessionMode,
    /// Nickname of the implicit player in solo and practice sessions.
    #[serde(default)]
    pub nickname: Option<String>,
}

impl Validate for CreateSessionRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(ref nickname) = self.nickname
            && let Err(e) = validate_nickname(nickname)
        {
            errors.add("nickname", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn default_mode() -> SessionMode {
    SessionMode::HostedMultiplayer
}

/// Response returned after creating a session.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateSessionResponse {
    pub session: SessionSummary,
    /// Implicit player of a self-paced session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant: Option<ParticipantSummary>,
}

/// Session row as exposed to clients, with the clock read at response time.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SessionSummary {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub host_id: Uuid,
    pub access_pin: String,
    pub mode: SessionMode,
    pub status: SessionStatus,
    pub phase: SessionPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_time_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countdown_started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    pub created_at: String,
    pub clock: ClockSnapshot,
}

impl SessionSummary {
    /// Project `session` with its clock read as `reading`.
    pub fn new(session: &GameSession, reading: ClockReading) -> Self {
        Self {
            id: session.id,
            quiz_id: session.quiz_id,
            host_id: session.host_id,
            access_pin: session.access_pin.clone(),
            mode: session.mode,
            status: session.status,
            phase: reading.phase,
            total_time_minutes: session.total_time_minutes,
            countdown_started_at: session.countdown_started_at.map(format_system_time),
            started_at: session.started_at.map(format_system_time),
            ended_at: session.ended_at.map(format_system_time),
            created_at: format_system_time(session.created_at),
            clock: reading.into(),
        }
    }

    /// Same as [`SessionSummary::new`] without the clock, for change detection.
    pub fn without_clock(&self) -> Self {
        Self {
            clock: ClockSnapshot::default(),
            ..self.clone()
        }
    }
}

/// Clock values derived from the stored timestamps. Clients recompute locally between
/// snapshots; `server_time` lets them estimate their own skew.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ClockSnapshot {
    pub server_time: String,
    pub phase: Option<SessionPhase>,
    pub countdown_remaining_secs: u64,
    /// `None` when the session is untimed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_remaining_secs: Option<u64>,
}

impl From<ClockReading> for ClockSnapshot {
    fn from(reading: ClockReading) -> Self {
        Self {
            server_time: format_system_time(reading.now),
            phase: Some(reading.phase),
            countdown_remaining_secs: reading.countdown_remaining_secs,
            time_remaining_secs: reading.time_remaining_secs,
        }
    }
}

/// Session with its current roster.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SessionView {
    pub session: SessionSummary,
    pub participants: Vec<ParticipantSummary>,
}

/// Body of `POST /sessions/{id}/start`.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct StartSessionRequest {
    /// Session budget in minutes; omit for untimed play.
    #[validate(range(min = 1))]
    #[serde(default)]
    pub total_time_minutes: Option<u32>,
}

/// Body of `POST /sessions/{id}/end`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct EndSessionRequest {
    /// Defaults to a host abort.
    #[serde(default)]
    pub reason: Option<EndReason>,
}

/// What a player sees after typing a PIN, before picking a nickname.
#[derive(Debug, Serialize, ToSchema)]
pub struct PinLookupResponse {
    pub session_id: Uuid,
    pub mode: SessionMode,
    pub phase: SessionPhase,
    pub quiz_title: String,
}
