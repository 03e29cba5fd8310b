//! Derived session time.
//!
//! Nothing here ticks. Every value is recomputed from the two stored timestamps of a session
//! (`countdown_started_at`, `started_at`) and the configured duration, so any observer asking at
//! the same instant gets the same answer.

use std::{
    sync::Mutex,
    time::{Duration, SystemTime},
};

use crate::state::{
    game::GameSession,
    state_machine::{SessionPhase, SessionStatus},
};

/// Source of "now" shared by every service.
pub trait TimeSource: Send + Sync {
    /// Current wall-clock instant.
    fn now(&self) -> SystemTime;
}

/// Reads the operating system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Manually driven clock used by tests to step through a session deterministically.
#[derive(Debug)]
pub struct ManualTimeSource {
    now: Mutex<SystemTime>,
}

impl ManualTimeSource {
    /// Start the clock at `start`.
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard += by;
    }

    /// Jump to an absolute instant.
    pub fn set(&self, at: SystemTime) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = at;
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Configured session-wide budget, `None` when untimed.
pub fn total_duration(session: &GameSession) -> Option<Duration> {
    session
        .total_time_minutes
        .map(|minutes| Duration::from_secs(u64::from(minutes) * 60))
}

/// Time left before active play starts. Zero once `started_at` has passed or before any
/// countdown was requested.
pub fn countdown_remaining(session: &GameSession, now: SystemTime) -> Duration {
    match (session.countdown_started_at, session.started_at) {
        (Some(_), Some(started_at)) => started_at.duration_since(now).unwrap_or(Duration::ZERO),
        _ => Duration::ZERO,
    }
}

/// Time left in a timed session: `max(0, started_at + total - now)`.
///
/// Returns `None` for untimed sessions. When `now` is earlier than `started_at` (the session has
/// not begun yet, or the observer's clock lags) the full duration is reported instead of a
/// value larger than the budget.
pub fn time_remaining(session: &GameSession, now: SystemTime) -> Option<Duration> {
    let total = total_duration(session)?;
    let Some(started_at) = session.started_at else {
        return Some(total);
    };

    match now.duration_since(started_at) {
        Ok(elapsed) => Some(total.saturating_sub(elapsed)),
        Err(_) => Some(total),
    }
}

/// Instant at which a timed session runs out, if it is timed and scheduled.
pub fn deadline(session: &GameSession) -> Option<SystemTime> {
    Some(session.started_at? + total_duration(session)?)
}

/// Whether the session-wide clock reached zero.
pub fn is_expired(session: &GameSession, now: SystemTime) -> bool {
    session.started_at.is_some() && time_remaining(session, now) == Some(Duration::ZERO)
}

/// Derive the observable phase from the stored status and timestamps.
pub fn phase(session: &GameSession, now: SystemTime) -> SessionPhase {
    match session.status {
        SessionStatus::Waiting => SessionPhase::Waiting,
        SessionStatus::Finished => SessionPhase::Finished,
        SessionStatus::Active => match session.started_at {
            Some(started_at) if now < started_at => SessionPhase::CountingDown,
            _ => SessionPhase::Active,
        },
    }
}

/// Whole seconds for display, rounded up so a client never shows 0 while time remains.
pub fn ceil_secs(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis().div_ceil(1000)).unwrap_or(u64::MAX)
}

/// Everything a client needs to render timers at `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockReading {
    /// Instant the reading was taken.
    pub now: SystemTime,
    /// Derived phase.
    pub phase: SessionPhase,
    /// Countdown left before play, rounded up to seconds.
    pub countdown_remaining_secs: u64,
    /// Session time left rounded up to seconds, `None` when untimed.
    pub time_remaining_secs: Option<u64>,
}

impl ClockReading {
    /// Read the clock of `session` at `now`.
    pub fn at(session: &GameSession, now: SystemTime) -> Self {
        let phase = phase(session, now);
        let time_remaining_secs = match phase {
            SessionPhase::Finished => total_duration(session).map(|_| 0),
            _ => time_remaining(session, now).map(ceil_secs),
        };

        Self {
            now,
            phase,
            countdown_remaining_secs: ceil_secs(countdown_remaining(session, now)),
            time_remaining_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::state::state_machine::SessionMode;

    fn timed_session(start: SystemTime, minutes: u32) -> GameSession {
        GameSession {
            id: Uuid::new_v4(),
            quiz_id: Uuid::new_v4(),
            host_id: Uuid::new_v4(),
            access_pin: "123456".into(),
            mode: SessionMode::HostedMultiplayer,
            status: SessionStatus::Active,
            total_time_minutes: Some(minutes),
            countdown_started_at: Some(start - Duration::from_secs(10)),
            started_at: Some(start),
            ended_at: None,
            created_at: start - Duration::from_secs(60),
        }
    }

    #[test]
    fn remaining_rounds_up_to_the_second() {
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let session = timed_session(t, 5);

        let at_299 = time_remaining(&session, t + Duration::from_secs(299)).unwrap();
        assert_eq!(ceil_secs(at_299), 1);

        let at_300 = time_remaining(&session, t + Duration::from_secs(300)).unwrap();
        assert_eq!(ceil_secs(at_300), 0);

        let later = time_remaining(&session, t + Duration::from_secs(900)).unwrap();
        assert_eq!(later, Duration::ZERO);
    }

    #[test]
    fn lagging_observer_sees_full_duration() {
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let session = timed_session(t, 5);
        let early = time_remaining(&session, t - Duration::from_secs(3)).unwrap();
        assert_eq!(early, Duration::from_secs(300));
    }

    #[test]
    fn untimed_session_has_no_remaining_time() {
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let mut session = timed_session(t, 5);
        session.total_time_minutes = None;
        assert_eq!(time_remaining(&session, t), None);
        assert!(!is_expired(&session, t + Duration::from_secs(3600)));
    }

    #[test]
    fn phase_distinguishes_countdown_from_play() {
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let session = timed_session(t, 5);

        assert_eq!(
            phase(&session, t - Duration::from_secs(4)),
            SessionPhase::CountingDown
        );
        assert_eq!(
            ceil_secs(countdown_remaining(&session, t - Duration::from_millis(4_200))),
            5
        );
        assert_eq!(phase(&session, t), SessionPhase::Active);
        assert_eq!(countdown_remaining(&session, t), Duration::ZERO);
    }

    #[test]
    fn manual_source_advances() {
        let t = SystemTime::UNIX_EPOCH;
        let source = ManualTimeSource::new(t);
        source.advance(Duration::from_secs(2));
        assert_eq!(source.now(), t + Duration::from_secs(2));
        source.set(t);
        assert_eq!(source.now(), t);
    }
}
