//! Live session views streamed to clients.
//!
//! Each open view is owned by exactly one task. The task holds the hub subscription, the
//! clock tick and the polling fallback, and tears all of them down together when the client
//! goes away. Notifications only trigger a re-read of the authoritative rows, so duplicated,
//! reordered or missed notifications all converge on the same output.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::SystemTime,
};

use serde::Serialize;
use tokio::{
    sync::{
        broadcast::{self, error::RecvError, error::TryRecvError},
        mpsc,
    },
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        session::ClockSnapshot,
        sse::{Handshake, ServerEvent, SessionGoneEvent, SystemStatus},
    },
    error::ServiceError,
    services::{
        results_service::leaderboard_of,
        roster_service::progress_of,
        session_board::{SessionBoard, find_session},
        session_service::{fire_timer_expiry, session_view},
        sse_service::VIEW_CHANNEL_CAPACITY,
    },
    state::{
        SessionNotification, SharedState,
        clock::{self, ClockReading},
        game::GameSession,
        state_machine::SessionPhase,
    },
};

pub const EVENT_HANDSHAKE: &str = "handshake";
pub const EVENT_SESSION: &str = "session";
pub const EVENT_PROGRESS: &str = "progress";
pub const EVENT_CLOCK: &str = "clock";
pub const EVENT_RESULTS: &str = "results";
pub const EVENT_SYSTEM_STATUS: &str = "system_status";
pub const EVENT_GONE: &str = "gone";

/// Open a view on `session_id` and return the channel its events are written to.
pub async fn open(
    state: &SharedState,
    session_id: Uuid,
) -> Result<mpsc::Receiver<ServerEvent>, ServiceError> {
    let store = state.require_quiz_store().await?;
    find_session(store.as_ref(), session_id).await?;

    let (tx, rx) = mpsc::channel(VIEW_CHANNEL_CAPACITY);
    let notifications = state.hubs().subscribe(session_id);
    let view = SessionViewTask::new(state.clone(), session_id, tx);
    tokio::spawn(view.run(notifications));
    info!(session_id = %session_id, "session view opened");
    Ok(rx)
}

/// Last payloads sent, so unchanged snapshots are not re-sent.
#[derive(Default)]
struct Sent {
    session: Option<String>,
    progress: Option<String>,
    clock: Option<(SessionPhase, u64, Option<u64>)>,
    results: Option<String>,
}

struct SessionViewTask {
    state: SharedState,
    session_id: Uuid,
    tx: mpsc::Sender<ServerEvent>,
    disposed: AtomicBool,
    snapshot: Option<GameSession>,
    sent: Sent,
    expiry_fired: bool,
    gone: bool,
}

impl SessionViewTask {
    fn new(state: SharedState, session_id: Uuid, tx: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            state,
            session_id,
            tx,
            disposed: AtomicBool::new(false),
            snapshot: None,
            sent: Sent::default(),
            expiry_fired: false,
            gone: false,
        }
    }

    async fn run(mut self, mut notifications: broadcast::Receiver<SessionNotification>) {
        let config = self.state.config();
        let mut tick = interval(config.view_tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut poll = interval(config.view_poll);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut degraded = self.state.degraded_watcher();

        let handshake = Handshake {
            session_id: self.session_id,
            degraded: *degraded.borrow_and_update(),
        };
        self.emit(EVENT_HANDSHAKE, &handshake).await;
        self.refresh().await;

        while !self.is_disposed() && !self.gone {
            tokio::select! {
                _ = self.tx.closed() => break,
                _ = tick.tick() => self.on_tick().await,
                _ = poll.tick() => self.refresh().await,
                received = notifications.recv() => match received {
                    Ok(_) => {
                        drain(&mut notifications);
                        self.refresh().await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(session_id = %self.session_id, skipped, "session view lagged; re-reading");
                        self.refresh().await;
                    }
                    Err(RecvError::Closed) => break,
                },
                changed = degraded.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let is_degraded = *degraded.borrow_and_update();
                    self.emit(EVENT_SYSTEM_STATUS, &SystemStatus { degraded: is_degraded }).await;
                    if !is_degraded {
                        self.refresh().await;
                    }
                }
            }
        }

        self.disposed.store(true, Ordering::SeqCst);
        drop(notifications);
        self.state.hubs().release(self.session_id);
        info!(session_id = %self.session_id, "session view closed");
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Send `payload` unless the view was torn down. A closed channel disposes the view.
    async fn emit<T: Serialize>(&self, name: &str, payload: &T) {
        if self.is_disposed() {
            return;
        }
        match ServerEvent::json(Some(name.to_owned()), payload) {
            Ok(event) => {
                if self.tx.send(event).await.is_err() {
                    self.disposed.store(true, Ordering::SeqCst);
                }
            }
            Err(err) => warn!(session_id = %self.session_id, error = %err, event = name, "failed to serialise view event"),
        }
    }

    /// Send `payload` under `name` when its JSON differs from `last`, the payload sent before.
    async fn emit_changed<T: Serialize>(&self, name: &str, payload: &T, last: &mut Option<String>) {
        let Ok(json) = serde_json::to_string(payload) else {
            return;
        };
        if last.as_deref() == Some(json.as_str()) {
            return;
        }
        if self.is_disposed() {
            return;
        }
        if self
            .tx
            .send(ServerEvent {
                event: Some(name.to_owned()),
                data: json.clone(),
            })
            .await
            .is_err()
        {
            self.disposed.store(true, Ordering::SeqCst);
            return;
        }
        *last = Some(json);
    }

    /// Re-read the board and push whatever changed.
    async fn refresh(&mut self) {
        let Some(store) = self.state.quiz_store().await else {
            return;
        };
        let board = match SessionBoard::load(store.as_ref(), self.session_id).await {
            Ok(board) => board,
            Err(ServiceError::NotFound(message)) => {
                self.emit(
                    EVENT_GONE,
                    &SessionGoneEvent {
                        session_id: self.session_id,
                        message,
                    },
                )
                .await;
                self.gone = true;
                return;
            }
            Err(err) => {
                debug!(session_id = %self.session_id, error = %err, "session view refresh failed");
                return;
            }
        };
        if self.is_disposed() {
            return;
        }

        let now = self.state.now();
        let mut view = session_view(&board, now);
        view.session = view.session.without_clock();

        let mut sent = std::mem::take(&mut self.sent);
        self.emit_changed(EVENT_SESSION, &view, &mut sent.session).await;
        self.emit_changed(EVENT_PROGRESS, &progress_of(&board), &mut sent.progress)
            .await;
        if board.is_final() {
            self.emit_changed(EVENT_RESULTS, &leaderboard_of(&board), &mut sent.results)
                .await;
        }
        self.sent = sent;

        self.snapshot = Some(board.session);
        self.on_tick().await;
    }

    /// Recompute the clock from the cached row and fire the expiry when it reaches zero.
    async fn on_tick(&mut self) {
        let Some(session) = self.snapshot.clone() else {
            return;
        };
        let now = self.state.now();
        let reading = ClockReading::at(&session, now);

        let key = (
            reading.phase,
            reading.countdown_remaining_secs,
            reading.time_remaining_secs,
        );
        if self.sent.clock != Some(key) {
            self.emit(EVENT_CLOCK, &ClockSnapshot::from(reading)).await;
            self.sent.clock = Some(key);
        }

        if should_fire_expiry(&session, reading.phase, now) && !self.expiry_fired {
            self.expiry_fired = true;
            match fire_timer_expiry(&self.state, self.session_id).await {
                Ok(outcome) => {
                    debug!(session_id = %self.session_id, applied = outcome.was_applied(), "timer expiry reported");
                    self.snapshot = Some(outcome.into_session());
                }
                Err(err) => {
                    warn!(session_id = %self.session_id, error = %err, "failed to end expired session; retrying next tick");
                    self.expiry_fired = false;
                }
            }
        }
    }
}

/// Whether a timed session in play has run out of time.
fn should_fire_expiry(session: &GameSession, phase: SessionPhase, now: SystemTime) -> bool {
    phase == SessionPhase::Active && clock::is_expired(session, now)
}

/// Collapse a burst of queued notifications into the single re-read that follows.
fn drain(notifications: &mut broadcast::Receiver<SessionNotification>) {
    loop {
        match notifications.try_recv() {
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::quiz_store::{QuizStore, memory::MemoryQuizStore},
        state::{
            AppState,
            clock::ManualTimeSource,
            state_machine::{SessionMode, SessionStatus},
        },
    };

    #[test]
    fn expiry_only_fires_for_active_expired_sessions() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let mut session = GameSession::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "123456".into(),
            SessionMode::HostedMultiplayer,
            start,
        );
        session.status = SessionStatus::Active;
        session.total_time_minutes = Some(1);
        session.countdown_started_at = Some(start);
        session.started_at = Some(start);

        let before = start + Duration::from_secs(59);
        let after = start + Duration::from_secs(60);
        assert!(!should_fire_expiry(&session, clock::phase(&session, before), before));
        assert!(should_fire_expiry(&session, clock::phase(&session, after), after));

        session.total_time_minutes = None;
        assert!(!should_fire_expiry(&session, clock::phase(&session, after), after));
    }

    #[tokio::test]
    async fn drain_empties_a_burst() {
        let (tx, mut rx) = broadcast::channel(8);
        for _ in 0..5 {
            tx.send(SessionNotification::SessionUpdated).expect("receiver alive");
        }
        drain(&mut rx);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn failed_expiry_report_is_retried_on_the_next_tick() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let clock = Arc::new(ManualTimeSource::new(start + Duration::from_secs(61)));
        let state = AppState::with_time_source(AppConfig::default(), clock);

        let mut session = GameSession::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "123456".into(),
            SessionMode::HostedMultiplayer,
            start,
        );
        session.status = SessionStatus::Active;
        session.total_time_minutes = Some(1);
        session.countdown_started_at = Some(start);
        session.started_at = Some(start);

        let (tx, _rx) = mpsc::channel(VIEW_CHANNEL_CAPACITY);
        let mut view = SessionViewTask::new(state.clone(), session.id, tx);
        view.snapshot = Some(session.clone());

        // No store installed yet: the report fails and must not be latched.
        view.on_tick().await;
        assert!(!view.expiry_fired);

        let store = MemoryQuizStore::new();
        store
            .insert_session(session.clone().into())
            .await
            .expect("session stored");
        state.set_quiz_store(Arc::new(store)).await;

        view.on_tick().await;
        assert!(view.expiry_fired);
        let ended = view.snapshot.expect("snapshot kept");
        assert_eq!(ended.status, SessionStatus::Finished);
    }
}
