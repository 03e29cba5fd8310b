pub mod clock;
pub mod game;
mod sse;
pub mod state_machine;
pub mod transitions;

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::quiz_store::{QuizStore, UpdateOutcome},
    error::ServiceError,
    state::{
        clock::{SystemTimeSource, TimeSource},
        game::GameSession,
        state_machine::{Plan, SessionEvent, SessionPhase, SessionStateMachine},
    },
};

pub use self::sse::{SessionHub, SessionHubs, SessionNotification};

pub type SharedState = Arc<AppState>;
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);
/// Conditional updates retried after losing a race before giving up.
const MAX_TRANSITION_ATTEMPTS: usize = 4;
const SESSION_HUB_CAPACITY: usize = 64;

/// Result of running a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The patch was written.
    Applied {
        /// Row after the update.
        session: GameSession,
        /// Phase before.
        from: SessionPhase,
        /// Phase after.
        to: SessionPhase,
    },
    /// The event had already taken effect; nothing was written.
    Unchanged {
        /// Row as stored.
        session: GameSession,
    },
}

impl TransitionOutcome {
    /// Session row after the call.
    pub fn session(&self) -> &GameSession {
        match self {
            TransitionOutcome::Applied { session, .. } | TransitionOutcome::Unchanged { session } => {
                session
            }
        }
    }

    /// Consume the outcome and keep the row.
    pub fn into_session(self) -> GameSession {
        match self {
            TransitionOutcome::Applied { session, .. } | TransitionOutcome::Unchanged { session } => {
                session
            }
        }
    }

    /// Whether this call wrote the transition.
    pub fn was_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }
}

/// Central application state storing the store handle, notification hubs and configuration.
pub struct AppState {
    quiz_store: RwLock<Option<Arc<dyn QuizStore>>>,
    degraded: watch::Sender<bool>,
    config: AppConfig,
    time_source: Arc<dyn TimeSource>,
    machine: SessionStateMachine,
    hubs: SessionHubs,
    transition_gates: DashMap<Uuid, Arc<Mutex<()>>>,
    score_gates: DashMap<Uuid, Arc<Mutex<()>>>,
    transition_timeout: Option<Duration>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        Self::with_time_source(config, Arc::new(SystemTimeSource))
    }

    /// Same as [`AppState::new`] with an explicit clock.
    pub fn with_time_source(config: AppConfig, time_source: Arc<dyn TimeSource>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let machine = SessionStateMachine::new(config.hosted_countdown, config.solo_countdown);
        Arc::new(Self {
            quiz_store: RwLock::new(None),
            degraded: degraded_tx,
            config,
            time_source,
            machine,
            hubs: SessionHubs::new(SESSION_HUB_CAPACITY),
            transition_gates: DashMap::new(),
            score_gates: DashMap::new(),
            transition_timeout: Some(DEFAULT_TRANSITION_TIMEOUT),
        })
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn quiz_store(&self) -> Option<Arc<dyn QuizStore>> {
        let guard = self.quiz_store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the current store or fail with [`ServiceError::Degraded`].
    pub async fn require_quiz_store(&self) -> Result<Arc<dyn QuizStore>, ServiceError> {
        self.quiz_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn set_quiz_store(&self, store: Arc<dyn QuizStore>) {
        {
            let mut guard = self.quiz_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Current instant as seen by every service.
    pub fn now(&self) -> SystemTime {
        self.time_source.now()
    }

    /// Session transition planner.
    pub fn state_machine(&self) -> &SessionStateMachine {
        &self.machine
    }

    /// Per-session change notification hubs.
    pub fn hubs(&self) -> &SessionHubs {
        &self.hubs
    }

    fn transition_gate(&self, session_id: Uuid) -> Arc<Mutex<()>> {
        self.transition_gates
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Lock serialising response writes and score recomputation for one participant.
    pub fn score_gate(&self, participant_id: Uuid) -> Arc<Mutex<()>> {
        self.score_gates
            .entry(participant_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the score gate of `participant_id` once nobody else holds it.
    pub fn release_score_gate(&self, participant_id: Uuid) {
        self.score_gates
            .remove_if(&participant_id, |_, gate| Arc::strong_count(gate) <= 1);
    }

    /// Plan `event` against the stored session and write it with one conditional update.
    ///
    /// Calls for the same session are serialised in-process; across processes the store guard
    /// decides, and a caller that loses the race re-plans against the row that won.
    pub async fn run_transition(
        &self,
        session_id: Uuid,
        event: SessionEvent,
    ) -> Result<TransitionOutcome, ServiceError> {
        let gate = self.transition_gate(session_id);
        let guard = gate.lock().await;

        let work = self.plan_and_apply(session_id, event);
        let outcome = match self.transition_timeout {
            Some(limit) => match timeout(limit, work).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(session_id = %session_id, event = ?event, "session transition timed out");
                    Err(ServiceError::Timeout)
                }
            },
            None => work.await,
        };
        drop(guard);

        if matches!(&outcome, Ok(done) if done.session().ended_at.is_some()) {
            self.transition_gates
                .remove_if(&session_id, |_, gate| Arc::strong_count(gate) <= 2);
        }

        outcome
    }

    async fn plan_and_apply(
        &self,
        session_id: Uuid,
        event: SessionEvent,
    ) -> Result<TransitionOutcome, ServiceError> {
        let store = self.require_quiz_store().await?;
        let mut current: GameSession = store
            .find_session(session_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}` not found")))?
            .into();

        for attempt in 0..MAX_TRANSITION_ATTEMPTS {
            let transition = match self.machine.plan(&current, event, self.now())? {
                Plan::AlreadyApplied { phase } => {
                    debug!(session_id = %session_id, event = ?event, ?phase, "transition already applied");
                    return Ok(TransitionOutcome::Unchanged { session: current });
                }
                Plan::Apply(transition) => transition,
            };

            match store
                .update_session(session_id, transition.guard, transition.patch)
                .await?
            {
                UpdateOutcome::Applied(row) => {
                    info!(
                        session_id = %session_id,
                        event = ?event,
                        from = ?transition.from,
                        to = ?transition.to,
                        "session transition applied"
                    );
                    return Ok(TransitionOutcome::Applied {
                        session: row.into(),
                        from: transition.from,
                        to: transition.to,
                    });
                }
                UpdateOutcome::GuardFailed(row) => {
                    debug!(session_id = %session_id, attempt, "session changed underneath transition; re-planning");
                    current = row.into();
                }
                UpdateOutcome::Missing => {
                    return Err(ServiceError::NotFound(format!(
                        "session `{session_id}` not found"
                    )));
                }
            }
        }

        Err(ServiceError::InvalidState(
            "session kept changing during the transition; retry".into(),
        ))
    }
}
