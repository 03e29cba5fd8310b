use uuid::Uuid;

use crate::{
    error::ServiceError,
    state::{
        SessionNotification, SharedState, TransitionOutcome, state_machine::SessionEvent,
    },
};

/// Run a session transition, then notify the session's watchers when a row was written.
pub async fn run_transition_with_broadcast(
    state: &SharedState,
    session_id: Uuid,
    event: SessionEvent,
) -> Result<TransitionOutcome, ServiceError> {
    let outcome = state.run_transition(session_id, event).await?;
    if outcome.was_applied() {
        state
            .hubs()
            .publish(session_id, SessionNotification::SessionUpdated);
    }
    Ok(outcome)
}
