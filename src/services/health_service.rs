use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Ping the quiz store and report `ok` or `degraded`.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.quiz_store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "quiz store health check failed");
                return HealthResponse::degraded();
            }
        }
        None => warn!("quiz store not installed (degraded mode)"),
    }

    if state.is_degraded().await {
        HealthResponse::degraded()
    } else {
        HealthResponse::ok()
    }
}
