use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod events;
#[cfg(feature = "ai-generation")]
pub mod generation;
pub mod health;
pub mod identity;
pub mod quizzes;
pub mod responses;
pub mod results;
pub mod roster;
pub mod sessions;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(quizzes::router())
        .merge(sessions::router())
        .merge(roster::router())
        .merge(responses::router())
        .merge(results::router())
        .merge(events::router());

    #[cfg(feature = "ai-generation")]
    let api_router = api_router.merge(generation::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
