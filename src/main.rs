//! GolekQuiz Back binary entrypoint wiring REST, SSE, and the quiz store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use golek_quiz_back::{
    config::AppConfig,
    dao::quiz_store::memory::MemoryQuizStore,
    routes,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config);

    spawn_store(app_state.clone()).await;
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Install the quiz store selected by `QUIZ_STORE` (`mongo` by default when compiled in and
/// `MONGO_URI` is set, otherwise `memory`). MongoDB is connected in the background so the server answers in
/// degraded mode until it is reachable.
async fn spawn_store(state: SharedState) {
    let backend = env::var("QUIZ_STORE").unwrap_or_else(|_| default_backend().into());
    match backend.as_str() {
        #[cfg(feature = "mongo-store")]
        "mongo" => spawn_mongo_supervisor(state),
        "memory" => {
            info!("using in-memory quiz store");
            state.set_quiz_store(Arc::new(MemoryQuizStore::new())).await;
        }
        other => {
            warn!(backend = other, "unknown QUIZ_STORE; falling back to in-memory store");
            state.set_quiz_store(Arc::new(MemoryQuizStore::new())).await;
        }
    }
}

fn default_backend() -> &'static str {
    if cfg!(feature = "mongo-store") && env::var("MONGO_URI").is_ok() {
        "mongo"
    } else {
        "memory"
    }
}

#[cfg(feature = "mongo-store")]
fn spawn_mongo_supervisor(state: SharedState) {
    use golek_quiz_back::dao::{
        quiz_store::{
            QuizStore,
            mongodb::{MongoConfig, MongoQuizStore},
        },
        storage::StorageError,
    };
    use golek_quiz_back::services::storage_supervisor;

    let uri = env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".into());
    let db_name = env::var("MONGO_DB").ok();

    tokio::spawn(storage_supervisor::run(state, move || {
        let uri = uri.clone();
        let db_name = db_name.clone();
        async move {
            let config = MongoConfig::from_uri(&uri, db_name.as_deref()).await?;
            let store = MongoQuizStore::connect(config).await?;
            Ok::<Arc<dyn QuizStore>, StorageError>(Arc::new(store))
        }
    }));
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
