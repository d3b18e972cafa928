use axum::routing::{delete, get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use project_brain::api;
use project_brain::config::Config;
use project_brain::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);

    let state = AppState::new(config.clone())?;

    let app = Router::new()
        .route("/api/health", get(api::health::health))
        .route("/api/ingest", post(api::ingest::ingest))
        .route("/api/search", post(api::search::search))
        .route("/api/query", post(api::query::query))
        .route("/api/scopes", get(api::scopes::list_scopes))
        .route("/api/scopes", post(api::scopes::create_scope))
        .route("/api/scopes/{id}", delete(api::scopes::delete_scope))
        .route("/api/extract/door-schedule", post(api::extract::door_schedule))
        .route("/api/eval/run-tests", post(api::eval::run_tests))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    let shutdown = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
            shutdown.cancel();
        })
        .await?;

    state.shutdown();
    Ok(())
}
