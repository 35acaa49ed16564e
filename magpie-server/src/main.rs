use anyhow::Result;
use axum::{Router, routing::get};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use magpie_core::CompletionClient;
use magpie_server::AppState;
use magpie_server::config::Config;
use magpie_server::github::GitHubClient;
use magpie_server::notify::Notifier;
use magpie_server::registry::{InMemoryWorkflowStore, sweep_loop};
use magpie_server::tracker::TrackerClient;
use magpie_server::webhook::{health_check, webhook_router};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting magpie review bot");

    let config = Config::from_env()?;

    let github_client = Arc::new(GitHubClient::new(
        config.github_app_id,
        config.github_private_key.clone(),
    ));
    let completion = Arc::new(CompletionClient::new(
        config.llm_api_key.clone(),
        config.llm_model.clone(),
        Duration::from_secs(config.llm_timeout_secs),
    ));
    let tracker = TrackerClient::from_config(
        config.tracker_base_url.clone(),
        config.tracker_token.clone(),
    )
    .map(Arc::new);
    if tracker.is_none() {
        info!("Issue tracker not configured; ticket sync disabled");
    }
    let notifier = Notifier::new(config.notify_url.clone());
    let workflows = Arc::new(InMemoryWorkflowStore::new());

    let app_state = Arc::new(AppState {
        github_client,
        completion,
        tracker,
        notifier,
        workflows: workflows.clone(),
        config: config.clone(),
    });

    // Background eviction keeps the workflow registry from leaking
    tokio::spawn(sweep_loop(
        workflows,
        config.sweep_interval_secs,
        config.workflow_retention_secs,
    ));

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(webhook_router(app_state.clone()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
