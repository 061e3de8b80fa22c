use anyhow::{Context, Result};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use axum::{extract::State, middleware, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use super::{job_routes, log_requests, metrics::metrics_handler, state::*, ServerConfig};

#[derive(Serialize)]
struct ServerStats {
    pub version: &'static str,
    pub uptime: String,
    pub hash: String,
    pub executing_jobs: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        version: env!("CARGO_PKG_VERSION"),
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        executing_jobs: state.job_service.executing_count(),
    };
    Json(stats)
}

pub fn make_app(config: ServerConfig, job_service: GuardedJobService) -> Router {
    let state = ServerState::new(config, job_service);

    Router::new()
        .route("/", get(home))
        .route("/metrics", get(metrics_handler))
        .nest("/v1/jobs", job_routes())
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state)
}

/// Serves the HTTP API until `shutdown` is cancelled.
pub async fn run_server(
    config: ServerConfig,
    job_service: GuardedJobService,
    shutdown: CancellationToken,
) -> Result<()> {
    let port = config.port;
    let app = make_app(config, job_service);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server failed")
}
