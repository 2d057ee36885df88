//! Status API routes
//!
//! Read-only views of the run for a lab scheduler: overall state, the
//! variant and step on the testbed right now, one summary line per finished
//! variant, and full step reports per scenario.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::metrics::metrics_handler;
use super::state::{ApiState, HealthResponse, ResultsResponse, RunStatus, StatusResponse};
use crate::scenarios::ScenarioReport;
use crate::scenarios::registry::get_scenario;

/// Serve the status API on `port` until the process exits
pub async fn start_api_server(
    port: u16,
    state: ApiState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(port = port, "Starting status API server");
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/results", get(results))
        .route("/results/{scenario}", get(scenario_reports))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 202 until the run is over, a failed run included
fn run_code(status: RunStatus) -> StatusCode {
    match status {
        RunStatus::Running => StatusCode::ACCEPTED,
        RunStatus::Passed | RunStatus::Failed => StatusCode::OK,
    }
}

async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        status: state.status(),
    })
}

async fn status(State(state): State<ApiState>) -> Json<StatusResponse> {
    Json(state.status_response())
}

async fn results(State(state): State<ApiState>) -> (StatusCode, Json<ResultsResponse>) {
    let status = state.status();
    let variants = state.summaries();
    (run_code(status), Json(ResultsResponse { status, variants }))
}

/// Full reports for one scenario; 404 for names nobody registered
async fn scenario_reports(
    State(state): State<ApiState>,
    Path(scenario): Path<String>,
) -> Result<(StatusCode, Json<Vec<ScenarioReport>>), StatusCode> {
    if get_scenario(&scenario).is_none() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok((run_code(state.status()), Json(state.reports_for(&scenario))))
}
