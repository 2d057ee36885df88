//! Status HTTP API
//!
//! Provides an HTTP API for monitoring a run, so a lab scheduler can wait
//! for it to finish and collect the reports.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check (always returns 200 if running)
//! - `GET /status` - Variant counters plus the variant and step in progress
//! - `GET /results` - One summary per finished variant (202 while running)
//! - `GET /results/{scenario}` - Full step reports of one scenario
//! - `GET /metrics` - Prometheus metrics

mod metrics;
mod server;
mod state;

pub use metrics::metrics_handler;
pub use server::{create_router, start_api_server};
pub use state::{
    ApiState, CurrentVariant, HealthResponse, ResultsResponse, RunStatus, StatusResponse,
    VariantCounts, VariantSummary,
};
