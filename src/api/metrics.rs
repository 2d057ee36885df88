//! Prometheus metrics
//!
//! Exposes metrics in Prometheus text format at `/metrics`.
//!
//! ## Metrics Exposed
//!
//! - `meshcheck_scenarios_total` - Scenario variants scheduled
//! - `meshcheck_scenarios_completed` - Variants finished
//! - `meshcheck_scenarios_passed` - Variants passed
//! - `meshcheck_scenarios_failed` - Variants failed
//! - `meshcheck_run_status` - 0=running, 1=passed, 2=failed
//! - `meshcheck_current_steps_started{scenario,variant}` - Steps started in the running variant
//! - `meshcheck_scenario_passed{scenario,variant}` - 1 or 0 per variant
//! - `meshcheck_scenario_duration_seconds{scenario,variant}` - Duration per variant
//! - `meshcheck_scenario_steps_failed{scenario,variant}` - Failed steps per variant
//!
//! ```yaml
//! scrape_configs:
//!   - job_name: 'meshcheck'
//!     static_configs:
//!       - targets: ['meshcheck:8080']
//!     metrics_path: '/metrics'
//! ```

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::fmt::{self, Write};

use super::state::{ApiState, RunStatus};
use crate::scenarios::StepStatus;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

fn gauge(out: &mut String, name: &str, help: &str, value: impl fmt::Display) -> fmt::Result {
    writeln!(out, "# HELP {name} {help}")?;
    writeln!(out, "# TYPE {name} gauge")?;
    writeln!(out, "{name} {value}")?;
    writeln!(out)
}

fn render(state: &ApiState) -> Result<String, fmt::Error> {
    let status = state.status_response();
    let results = state.reports();
    let mut out = String::new();

    writeln!(out, "# HELP meshcheck_info Build information")?;
    writeln!(out, "# TYPE meshcheck_info gauge")?;
    writeln!(
        out,
        "meshcheck_info{{version=\"{}\"}} 1",
        env!("CARGO_PKG_VERSION")
    )?;
    writeln!(out)?;

    let status_value = match status.status {
        RunStatus::Running => 0,
        RunStatus::Passed => 1,
        RunStatus::Failed => 2,
    };
    gauge(
        &mut out,
        "meshcheck_run_status",
        "Run status (0=running, 1=passed, 2=failed)",
        status_value,
    )?;
    gauge(
        &mut out,
        "meshcheck_scenarios_total",
        "Scenario variants scheduled",
        status.variants.total,
    )?;
    gauge(
        &mut out,
        "meshcheck_scenarios_completed",
        "Scenario variants finished",
        status.variants.completed,
    )?;
    gauge(
        &mut out,
        "meshcheck_scenarios_passed",
        "Scenario variants that passed",
        status.variants.passed,
    )?;
    gauge(
        &mut out,
        "meshcheck_scenarios_failed",
        "Scenario variants that failed",
        status.variants.failed,
    )?;
    gauge(
        &mut out,
        "meshcheck_elapsed_seconds",
        "Time elapsed since start",
        status.elapsed_ms as f64 / 1000.0,
    )?;

    if let Some(current) = &status.current {
        writeln!(
            out,
            "# HELP meshcheck_current_steps_started Steps started in the running variant"
        )?;
        writeln!(out, "# TYPE meshcheck_current_steps_started gauge")?;
        writeln!(
            out,
            "meshcheck_current_steps_started{{scenario=\"{}\",variant=\"{}\"}} {}",
            current.scenario, current.variant, current.steps_started
        )?;
        writeln!(out)?;
    }

    if results.is_empty() {
        return Ok(out);
    }

    writeln!(
        out,
        "# HELP meshcheck_scenario_passed Whether a scenario variant passed (1) or failed (0)"
    )?;
    writeln!(out, "# TYPE meshcheck_scenario_passed gauge")?;
    for report in &results {
        writeln!(
            out,
            "meshcheck_scenario_passed{{scenario=\"{}\",variant=\"{}\"}} {}",
            report.scenario,
            report.params,
            u8::from(report.passed)
        )?;
    }
    writeln!(out)?;

    writeln!(
        out,
        "# HELP meshcheck_scenario_duration_seconds Duration of each scenario variant"
    )?;
    writeln!(out, "# TYPE meshcheck_scenario_duration_seconds gauge")?;
    for report in &results {
        writeln!(
            out,
            "meshcheck_scenario_duration_seconds{{scenario=\"{}\",variant=\"{}\"}} {}",
            report.scenario,
            report.params,
            report.duration.as_secs_f64()
        )?;
    }
    writeln!(out)?;

    writeln!(
        out,
        "# HELP meshcheck_scenario_steps_failed Failed steps in each scenario variant"
    )?;
    writeln!(out, "# TYPE meshcheck_scenario_steps_failed gauge")?;
    for report in &results {
        writeln!(
            out,
            "meshcheck_scenario_steps_failed{{scenario=\"{}\",variant=\"{}\"}} {}",
            report.scenario,
            report.params,
            report.count(StepStatus::Failed)
        )?;
    }

    Ok(out)
}

/// Generate Prometheus-format metrics
pub async fn metrics_handler(State(state): State<ApiState>) -> impl IntoResponse {
    match render(&state) {
        Ok(body) => (StatusCode::OK, [("content-type", CONTENT_TYPE)], body),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", CONTENT_TYPE)],
            String::new(),
        ),
    }
}
