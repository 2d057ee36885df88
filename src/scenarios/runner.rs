//! Sequential scenario execution
//!
//! Scenarios share one physical testbed, so variants run one after the
//! other. Before each variant the location is put into the variant's
//! network mode; a variant whose preparation fails is reported with a
//! single failed `set_network_mode` step.

use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info};

use super::common::wait_pods_ready;
use super::steps::StepObserver;
use super::traits::{
    Scenario, ScenarioContext, ScenarioOptions, ScenarioParams, ScenarioReport, StepResult,
    Timing,
};
use crate::api::ApiState;
use crate::config::Config;
use crate::testbed::Testbed;
use crate::verify::VerifyError;

/// Switch the location to the variant's network mode if it is elsewhere
async fn prepare(ctx: &ScenarioContext) -> Result<(), VerifyError> {
    let wanted = ctx.params.network_mode;
    let current = ctx.testbed.cloud.network_mode().await?;
    if current == wanted {
        return Ok(());
    }
    info!(from = %current, to = %wanted, "Changing network mode for variant");
    ctx.testbed.cloud.set_network_mode(wanted).await?;
    wait_pods_ready(ctx).await?;
    Ok(())
}

/// Run one variant of `scenario`
pub async fn run_variant(
    scenario: &dyn Scenario,
    testbed: Arc<Testbed>,
    params: ScenarioParams,
    timing: Timing,
    options: ScenarioOptions,
) -> ScenarioReport {
    run_in_context(scenario, &ScenarioContext::new(testbed, params, timing, options)).await
}

async fn run_in_context(scenario: &dyn Scenario, ctx: &ScenarioContext) -> ScenarioReport {
    let start = Instant::now();
    let params = ctx.params;

    if let Err(e) = prepare(ctx).await {
        error!(scenario = scenario.name(), variant = %params, error = %e, "Variant preparation failed");
        let step = StepResult::failed("set_network_mode", start.elapsed(), &e);
        let message = format!("set_network_mode failed: {e}");
        return ScenarioReport::new(scenario.name(), params, vec![step], vec![], start.elapsed())
            .with_message(message);
    }

    scenario.run(ctx).await
}

/// Run every variant of `scenarios` that `config` allows, in order
///
/// Progress, down to the running step, and reports are published through
/// `state`.
pub async fn run_scenarios(
    scenarios: &[Arc<dyn Scenario>],
    testbed: Arc<Testbed>,
    config: &Config,
    state: &ApiState,
) -> Vec<ScenarioReport> {
    let plan: Vec<(&Arc<dyn Scenario>, Vec<ScenarioParams>)> = scenarios
        .iter()
        .map(|s| (s, config.filter_variants(s.name(), s.variants())))
        .collect();
    let total = plan.iter().map(|(_, v)| v.len()).sum();
    state.set_total_variants(total);
    let observer: Arc<dyn StepObserver> = Arc::new(state.clone());

    let mut reports = Vec::with_capacity(total);
    for (scenario, variants) in plan {
        let options = config.scenario_options(scenario.name(), &scenario.default_options());
        for params in variants {
            info!(scenario = scenario.name(), variant = %params, "Starting scenario");
            state.start_variant(scenario.name(), params);

            let ctx =
                ScenarioContext::new(Arc::clone(&testbed), params, config.timing, options.clone())
                    .with_observer(Arc::clone(&observer));
            let report = run_in_context(scenario.as_ref(), &ctx).await;

            if report.passed {
                info!(
                    scenario = %report.scenario,
                    variant = %params,
                    duration_ms = report.duration.as_millis() as u64,
                    "Scenario PASSED"
                );
            } else {
                error!(
                    scenario = %report.scenario,
                    variant = %params,
                    duration_ms = report.duration.as_millis() as u64,
                    message = ?report.message,
                    "Scenario FAILED"
                );
            }
            state.record_report(report.clone());
            reports.push(report);
        }
    }
    reports
}
