//! Ordered step plans
//!
//! A scenario is a named list of steps run in order against one context.
//! Facts learned by one step and needed by a later one live in a typed
//! state value owned by the plan and lent to each step in turn.
//!
//! Once a step fails, every remaining step is reported as skipped with a
//! precondition failure naming the step that broke. Teardown steps run
//! regardless, each one independently.

use futures::future::BoxFuture;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::traits::{ScenarioContext, ScenarioReport, StepResult};
use crate::verify::VerifyError;

/// Future returned by a step
pub type StepFuture<'a> = BoxFuture<'a, Result<(), VerifyError>>;

/// A step: borrows the context and the scenario state for its duration
pub type StepFn<S> = for<'a> fn(&'a ScenarioContext, &'a mut S) -> StepFuture<'a>;

/// Told about every step a plan runs, teardown included
pub trait StepObserver: Send + Sync {
    fn step_started(&self, step: &str);
}

struct Step<S> {
    name: String,
    run: StepFn<S>,
}

/// Setup, steps and teardown of one scenario
pub struct StepPlan<S> {
    scenario: &'static str,
    steps: Vec<Step<S>>,
    teardown: Vec<Step<S>>,
}

impl<S: Send> StepPlan<S> {
    pub fn new(scenario: &'static str) -> Self {
        Self {
            scenario,
            steps: Vec::new(),
            teardown: Vec::new(),
        }
    }

    /// Append a step; setup steps are ordinary steps listed first
    pub fn step(mut self, name: impl Into<String>, run: StepFn<S>) -> Self {
        self.steps.push(Step {
            name: name.into(),
            run,
        });
        self
    }

    /// Append a teardown step
    pub fn teardown(mut self, name: impl Into<String>, run: StepFn<S>) -> Self {
        self.teardown.push(Step {
            name: name.into(),
            run,
        });
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn teardown_names(&self) -> Vec<&str> {
        self.teardown.iter().map(|s| s.name.as_str()).collect()
    }

    /// Run the plan with `state` as the initial scenario state
    pub async fn run(&self, ctx: &ScenarioContext, mut state: S) -> ScenarioReport {
        let start = Instant::now();
        let mut results = Vec::with_capacity(self.steps.len());
        let mut broken: Option<String> = None;

        for step in &self.steps {
            if let Some(failed) = &broken {
                let err = VerifyError::precondition(format!("step '{failed}' failed"));
                warn!(scenario = self.scenario, step = %step.name, "Skipping step");
                results.push(StepResult::skipped(&step.name, &err));
                continue;
            }

            let result = self.run_step(ctx, &mut state, step).await;
            if result.is_failed() {
                broken = Some(step.name.clone());
            }
            results.push(result);
        }

        let mut teardown = Vec::with_capacity(self.teardown.len());
        for step in &self.teardown {
            teardown.push(self.run_step(ctx, &mut state, step).await);
        }

        let duration = start.elapsed();
        let report = ScenarioReport::new(self.scenario, ctx.params, results, teardown, duration);
        match report.first_failure() {
            Some(failure) => {
                let message = format!(
                    "{} failed: {}",
                    failure.name,
                    failure.error.as_deref().unwrap_or("unknown error")
                );
                report.with_message(message)
            }
            None => {
                let message = format!("{} steps passed", report.steps.len());
                report.with_message(message)
            }
        }
    }

    async fn run_step(&self, ctx: &ScenarioContext, state: &mut S, step: &Step<S>) -> StepResult {
        info!(scenario = self.scenario, variant = %ctx.params, step = %step.name, "Running step");
        if let Some(observer) = &ctx.observer {
            observer.step_started(&step.name);
        }
        let start = Instant::now();
        let outcome = (step.run)(ctx, state).await;
        let duration = start.elapsed();

        match outcome {
            Ok(()) => {
                info!(
                    scenario = self.scenario,
                    step = %step.name,
                    duration_ms = duration.as_millis() as u64,
                    "Step passed"
                );
                StepResult::passed(&step.name, duration)
            }
            Err(e) => {
                error!(
                    scenario = self.scenario,
                    step = %step.name,
                    kind = e.kind(),
                    error = %e,
                    "Step failed"
                );
                StepResult::failed(&step.name, duration, &e)
            }
        }
    }
}
