//! Run progress shared with the status API
//!
//! The runner announces each variant before it starts and hands over its
//! report when it ends. Step boundaries arrive through [`StepObserver`], so
//! `/status` can show which step of which variant is on the testbed right
//! now.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::scenarios::{ScenarioParams, ScenarioReport, StepObserver, StepStatus};

/// Overall state of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    /// Every variant passed
    Passed,
    /// At least one variant failed
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RunStatus::Running => "running",
            RunStatus::Passed => "passed",
            RunStatus::Failed => "failed",
        })
    }
}

/// Variant counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantCounts {
    pub total: usize,
    pub completed: usize,
    pub passed: usize,
    pub failed: usize,
}

/// The variant on the testbed right now
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentVariant {
    pub scenario: String,
    pub variant: ScenarioParams,
    /// Step in progress; `None` while the location is being prepared
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    /// Steps started so far, teardown included
    pub steps_started: usize,
}

/// One line per finished variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSummary {
    pub scenario: String,
    pub variant: ScenarioParams,
    pub passed: bool,
    pub steps_passed: usize,
    pub steps_failed: usize,
    pub steps_skipped: usize,
    pub duration_ms: u64,
    /// First failed step and why
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl From<&ScenarioReport> for VariantSummary {
    fn from(report: &ScenarioReport) -> Self {
        Self {
            scenario: report.scenario.clone(),
            variant: report.params,
            passed: report.passed,
            steps_passed: report.count(StepStatus::Passed),
            steps_failed: report.count(StepStatus::Failed),
            steps_skipped: report.count(StepStatus::Skipped),
            duration_ms: report.duration.as_millis() as u64,
            failure: report.first_failure().map(|step| match &step.error {
                Some(error) => format!("{}: {error}", step.name),
                None => step.name.clone(),
            }),
        }
    }
}

#[derive(Debug)]
struct Progress {
    status: RunStatus,
    started_at: Instant,
    finished_at: Option<Instant>,
    counts: VariantCounts,
    current: Option<CurrentVariant>,
    reports: Vec<ScenarioReport>,
}

/// Shared run progress
#[derive(Debug, Clone)]
pub struct ApiState {
    inner: Arc<RwLock<Progress>>,
}

impl Default for ApiState {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Progress {
                status: RunStatus::Running,
                started_at: Instant::now(),
                finished_at: None,
                counts: VariantCounts::default(),
                current: None,
                reports: Vec::new(),
            })),
        }
    }

    pub fn set_total_variants(&self, total: usize) {
        self.inner.write().counts.total = total;
    }

    pub fn start_variant(&self, scenario: &str, variant: ScenarioParams) {
        self.inner.write().current = Some(CurrentVariant {
            scenario: scenario.to_string(),
            variant,
            step: None,
            steps_started: 0,
        });
    }

    pub fn record_report(&self, report: ScenarioReport) {
        let mut progress = self.inner.write();
        progress.counts.completed += 1;
        if report.passed {
            progress.counts.passed += 1;
        } else {
            progress.counts.failed += 1;
        }
        progress.current = None;
        progress.reports.push(report);
    }

    /// End the run; the outcome follows from the recorded reports
    pub fn finish(&self) {
        let mut progress = self.inner.write();
        progress.status = if progress.counts.failed == 0 {
            RunStatus::Passed
        } else {
            RunStatus::Failed
        };
        progress.finished_at = Some(Instant::now());
        progress.current = None;
    }

    pub fn status(&self) -> RunStatus {
        self.inner.read().status
    }

    pub fn counts(&self) -> VariantCounts {
        self.inner.read().counts
    }

    pub fn current(&self) -> Option<CurrentVariant> {
        self.inner.read().current.clone()
    }

    pub fn status_response(&self) -> StatusResponse {
        let progress = self.inner.read();
        StatusResponse {
            status: progress.status,
            variants: progress.counts,
            current: progress.current.clone(),
            elapsed_ms: progress.started_at.elapsed().as_millis() as u64,
            duration_ms: progress
                .finished_at
                .map(|t| t.duration_since(progress.started_at).as_millis() as u64),
        }
    }

    pub fn reports(&self) -> Vec<ScenarioReport> {
        self.inner.read().reports.clone()
    }

    /// Reports of every finished variant of `scenario`
    pub fn reports_for(&self, scenario: &str) -> Vec<ScenarioReport> {
        self.inner
            .read()
            .reports
            .iter()
            .filter(|r| r.scenario == scenario)
            .cloned()
            .collect()
    }

    pub fn summaries(&self) -> Vec<VariantSummary> {
        self.inner
            .read()
            .reports
            .iter()
            .map(VariantSummary::from)
            .collect()
    }
}

impl StepObserver for ApiState {
    fn step_started(&self, step: &str) {
        if let Some(current) = self.inner.write().current.as_mut() {
            current.step = Some(step.to_string());
            current.steps_started += 1;
        }
    }
}

/// `GET /status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: RunStatus,
    pub variants: VariantCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<CurrentVariant>,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub status: RunStatus,
}

/// `GET /results`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsResponse {
    pub status: RunStatus,
    pub variants: Vec<VariantSummary>,
}
