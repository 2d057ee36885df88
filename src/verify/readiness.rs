//! Composite readiness gate
//!
//! A fleet is "ready" when every pod is attached to the controller, no pod
//! reports a sanity failure and loop protection has released. The gate
//! runs these as independent sub-checks in insertion order and stops at the
//! first failure, returning that sub-check's error untouched.
//!
//! Each sub-check owns its timeout. A sub-check that finishes early does not
//! donate the remainder to the next one.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use super::VerifyError;
use super::poll::{PollOptions, wait_for};
use crate::testbed::{Cloud, ConnectivityQuery, Pod, TestbedError};

/// One component of the readiness gate
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    /// Name used in logs and reports
    fn name(&self) -> &'static str;

    /// Wait for this component to become ready within its own budget
    async fn check(&self) -> Result<(), VerifyError>;
}

/// Time spent in each passed sub-check
#[derive(Debug, Clone, Default)]
pub struct ReadinessReport {
    pub phases: Vec<(&'static str, Duration)>,
}

impl ReadinessReport {
    pub fn total(&self) -> Duration {
        self.phases.iter().map(|(_, d)| *d).sum()
    }
}

/// Ordered, fail-fast sequence of readiness checks
#[derive(Default)]
pub struct ReadinessGate<'a> {
    checks: Vec<Box<dyn ReadinessCheck + 'a>>,
}

impl<'a> ReadinessGate<'a> {
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    /// Append a check; it runs after all previously added ones
    pub fn then(mut self, check: impl ReadinessCheck + 'a) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub async fn run(&self) -> Result<ReadinessReport, VerifyError> {
        let mut report = ReadinessReport::default();

        for check in &self.checks {
            let start = Instant::now();
            if let Err(e) = check.check().await {
                warn!(check = check.name(), error = %e, "Readiness check failed");
                return Err(e);
            }
            let elapsed = start.elapsed();
            info!(
                check = check.name(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Readiness check passed"
            );
            report.phases.push((check.name(), elapsed));
        }

        Ok(report)
    }
}

/// Pods attached to (or detached from) the cloud controller
///
/// The controller applies the timeout carried in the query; this check
/// does not poll on its own.
pub struct CloudConnectivity<'a> {
    cloud: &'a dyn Cloud,
    query: ConnectivityQuery,
}

impl<'a> CloudConnectivity<'a> {
    pub fn new(cloud: &'a dyn Cloud, query: ConnectivityQuery) -> Self {
        Self { cloud, query }
    }
}

#[async_trait]
impl ReadinessCheck for CloudConnectivity<'_> {
    fn name(&self) -> &'static str {
        "cloud_connectivity"
    }

    async fn check(&self) -> Result<(), VerifyError> {
        if self.cloud.pods_connected(&self.query).await? {
            Ok(())
        } else {
            Err(VerifyError::Timeout {
                expected: self.query.describe(),
                waited: self.query.timeout,
                last_observed: format!("pods not {}", self.query.expect),
            })
        }
    }
}

/// No managed pod reports a failing sanity check
///
/// Pods without management access cannot be probed and are skipped.
pub struct FleetSanity<'a> {
    pods: &'a [Arc<dyn Pod>],
    opts: PollOptions,
}

impl<'a> FleetSanity<'a> {
    pub fn new(pods: &'a [Arc<dyn Pod>], opts: PollOptions) -> Self {
        Self { pods, opts }
    }
}

#[async_trait]
impl ReadinessCheck for FleetSanity<'_> {
    fn name(&self) -> &'static str {
        "sanity"
    }

    async fn check(&self) -> Result<(), VerifyError> {
        let pods = self.pods;
        wait_for(
            "sanity checks passing on all managed pods",
            self.opts,
            move || async move {
                let mut failures = Vec::new();
                for pod in pods.iter().filter(|p| p.has_management()) {
                    for failure in pod.sanity_failures().await? {
                        failures.push(format!("{}: {failure}", pod.name()));
                    }
                }
                Ok::<_, TestbedError>(failures)
            },
            |failures: &Vec<String>| failures.is_empty(),
        )
        .await
        .map(|_| ())
    }
}

/// Loop protection released on every pod
///
/// Unmanaged pods cannot report loop state, so the check falls back to a
/// fixed settle delay when any are present.
pub struct LoopProtection<'a> {
    pods: &'a [Arc<dyn Pod>],
    opts: PollOptions,
    unmanaged_settle: Duration,
}

impl<'a> LoopProtection<'a> {
    pub fn new(pods: &'a [Arc<dyn Pod>], opts: PollOptions, unmanaged_settle: Duration) -> Self {
        Self {
            pods,
            opts,
            unmanaged_settle,
        }
    }
}

#[async_trait]
impl ReadinessCheck for LoopProtection<'_> {
    fn name(&self) -> &'static str {
        "loop_protection"
    }

    async fn check(&self) -> Result<(), VerifyError> {
        if self.pods.iter().any(|p| !p.has_management()) {
            info!(
                settle_secs = self.unmanaged_settle.as_secs(),
                "Unmanaged pods present, waiting fixed settle delay"
            );
            tokio::time::sleep(self.unmanaged_settle).await;
        }

        let pods = self.pods;
        wait_for(
            "loop protection released on all managed pods",
            self.opts,
            move || async move {
                let mut engaged = Vec::new();
                for pod in pods.iter().filter(|p| p.has_management()) {
                    if pod.loop_protection_engaged().await? {
                        engaged.push(pod.name().to_string());
                    }
                }
                Ok::<_, TestbedError>(engaged)
            },
            |engaged: &Vec<String>| engaged.is_empty(),
        )
        .await
        .map(|_| ())
    }
}
