//! Scenario trait and supporting types
//!
//! A `Scenario` is an acceptance test against a live testbed. It declares
//! the parameter combinations it supports and is run once per combination
//! with an immutable [`ScenarioContext`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::steps::StepObserver;
use crate::testbed::{ClientKind, NetworkMode, NodeRole, Pod, TestClient, Testbed, WanPort};
use crate::verify::{DEFAULT_POLL_INTERVAL, PollOptions, VerifyError};

/// One parametrization record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScenarioParams {
    pub network_mode: NetworkMode,
    pub wan_port: WanPort,
    /// Which pod the scenario targets
    pub role: NodeRole,
}

impl ScenarioParams {
    pub const fn new(network_mode: NetworkMode, wan_port: WanPort, role: NodeRole) -> Self {
        Self {
            network_mode,
            wan_port,
            role,
        }
    }

    /// Every combination, network mode varying slowest
    pub fn matrix(modes: &[NetworkMode], wan_ports: &[WanPort], roles: &[NodeRole]) -> Vec<Self> {
        let mut params = Vec::with_capacity(modes.len() * wan_ports.len() * roles.len());
        for &mode in modes {
            for &wan_port in wan_ports {
                for &role in roles {
                    params.push(Self::new(mode, wan_port, role));
                }
            }
        }
        params
    }
}

impl std::fmt::Display for ScenarioParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.network_mode, self.wan_port, self.role)
    }
}

/// Timeouts and delays shared by all scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Tick of every poll loop
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Cloud reporting a client change
    #[serde(with = "humantime_serde")]
    pub cloud_timeout: Duration,
    /// Client obtaining a DHCP lease
    #[serde(with = "humantime_serde")]
    pub dhcp_timeout: Duration,
    /// Client regaining internet after a disruptive change
    #[serde(with = "humantime_serde")]
    pub internet_timeout: Duration,
    /// Pods reattaching to the controller
    #[serde(with = "humantime_serde")]
    pub connectivity_timeout: Duration,
    /// Pods dropping off the controller after a reboot
    #[serde(with = "humantime_serde")]
    pub pod_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub sanity_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub loop_timeout: Duration,
    /// Fixed wait replacing loop-protection polling on unmanaged pods
    #[serde(with = "humantime_serde")]
    pub unmanaged_settle: Duration,
    /// Wait after a reboot before fingerprinting is re-checked
    #[serde(with = "humantime_serde")]
    pub reboot_settle: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            cloud_timeout: Duration::from_secs(180),
            dhcp_timeout: Duration::from_secs(200),
            internet_timeout: Duration::from_secs(300),
            connectivity_timeout: Duration::from_secs(600),
            pod_timeout: Duration::from_secs(180),
            sanity_timeout: Duration::from_secs(300),
            loop_timeout: Duration::from_secs(300),
            unmanaged_settle: Duration::from_secs(60),
            reboot_settle: Duration::from_secs(120),
        }
    }
}

impl Timing {
    /// Poll options for `timeout` at the configured tick
    pub fn poll(&self, timeout: Duration) -> Result<PollOptions, VerifyError> {
        PollOptions::new(timeout, self.poll_interval)
    }

    /// Every timeout, for validation
    pub fn timeouts(&self) -> [(&'static str, Duration); 8] {
        [
            ("cloud_timeout", self.cloud_timeout),
            ("dhcp_timeout", self.dhcp_timeout),
            ("internet_timeout", self.internet_timeout),
            ("connectivity_timeout", self.connectivity_timeout),
            ("pod_timeout", self.pod_timeout),
            ("sanity_timeout", self.sanity_timeout),
            ("loop_timeout", self.loop_timeout),
            ("reboot_settle", self.reboot_settle),
        ]
    }
}

/// Scenario-specific options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioOptions {
    #[serde(default, flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ScenarioOptions {
    /// Get an extra option as a specific type
    pub fn get_extra<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.extra
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn extra_or<T: for<'de> Deserialize<'de>>(&self, key: &str, default: T) -> T {
        self.get_extra(key).unwrap_or(default)
    }
}

/// Everything a step may read; never mutated during a run
#[derive(Clone)]
pub struct ScenarioContext {
    pub testbed: Arc<Testbed>,
    pub params: ScenarioParams,
    pub timing: Timing,
    pub options: ScenarioOptions,
    /// Progress sink, e.g. the status API
    pub observer: Option<Arc<dyn StepObserver>>,
}

impl ScenarioContext {
    pub fn new(
        testbed: Arc<Testbed>,
        params: ScenarioParams,
        timing: Timing,
        options: ScenarioOptions,
    ) -> Self {
        Self {
            testbed,
            params,
            timing,
            options,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn StepObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn poll(&self, timeout: Duration) -> Result<PollOptions, VerifyError> {
        self.timing.poll(timeout)
    }

    pub fn gateway(&self) -> Result<&Arc<dyn Pod>, VerifyError> {
        self.testbed
            .gateway()
            .ok_or_else(|| VerifyError::precondition("testbed has no gateway pod"))
    }

    /// The pod selected by the variant's role
    pub fn target_pod(&self) -> Result<&Arc<dyn Pod>, VerifyError> {
        self.testbed
            .pod_by_role(self.params.role)
            .ok_or_else(|| {
                VerifyError::precondition(format!("testbed has no {} pod", self.params.role))
            })
    }

    /// The `index`-th wired client in configuration order
    pub fn eth_client(&self, index: usize) -> Result<&Arc<dyn TestClient>, VerifyError> {
        self.testbed
            .clients_of_kind(ClientKind::Eth)
            .nth(index)
            .ok_or_else(|| {
                VerifyError::precondition(format!(
                    "scenario needs at least {} wired clients",
                    index + 1
                ))
            })
    }

    pub fn wifi_client(&self) -> Result<&Arc<dyn TestClient>, VerifyError> {
        self.testbed
            .clients_of_kind(ClientKind::Wifi)
            .next()
            .ok_or_else(|| VerifyError::precondition("scenario needs a wireless client"))
    }
}

/// Outcome of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

/// Result of one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub status: StepStatus,
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure kind, see [`VerifyError::kind`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl StepResult {
    pub fn passed(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Passed,
            duration,
            error: None,
            error_kind: None,
        }
    }

    pub fn failed(name: impl Into<String>, duration: Duration, error: &VerifyError) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Failed,
            duration,
            error: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
        }
    }

    pub fn skipped(name: impl Into<String>, error: &VerifyError) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Skipped,
            duration: Duration::ZERO,
            error: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

/// Result of one scenario variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub params: ScenarioParams,
    pub passed: bool,
    pub steps: Vec<StepResult>,
    pub teardown: Vec<StepResult>,
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ScenarioReport {
    pub fn new(
        scenario: impl Into<String>,
        params: ScenarioParams,
        steps: Vec<StepResult>,
        teardown: Vec<StepResult>,
        duration: Duration,
    ) -> Self {
        let passed = steps
            .iter()
            .chain(teardown.iter())
            .all(|s| s.status == StepStatus::Passed);
        Self {
            scenario: scenario.into(),
            params,
            passed,
            steps,
            teardown,
            duration,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// First failed step, if any
    pub fn first_failure(&self) -> Option<&StepResult> {
        self.steps
            .iter()
            .chain(self.teardown.iter())
            .find(|s| s.is_failed())
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }
}

/// Trait for implementing acceptance scenarios
///
/// ## Example Implementation
///
/// ```ignore
/// use async_trait::async_trait;
/// use meshcheck::scenarios::{Scenario, ScenarioContext, ScenarioParams, ScenarioReport};
///
/// pub struct MyScenario;
///
/// #[async_trait]
/// impl Scenario for MyScenario {
///     fn name(&self) -> &'static str { "my_scenario" }
///     fn description(&self) -> &'static str { "Verifies something important" }
///     fn variants(&self) -> Vec<ScenarioParams> { vec![] }
///
///     async fn run(&self, ctx: &ScenarioContext) -> ScenarioReport {
///         todo!()
///     }
/// }
/// ```
#[async_trait]
pub trait Scenario: Send + Sync {
    /// Unique name (used in CLI and config)
    fn name(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// Parameter records this scenario runs with
    fn variants(&self) -> Vec<ScenarioParams>;

    /// Run one variant; failures are reported, not returned
    async fn run(&self, ctx: &ScenarioContext) -> ScenarioReport;

    /// Default options for this scenario
    fn default_options(&self) -> ScenarioOptions {
        ScenarioOptions::default()
    }
}
