//! Testbed configuration types
//!
//! Defines the structure for testbed configuration files.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

use crate::scenarios::{ScenarioOptions, ScenarioParams, Timing};
use crate::testbed::{
    ClientKind, HttpCloud, HttpPod, HttpSwitch, HttpTestClient, KpiLimits, NetworkMode, NodeRole,
    Testbed, TestbedClient, TestbedError, WanPort, WifiNetwork,
};

/// Errors that can occur during configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to create testbed: {0}")]
    Testbed(#[from] TestbedError),
}

/// A mesh pod
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    /// Serial number, as the cloud knows the pod
    pub id: String,
    #[serde(default)]
    pub role: NodeRole,
    /// Whether the pod has a management channel (defaults to true)
    #[serde(default = "default_true")]
    pub mgmt: bool,
}

/// A test client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub name: String,
    #[serde(default)]
    pub kind: ClientKind,
    pub iface: String,
    pub mac: String,
}

/// Testbed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestbedConfig {
    #[serde(default = "default_testbed_name")]
    pub name: String,

    /// Base URL of the testbed gateway service
    pub gateway_url: String,

    #[serde(default)]
    pub nodes: Vec<NodeConfig>,

    #[serde(default)]
    pub clients: Vec<ClientConfig>,

    /// Home WiFi network for wireless clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<WifiNetwork>,

    /// Address the MTU scenarios ping with full-size frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_server: Option<String>,

    #[serde(default)]
    pub kpi: KpiLimits,
}

fn default_testbed_name() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

impl TestbedConfig {
    /// Build the testbed, with every device talking to `gateway_url`
    pub fn to_testbed(&self) -> Result<Testbed, ConfigError> {
        let client = Arc::new(TestbedClient::new(&self.gateway_url)?);

        let mut testbed = Testbed::new(
            &self.name,
            Arc::new(HttpCloud::new(Arc::clone(&client))),
            Arc::new(HttpSwitch::new(Arc::clone(&client))),
        )
        .with_kpi(self.kpi);

        for node in &self.nodes {
            let pod = HttpPod::new(Arc::clone(&client), &node.name, &node.id, node.role)
                .with_management(node.mgmt);
            testbed = testbed.with_pod(Arc::new(pod));
        }
        for c in &self.clients {
            let test_client =
                HttpTestClient::new(Arc::clone(&client), &c.name, c.kind, &c.iface, &c.mac);
            testbed = testbed.with_client(Arc::new(test_client));
        }
        if let Some(network) = &self.network {
            testbed = testbed.with_network(network.clone());
        }
        if let Some(server) = &self.test_server {
            testbed = testbed.with_test_server(server);
        }

        testbed.validate()?;
        Ok(testbed)
    }
}

/// Configuration for a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Only run variants in these network modes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_modes: Option<Vec<NetworkMode>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wan_ports: Option<Vec<WanPort>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<NodeRole>>,

    /// Additional scenario-specific options
    #[serde(default, flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            network_modes: None,
            wan_ports: None,
            roles: None,
            extra: HashMap::new(),
        }
    }
}

impl ScenarioConfig {
    /// Whether a declared variant passes the configured filters
    pub fn accepts(&self, params: &ScenarioParams) -> bool {
        fn allowed<T: PartialEq>(filter: &Option<Vec<T>>, value: &T) -> bool {
            filter.as_ref().is_none_or(|values| values.contains(value))
        }
        allowed(&self.network_modes, &params.network_mode)
            && allowed(&self.wan_ports, &params.wan_port)
            && allowed(&self.roles, &params.role)
    }

    /// Overlay the configured extras on a scenario's defaults
    pub fn to_options(&self, defaults: &ScenarioOptions) -> ScenarioOptions {
        let mut options = defaults.clone();
        options
            .extra
            .extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        options
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub testbed: TestbedConfig,

    #[serde(default)]
    pub timing: Timing,

    /// Scenario configurations (scenario_name -> config)
    #[serde(default)]
    pub scenarios: HashMap<String, ScenarioConfig>,
}

impl Config {
    /// Load and validate configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let testbed = &self.testbed;
        Url::parse(&testbed.gateway_url).map_err(|e| {
            ConfigError::Invalid(format!("gateway_url {}: {e}", testbed.gateway_url))
        })?;

        let gateways = testbed.nodes.iter().filter(|n| n.role.is_gateway()).count();
        if gateways != 1 {
            return Err(ConfigError::Invalid(format!(
                "exactly one node must have role gw, found {gateways}"
            )));
        }

        let mut names = HashSet::new();
        if let Some(dup) = testbed.nodes.iter().find(|n| !names.insert(n.name.as_str())) {
            return Err(ConfigError::Invalid(format!("duplicate node name {}", dup.name)));
        }
        let mut names = HashSet::new();
        if let Some(dup) = testbed.clients.iter().find(|c| !names.insert(c.name.as_str())) {
            return Err(ConfigError::Invalid(format!(
                "duplicate client name {}",
                dup.name
            )));
        }

        let interval = self.timing.poll_interval;
        if interval.is_zero() {
            return Err(ConfigError::Invalid("poll_interval must be positive".into()));
        }
        for (name, timeout) in self.timing.timeouts() {
            if timeout <= interval {
                return Err(ConfigError::Invalid(format!(
                    "{name} ({timeout:?}) must be longer than poll_interval ({interval:?})"
                )));
            }
        }
        Ok(())
    }

    /// Get configuration for a specific scenario
    pub fn scenario_config(&self, name: &str) -> Option<&ScenarioConfig> {
        self.scenarios.get(name)
    }

    /// Scenarios not mentioned in the file are enabled
    pub fn is_scenario_enabled(&self, name: &str) -> bool {
        self.scenarios.get(name).map(|c| c.enabled).unwrap_or(true)
    }

    /// Keep the variants the scenario's config accepts
    pub fn filter_variants(&self, name: &str, variants: Vec<ScenarioParams>) -> Vec<ScenarioParams> {
        match self.scenarios.get(name) {
            Some(config) => variants.into_iter().filter(|p| config.accepts(p)).collect(),
            None => variants,
        }
    }

    /// Options for a scenario: its defaults overlaid with configured extras
    pub fn scenario_options(&self, name: &str, defaults: &ScenarioOptions) -> ScenarioOptions {
        self.scenarios
            .get(name)
            .map(|c| c.to_options(defaults))
            .unwrap_or_else(|| defaults.clone())
    }

    /// Generate a default configuration
    pub fn default_config() -> Self {
        let node = |name: &str, id: &str, role| NodeConfig {
            name: name.to_string(),
            id: id.to_string(),
            role,
            mgmt: true,
        };
        let client = |name: &str, kind, iface: &str, mac: &str| ClientConfig {
            name: name.to_string(),
            kind,
            iface: iface.to_string(),
            mac: mac.to_string(),
        };
        Config {
            testbed: TestbedConfig {
                name: "my-testbed".to_string(),
                gateway_url: "http://testbed-gw:8000".to_string(),
                nodes: vec![
                    node("gw", "S0000000001", NodeRole::Gw),
                    node("l1", "S0000000002", NodeRole::Leaf),
                    node("l2", "S0000000003", NodeRole::Leaf),
                ],
                clients: vec![
                    client("eth1", ClientKind::Eth, "eth0", "02:00:00:00:00:01"),
                    client("eth2", ClientKind::Eth, "eth0", "02:00:00:00:00:02"),
                    client("w1", ClientKind::Wifi, "wlan0", "02:00:00:00:00:03"),
                ],
                network: Some(WifiNetwork {
                    ssid: "home".to_string(),
                    key: "change-me".to_string(),
                }),
                test_server: Some("192.168.200.1".to_string()),
                kpi: KpiLimits::default(),
            },
            timing: Timing::default(),
            scenarios: {
                let mut scenarios = HashMap::new();
                scenarios.insert("wired_connection".to_string(), ScenarioConfig::default());
                scenarios.insert("plug_unplug_dynamic".to_string(), ScenarioConfig::default());
                scenarios
            },
        }
    }

    /// Serialize to YAML string
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SAMPLE_CONFIG: &str = r#"
testbed:
  name: lab-1
  gateway_url: http://localhost:8000
  nodes:
    - name: gw
      id: S0000000001
      role: gw
    - name: l1
      id: S0000000002
      role: leaf
      mgmt: false
  clients:
    - name: eth1
      kind: eth
      iface: eth0
      mac: "02:00:00:00:00:01"
    - name: w1
      kind: wifi
      iface: wlan0
      mac: "02:00:00:00:00:02"
  test_server: 10.10.0.1

timing:
  poll_interval: 2s
  cloud_timeout: 1m

scenarios:
  plug_unplug_dynamic:
    network_modes: [router]
    iterations: 2
  connect_wifi_client:
    enabled: false
"#;

    #[test]
    fn test_parse_config() {
        let config = Config::from_yaml(SAMPLE_CONFIG).unwrap();
        assert_eq!(config.testbed.name, "lab-1");
        assert_eq!(config.testbed.nodes.len(), 2);
        assert!(config.testbed.nodes[0].mgmt);
        assert!(!config.testbed.nodes[1].mgmt);
        assert_eq!(config.testbed.clients[1].kind, ClientKind::Wifi);
        assert_eq!(config.timing.poll_interval, Duration::from_secs(2));
        assert_eq!(config.timing.cloud_timeout, Duration::from_secs(60));
        assert_eq!(config.timing.dhcp_timeout, Duration::from_secs(200));
    }

    #[test]
    fn test_scenario_enabled() {
        let config = Config::from_yaml(SAMPLE_CONFIG).unwrap();
        assert!(config.is_scenario_enabled("plug_unplug_dynamic"));
        assert!(!config.is_scenario_enabled("connect_wifi_client"));
        assert!(config.is_scenario_enabled("unknown"));
    }

    #[test]
    fn test_filter_variants() {
        let config = Config::from_yaml(SAMPLE_CONFIG).unwrap();
        let variants = ScenarioParams::matrix(
            &[NetworkMode::Router, NetworkMode::Bridge],
            &[WanPort::Primary],
            &[NodeRole::Gw, NodeRole::Leaf],
        );
        let kept = config.filter_variants("plug_unplug_dynamic", variants.clone());
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|p| p.network_mode == NetworkMode::Router));
        assert_eq!(config.filter_variants("wired_connection", variants).len(), 4);
    }

    #[test]
    fn test_scenario_options_overlay_defaults() {
        let config = Config::from_yaml(SAMPLE_CONFIG).unwrap();
        let mut defaults = ScenarioOptions::default();
        defaults.extra.insert("iterations".into(), 4.into());
        defaults.extra.insert("attempts".into(), 3.into());

        let opts = config.scenario_options("plug_unplug_dynamic", &defaults);
        assert_eq!(opts.get_extra::<u32>("iterations"), Some(2));
        assert_eq!(opts.get_extra::<u32>("attempts"), Some(3));
    }

    #[test]
    fn test_rejects_two_gateways() {
        let yaml = SAMPLE_CONFIG.replace("role: leaf", "role: gw");
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("exactly one node"));
    }

    #[test]
    fn test_rejects_duplicate_clients() {
        let yaml = SAMPLE_CONFIG.replace("name: w1", "name: eth1");
        assert!(Config::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_rejects_timeout_below_interval() {
        let yaml = SAMPLE_CONFIG.replace("poll_interval: 2s", "poll_interval: 2m");
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("cloud_timeout"));
    }

    #[test]
    fn test_rejects_bad_url() {
        let yaml = SAMPLE_CONFIG.replace("http://localhost:8000", "not a url");
        assert!(matches!(
            Config::from_yaml(&yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_to_testbed() {
        let config = Config::from_yaml(SAMPLE_CONFIG).unwrap();
        let testbed = config.testbed.to_testbed().unwrap();
        assert_eq!(testbed.gateway().unwrap().name(), "gw");
        assert!(!testbed.pod("l1").unwrap().has_management());
        assert!(testbed.client("w1").is_some());
        assert_eq!(testbed.test_server.as_deref(), Some("10.10.0.1"));
    }

    #[test]
    fn test_default_config_roundtrip() {
        let config = Config::default_config();
        let yaml = config.to_yaml().unwrap();
        let parsed = Config::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.testbed.nodes.len(), 3);
        assert_eq!(parsed.timing, Timing::default());
    }
}
