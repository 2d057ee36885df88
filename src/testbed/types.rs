//! Testbed data types
//!
//! Shapes of the records exchanged with the testbed gateway. Cloud records
//! are deliberately lenient: while state converges the controller returns
//! partial or empty objects, so nearly every field is optional.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Network mode of the location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// Gateway pod routes and serves DHCP
    #[default]
    Router,
    /// Gateway pod bridges to the upstream router
    Bridge,
}

impl NetworkMode {
    /// The other mode
    pub fn toggled(self) -> Self {
        match self {
            NetworkMode::Router => NetworkMode::Bridge,
            NetworkMode::Bridge => NetworkMode::Router,
        }
    }
}

impl std::fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkMode::Router => write!(f, "router"),
            NetworkMode::Bridge => write!(f, "bridge"),
        }
    }
}

/// Which switch port of the gateway carries the uplink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WanPort {
    #[default]
    Primary,
    Secondary,
}

impl WanPort {
    pub fn other(self) -> Self {
        match self {
            WanPort::Primary => WanPort::Secondary,
            WanPort::Secondary => WanPort::Primary,
        }
    }
}

impl std::fmt::Display for WanPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WanPort::Primary => write!(f, "primary"),
            WanPort::Secondary => write!(f, "secondary"),
        }
    }
}

/// Role of a pod in the mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Gateway, holds the uplink
    Gw,
    /// Extender reached over the backhaul
    #[default]
    Leaf,
}

impl NodeRole {
    pub fn is_gateway(&self) -> bool {
        matches!(self, NodeRole::Gw)
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Gw => write!(f, "gw"),
            NodeRole::Leaf => write!(f, "leaf"),
        }
    }
}

/// Connection state as reported by the cloud
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnState {
    Connected,
    Disconnected,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for ConnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnState::Connected => write!(f, "connected"),
            ConnState::Disconnected => write!(f, "disconnected"),
            ConnState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Kind of test client attached to the testbed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    #[default]
    Eth,
    Wifi,
}

/// Hop in the client's path to the gateway
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    /// Pod serial
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Client as reported by the cloud controller
///
/// Endpoint: GET /cloud/clients/{mac}
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    #[serde(default)]
    pub mac: Option<String>,
    /// Display name assigned by fingerprinting
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub connection_state: Option<ConnState>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    /// Owning pod first, gateway last
    #[serde(default)]
    pub leaf_to_root: Vec<NodeRef>,
}

impl ClientRecord {
    pub fn is_connected(&self) -> bool {
        self.connection_state == Some(ConnState::Connected)
    }

    /// Connected with an address assigned
    pub fn is_connected_with_ip(&self) -> bool {
        self.is_connected() && self.ip_address.as_deref().is_some_and(|ip| !ip.is_empty())
    }

    pub fn is_disconnected(&self) -> bool {
        self.connection_state == Some(ConnState::Disconnected)
    }

    /// Serial of the pod the client is attached to
    pub fn owner_id(&self) -> Option<&str> {
        self.leaf_to_root.first().map(|n| n.id.as_str())
    }

    pub fn has_device_type(&self) -> bool {
        self.device_type
            .as_deref()
            .is_some_and(|t| !t.is_empty() && !t.eq_ignore_ascii_case("unknown"))
    }

    /// Fingerprinting finished: typed, named and addressed
    pub fn is_fingerprinted(&self) -> bool {
        let named = match (self.name.as_deref(), self.mac.as_deref()) {
            (Some(name), Some(mac)) => !name.is_empty() && !name.eq_ignore_ascii_case(mac),
            (Some(name), None) => !name.is_empty(),
            (None, _) => false,
        };
        self.is_connected_with_ip() && self.has_device_type() && named
    }
}

/// Cloud-side connectivity gate
///
/// The controller waits up to `timeout` for the pods to reach `expect`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityQuery {
    /// Pod serials; empty means every pod of the location
    #[serde(default)]
    pub pods: Vec<String>,
    pub expect: ConnState,
    /// Minimum number of pods that must reach the state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_pods: Option<usize>,
    /// Only require the controller link, not the full backhaul
    #[serde(default)]
    pub controller_only: bool,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl ConnectivityQuery {
    pub fn connected(timeout: Duration) -> Self {
        Self {
            pods: Vec::new(),
            expect: ConnState::Connected,
            min_pods: None,
            controller_only: false,
            timeout,
        }
    }

    pub fn disconnected(timeout: Duration) -> Self {
        Self {
            expect: ConnState::Disconnected,
            ..Self::connected(timeout)
        }
    }

    pub fn with_pods(mut self, pods: Vec<String>) -> Self {
        self.pods = pods;
        self
    }

    pub fn with_min_pods(mut self, min_pods: usize) -> Self {
        self.min_pods = Some(min_pods);
        self
    }

    pub fn controller_only(mut self) -> Self {
        self.controller_only = true;
        self
    }

    /// Human readable expectation, used in failure messages
    pub fn describe(&self) -> String {
        let scope = if self.pods.is_empty() {
            "all pods".to_string()
        } else {
            self.pods.join(", ")
        };
        match self.min_pods {
            Some(min) => format!("at least {min} of {scope} {}", self.expect),
            None => format!("{scope} {}", self.expect),
        }
    }
}

/// Home access point radio as reported by the cloud
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bssid {
    pub bssid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band: Option<String>,
}

/// WiFi credentials of the home network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiNetwork {
    pub ssid: String,
    pub key: String,
}

/// Onboarding budgets used by the static-mode KPIs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KpiLimits {
    #[serde(with = "humantime_serde", default = "default_gw_onboard")]
    pub cloud_gw_onboard_time: Duration,
    #[serde(with = "humantime_serde", default = "default_leaf_onboard")]
    pub cloud_leaf_onboard_time: Duration,
}

fn default_gw_onboard() -> Duration {
    Duration::from_secs(120)
}

fn default_leaf_onboard() -> Duration {
    Duration::from_secs(180)
}

impl Default for KpiLimits {
    fn default() -> Self {
        Self {
            cloud_gw_onboard_time: default_gw_onboard(),
            cloud_leaf_onboard_time: default_leaf_onboard(),
        }
    }
}

impl KpiLimits {
    pub fn onboard_time(&self, role: NodeRole) -> Duration {
        match role {
            NodeRole::Gw => self.cloud_gw_onboard_time,
            NodeRole::Leaf => self.cloud_leaf_onboard_time,
        }
    }
}
