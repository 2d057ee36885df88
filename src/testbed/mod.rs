//! Testbed collaborators
//!
//! The cloud controller, the managed switch, the pods and the test clients
//! are external services. Scenarios only see them through the traits in
//! this module; [`http`] implements all of them against a testbed gateway.

pub mod http;
mod types;

use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use http::{HttpCloud, HttpPod, HttpSwitch, HttpTestClient, TestbedClient};
pub use types::*;

/// Errors raised by testbed collaborators
#[derive(Debug, Error)]
pub enum TestbedError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("API error: {message} (status: {status})")]
    Api { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Command failed on {device}: {message}")]
    Command { device: String, message: String },

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Invalid testbed: {0}")]
    Invalid(String),
}

/// Result type for testbed operations
pub type TestbedResult<T> = Result<T, TestbedError>;

/// Cloud controller
#[async_trait]
pub trait Cloud: Send + Sync {
    /// Client as currently reported; may be empty or partial
    async fn client_details(&self, mac: &str) -> TestbedResult<ClientRecord>;

    /// Whether pods reached the queried state within the query timeout
    async fn pods_connected(&self, query: &ConnectivityQuery) -> TestbedResult<bool>;

    async fn network_mode(&self) -> TestbedResult<NetworkMode>;

    async fn set_network_mode(&self, mode: NetworkMode) -> TestbedResult<()>;

    async fn reboot_location(&self) -> TestbedResult<()>;

    async fn reboot_pod(&self, serial: &str) -> TestbedResult<()>;

    async fn device_nickname(&self, serial: &str) -> TestbedResult<String>;

    async fn rename_device(&self, serial: &str, nickname: &str) -> TestbedResult<()>;

    async fn set_ethernet_lan(&self, enabled: bool) -> TestbedResult<()>;

    /// Delete and re-add the location, re-onboarding every pod
    async fn recreate_location(&self) -> TestbedResult<()>;

    /// Restore location settings saved before the scenario
    async fn restore_location(&self) -> TestbedResult<()>;

    async fn home_ap_bssids(&self) -> TestbedResult<Vec<Bssid>>;
}

/// Managed switch between pods, clients and the uplink
#[async_trait]
pub trait Switch: Send + Sync {
    /// Attach a wired client to a free port of `pod`, returning the port alias
    async fn connect_eth_client(&self, pod: &str, client: &str) -> TestbedResult<String>;

    async fn disconnect_eth_client(&self, pod: &str, client: &str) -> TestbedResult<()>;

    /// Restore the default VLAN layout with the uplink on `wan_port`
    async fn recover_default_configuration(
        &self,
        pods: &[String],
        wan_port: WanPort,
    ) -> TestbedResult<()>;

    /// Move the uplink to the other gateway port, returning the new one
    async fn switch_wan_port(&self, pod: &str) -> TestbedResult<WanPort>;

    /// Alias of the port currently carrying the uplink
    async fn wan_port_alias(&self, pod: &str) -> TestbedResult<String>;

    async fn set_port_enabled(&self, alias: &str, enabled: bool) -> TestbedResult<()>;

    /// Switch ports wired to `pod`
    async fn port_aliases(&self, pod: &str) -> TestbedResult<Vec<String>>;
}

/// Mesh access point
#[async_trait]
pub trait Pod: Send + Sync {
    fn name(&self) -> &str;

    fn serial(&self) -> &str;

    fn role(&self) -> NodeRole;

    /// Whether the pod has a management channel for local probes
    fn has_management(&self) -> bool;

    async fn loop_protection_engaged(&self) -> TestbedResult<bool>;

    /// Names of failing sanity checks; empty when healthy
    async fn sanity_failures(&self) -> TestbedResult<Vec<String>>;

    async fn reboot(&self) -> TestbedResult<()>;
}

/// Wired or wireless test client
#[async_trait]
pub trait TestClient: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ClientKind;

    fn iface(&self) -> &str;

    fn mac(&self) -> &str;

    /// Run a shell command and return its stdout
    async fn run(&self, command: &str) -> TestbedResult<String>;

    /// Renew the DHCP lease, giving up after `timeout`
    async fn refresh_ip_address(&self, timeout: Duration) -> TestbedResult<()>;

    async fn stop_dhcp_client(&self) -> TestbedResult<()>;

    /// Ping `target`, or the internet when `None`
    async fn ping_check(&self, target: Option<&str>) -> TestbedResult<bool>;

    async fn wifi_connect(
        &self,
        network: &WifiNetwork,
        bssid: Option<&str>,
    ) -> TestbedResult<()>;

    async fn wifi_disconnect(&self) -> TestbedResult<()>;
}

/// Everything a scenario can touch
pub struct Testbed {
    pub name: String,
    pub cloud: Arc<dyn Cloud>,
    pub switch: Arc<dyn Switch>,
    pods: Vec<Arc<dyn Pod>>,
    clients: IndexMap<String, Arc<dyn TestClient>>,
    pub network: Option<WifiNetwork>,
    /// Host reachable through the mesh for large-frame pings
    pub test_server: Option<String>,
    pub kpi: KpiLimits,
}

impl Testbed {
    pub fn new(name: impl Into<String>, cloud: Arc<dyn Cloud>, switch: Arc<dyn Switch>) -> Self {
        Self {
            name: name.into(),
            cloud,
            switch,
            pods: Vec::new(),
            clients: IndexMap::new(),
            network: None,
            test_server: None,
            kpi: KpiLimits::default(),
        }
    }

    pub fn with_pod(mut self, pod: Arc<dyn Pod>) -> Self {
        self.pods.push(pod);
        self
    }

    pub fn with_client(mut self, client: Arc<dyn TestClient>) -> Self {
        self.clients.insert(client.name().to_string(), client);
        self
    }

    pub fn with_network(mut self, network: WifiNetwork) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_test_server(mut self, address: impl Into<String>) -> Self {
        self.test_server = Some(address.into());
        self
    }

    pub fn with_kpi(mut self, kpi: KpiLimits) -> Self {
        self.kpi = kpi;
        self
    }

    pub fn pods(&self) -> &[Arc<dyn Pod>] {
        &self.pods
    }

    pub fn pod(&self, name: &str) -> Option<&Arc<dyn Pod>> {
        self.pods.iter().find(|p| p.name() == name)
    }

    /// The pod configured with the gateway role
    pub fn gateway(&self) -> Option<&Arc<dyn Pod>> {
        self.pods.iter().find(|p| p.role().is_gateway())
    }

    pub fn leaves(&self) -> impl Iterator<Item = &Arc<dyn Pod>> {
        self.pods.iter().filter(|p| !p.role().is_gateway())
    }

    /// The gateway for [`NodeRole::Gw`], the first leaf otherwise
    pub fn pod_by_role(&self, role: NodeRole) -> Option<&Arc<dyn Pod>> {
        match role {
            NodeRole::Gw => self.gateway(),
            NodeRole::Leaf => self.leaves().next(),
        }
    }

    pub fn pod_names(&self) -> Vec<String> {
        self.pods.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn clients(&self) -> impl Iterator<Item = &Arc<dyn TestClient>> {
        self.clients.values()
    }

    pub fn client(&self, name: &str) -> Option<&Arc<dyn TestClient>> {
        self.clients.get(name)
    }

    pub fn clients_of_kind(&self, kind: ClientKind) -> impl Iterator<Item = &Arc<dyn TestClient>> {
        self.clients.values().filter(move |c| c.kind() == kind)
    }

    /// Check the structural assumptions scenarios rely on
    pub fn validate(&self) -> TestbedResult<()> {
        let gateways = self.pods.iter().filter(|p| p.role().is_gateway()).count();
        if gateways != 1 {
            return Err(TestbedError::Invalid(format!(
                "testbed {} must have exactly one gateway, found {gateways}",
                self.name
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Testbed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Testbed")
            .field("name", &self.name)
            .field("pods", &self.pod_names())
            .field("clients", &self.clients.keys().collect::<Vec<_>>())
            .finish()
    }
}
