//! Mock testbed layouts for unit and integration tests
//!
//! Provides plain-data descriptions of pods and clients plus a [`CallLog`]
//! for asserting the order in which fakes were driven.
//!
//! # Example
//!
//! ```rust
//! use meshcheck_testkit::mock::MockLocation;
//!
//! let location = MockLocation::standard(7);
//! assert_eq!(location.gateway().map(|p| p.name.as_str()), Some("gw"));
//! assert_eq!(location.leaves().count(), 2);
//! assert_eq!(location.eth_clients().count(), 2);
//! ```

use parking_lot::Mutex;
use std::sync::Arc;

use crate::random::PseudoGenerator;

/// Mock description of a pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockPod {
    pub name: String,
    pub serial: String,
    pub gateway: bool,
    /// Whether local probes are possible
    pub management: bool,
    /// Switch port aliases wired to the pod
    pub ports: Vec<String>,
}

impl MockPod {
    pub fn new(name: impl Into<String>, serial: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            ports: vec![format!("{name}_eth0"), format!("{name}_eth1")],
            name,
            serial: serial.into(),
            gateway: false,
            management: true,
        }
    }

    pub fn gateway(mut self) -> Self {
        self.gateway = true;
        self
    }

    pub fn without_management(mut self) -> Self {
        self.management = false;
        self
    }

    pub fn with_ports(mut self, ports: Vec<String>) -> Self {
        self.ports = ports;
        self
    }
}

/// Mock description of a test client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockClient {
    pub name: String,
    pub iface: String,
    pub mac: String,
    /// Address handed out by DHCP
    pub ip: String,
    pub wifi: bool,
}

impl MockClient {
    pub fn eth(name: impl Into<String>, mac: impl Into<String>, ip: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            iface: name.clone(),
            name,
            mac: mac.into(),
            ip: ip.into(),
            wifi: false,
        }
    }

    pub fn wifi(name: impl Into<String>, mac: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            wifi: true,
            iface: "wlan0".into(),
            ..Self::eth(name, mac, ip)
        }
    }
}

/// Mock location: pods plus clients
#[derive(Debug, Clone, Default)]
pub struct MockLocation {
    pub pods: Vec<MockPod>,
    pub clients: Vec<MockClient>,
}

impl MockLocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pod(mut self, pod: MockPod) -> Self {
        self.pods.push(pod);
        self
    }

    pub fn with_client(mut self, client: MockClient) -> Self {
        self.clients.push(client);
        self
    }

    /// Gateway, two leaves, two wired clients and one wireless client
    ///
    /// MACs and addresses are derived from `seed`.
    pub fn standard(seed: u64) -> Self {
        let mut rng = PseudoGenerator::new(seed);
        let subnet = "192.168.40";

        Self::new()
            .with_pod(MockPod::new("gw", "S0000000001").gateway())
            .with_pod(MockPod::new("l1", "S0000000002"))
            .with_pod(MockPod::new("l2", "S0000000003"))
            .with_client(MockClient::eth(
                "eth1",
                rng.random_mac(),
                rng.random_ipv4(subnet),
            ))
            .with_client(MockClient::eth(
                "eth2",
                rng.random_mac(),
                rng.random_ipv4(subnet),
            ))
            .with_client(MockClient::wifi(
                "w1",
                rng.random_mac(),
                rng.random_ipv4(subnet),
            ))
    }

    pub fn gateway(&self) -> Option<&MockPod> {
        self.pods.iter().find(|p| p.gateway)
    }

    pub fn leaves(&self) -> impl Iterator<Item = &MockPod> {
        self.pods.iter().filter(|p| !p.gateway)
    }

    pub fn eth_clients(&self) -> impl Iterator<Item = &MockClient> {
        self.clients.iter().filter(|c| !c.wifi)
    }

    pub fn client(&self, name: &str) -> Option<&MockClient> {
        self.clients.iter().find(|c| c.name == name)
    }
}

/// Shared, ordered record of calls made against fakes
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries.lock().iter().any(|e| e == entry)
    }

    /// Number of entries starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    /// Index of the first entry starting with `prefix`
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.entries
            .lock()
            .iter()
            .position(|e| e.starts_with(prefix))
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
