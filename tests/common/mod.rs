//! In-memory testbed fakes shared by the integration tests
//!
//! Every fake appends to one [`CallLog`] so tests can assert the order in
//! which a scenario drove the devices. Values the harness polls for come
//! from [`Script`]s, so convergence can be staged call by call.

#![allow(dead_code)]

use async_trait::async_trait;
use meshcheck::scenarios::{ScenarioContext, ScenarioOptions, ScenarioParams, Timing};
use meshcheck::testbed::{
    Bssid, ClientKind, ClientRecord, Cloud, ConnState, ConnectivityQuery, NetworkMode, NodeRef,
    NodeRole, Pod, Switch, TestClient, Testbed, TestbedError, TestbedResult, WanPort, WifiNetwork,
};
use meshcheck_testkit::{CallLog, MockClient, MockLocation, MockPod, Script};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct FakeCloud {
    pub log: CallLog,
    pub mode: Mutex<NetworkMode>,
    /// Answer to "pods connected" gates
    pub connected: Script<bool>,
    /// Answer to "pods disconnected" gates
    pub disconnected: Script<bool>,
    /// Client records by MAC; unknown MACs report an empty record
    pub records: Mutex<HashMap<String, Arc<Script<ClientRecord>>>>,
    pub nicknames: Mutex<HashMap<String, String>>,
    pub bssids: Mutex<Vec<Bssid>>,
    /// Every connectivity gate asked, in order
    pub queries: Mutex<Vec<ConnectivityQuery>>,
}

impl FakeCloud {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            mode: Mutex::new(NetworkMode::Router),
            connected: Script::constant(true),
            disconnected: Script::constant(true),
            records: Mutex::new(HashMap::new()),
            nicknames: Mutex::new(HashMap::new()),
            bssids: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// (pods named, minimum) of every "pods disconnected" gate
    pub fn disconnect_gates(&self) -> Vec<(usize, Option<usize>)> {
        self.queries
            .lock()
            .iter()
            .filter(|q| q.expect == ConnState::Disconnected)
            .map(|q| (q.pods.len(), q.min_pods))
            .collect()
    }

    pub fn script_client(&self, mac: &str, records: impl IntoIterator<Item = ClientRecord>) {
        self.records
            .lock()
            .insert(mac.to_string(), Arc::new(Script::new(records)));
    }
}

#[async_trait]
impl Cloud for FakeCloud {
    async fn client_details(&self, mac: &str) -> TestbedResult<ClientRecord> {
        let script = self.records.lock().get(mac).cloned();
        Ok(script.map(|s| s.next()).unwrap_or_default())
    }

    async fn pods_connected(&self, query: &ConnectivityQuery) -> TestbedResult<bool> {
        self.log.record(format!("cloud pods {}", query.expect));
        self.queries.lock().push(query.clone());
        Ok(match query.expect {
            ConnState::Disconnected => self.disconnected.next(),
            _ => self.connected.next(),
        })
    }

    async fn network_mode(&self) -> TestbedResult<NetworkMode> {
        Ok(*self.mode.lock())
    }

    async fn set_network_mode(&self, mode: NetworkMode) -> TestbedResult<()> {
        self.log.record(format!("cloud mode {mode}"));
        *self.mode.lock() = mode;
        Ok(())
    }

    async fn reboot_location(&self) -> TestbedResult<()> {
        self.log.record("cloud reboot location");
        Ok(())
    }

    async fn reboot_pod(&self, serial: &str) -> TestbedResult<()> {
        self.log.record(format!("cloud reboot {serial}"));
        Ok(())
    }

    async fn device_nickname(&self, serial: &str) -> TestbedResult<String> {
        Ok(self
            .nicknames
            .lock()
            .get(serial)
            .cloned()
            .unwrap_or_else(|| format!("pod-{serial}")))
    }

    async fn rename_device(&self, serial: &str, nickname: &str) -> TestbedResult<()> {
        self.log.record(format!("cloud rename {serial}"));
        self.nicknames
            .lock()
            .insert(serial.to_string(), nickname.to_string());
        Ok(())
    }

    async fn set_ethernet_lan(&self, enabled: bool) -> TestbedResult<()> {
        self.log.record(format!("cloud ethernet_lan {enabled}"));
        Ok(())
    }

    async fn recreate_location(&self) -> TestbedResult<()> {
        self.log.record("cloud recreate location");
        Ok(())
    }

    async fn restore_location(&self) -> TestbedResult<()> {
        self.log.record("cloud restore location");
        Ok(())
    }

    async fn home_ap_bssids(&self) -> TestbedResult<Vec<Bssid>> {
        Ok(self.bssids.lock().clone())
    }
}

pub struct FakeSwitch {
    pub log: CallLog,
    pub ports: HashMap<String, Vec<String>>,
    pub wan_port: Mutex<WanPort>,
}

#[async_trait]
impl Switch for FakeSwitch {
    async fn connect_eth_client(&self, pod: &str, client: &str) -> TestbedResult<String> {
        self.log.record(format!("switch connect {client} {pod}"));
        let port = self
            .ports
            .get(pod)
            .and_then(|p| p.first())
            .ok_or_else(|| TestbedError::UnknownDevice(pod.to_string()))?;
        Ok(port.clone())
    }

    async fn disconnect_eth_client(&self, pod: &str, client: &str) -> TestbedResult<()> {
        self.log.record(format!("switch disconnect {client} {pod}"));
        Ok(())
    }

    async fn recover_default_configuration(
        &self,
        _pods: &[String],
        wan_port: WanPort,
    ) -> TestbedResult<()> {
        self.log.record(format!("switch recover {wan_port}"));
        *self.wan_port.lock() = wan_port;
        Ok(())
    }

    async fn switch_wan_port(&self, pod: &str) -> TestbedResult<WanPort> {
        let mut current = self.wan_port.lock();
        *current = current.other();
        self.log.record(format!("switch wan {pod} {}", *current));
        Ok(*current)
    }

    async fn wan_port_alias(&self, pod: &str) -> TestbedResult<String> {
        Ok(format!("{pod}_wan"))
    }

    async fn set_port_enabled(&self, alias: &str, enabled: bool) -> TestbedResult<()> {
        self.log.record(format!("switch port {alias} {enabled}"));
        Ok(())
    }

    async fn port_aliases(&self, pod: &str) -> TestbedResult<Vec<String>> {
        Ok(self.ports.get(pod).cloned().unwrap_or_default())
    }
}

pub struct FakePod {
    pub log: CallLog,
    pub name: String,
    pub serial: String,
    pub role: NodeRole,
    pub management: bool,
    pub loop_engaged: Script<bool>,
    pub sanity: Script<Vec<String>>,
}

impl FakePod {
    fn from_mock(mock: &MockPod, log: CallLog) -> Self {
        Self {
            log,
            name: mock.name.clone(),
            serial: mock.serial.clone(),
            role: if mock.gateway {
                NodeRole::Gw
            } else {
                NodeRole::Leaf
            },
            management: mock.management,
            loop_engaged: Script::constant(false),
            sanity: Script::constant(Vec::new()),
        }
    }
}

#[async_trait]
impl Pod for FakePod {
    fn name(&self) -> &str {
        &self.name
    }

    fn serial(&self) -> &str {
        &self.serial
    }

    fn role(&self) -> NodeRole {
        self.role
    }

    fn has_management(&self) -> bool {
        self.management
    }

    async fn loop_protection_engaged(&self) -> TestbedResult<bool> {
        Ok(self.loop_engaged.next())
    }

    async fn sanity_failures(&self) -> TestbedResult<Vec<String>> {
        self.log.record(format!("pod sanity {}", self.name));
        Ok(self.sanity.next())
    }

    async fn reboot(&self) -> TestbedResult<()> {
        self.log.record(format!("pod reboot {}", self.name));
        Ok(())
    }
}

pub struct FakeClient {
    pub log: CallLog,
    pub name: String,
    pub kind: ClientKind,
    pub iface: String,
    pub mac: String,
    pub ip: String,
    pub hostname: String,
    /// Internet ping results
    pub internet: Script<bool>,
    /// Ping results towards other clients
    pub peers: Script<bool>,
    /// Command prefixes that exit non-zero
    pub failing: Mutex<Vec<String>>,
}

impl FakeClient {
    fn from_mock(mock: &MockClient, log: CallLog) -> Self {
        Self {
            log,
            name: mock.name.clone(),
            kind: if mock.wifi {
                ClientKind::Wifi
            } else {
                ClientKind::Eth
            },
            iface: mock.iface.clone(),
            mac: mock.mac.clone(),
            ip: mock.ip.clone(),
            hostname: format!("{}-host", mock.name),
            internet: Script::constant(true),
            peers: Script::constant(true),
            failing: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TestClient for FakeClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ClientKind {
        self.kind
    }

    fn iface(&self) -> &str {
        &self.iface
    }

    fn mac(&self) -> &str {
        &self.mac
    }

    async fn run(&self, command: &str) -> TestbedResult<String> {
        self.log.record(format!("client {} run {command}", self.name));
        if self.failing.lock().iter().any(|p| command.starts_with(p.as_str())) {
            return Err(TestbedError::Command {
                device: self.name.clone(),
                message: "exit code 1: 100% packet loss".to_string(),
            });
        }
        if command.starts_with("ip -4 addr show") {
            return Ok(format!(
                "    inet {}/24 brd 192.168.40.255 scope global {}\n",
                self.ip, self.iface
            ));
        }
        if command == "hostname" {
            return Ok(format!("{}\n", self.hostname));
        }
        Ok(String::new())
    }

    async fn refresh_ip_address(&self, _timeout: Duration) -> TestbedResult<()> {
        self.log.record(format!("client {} dhcp", self.name));
        Ok(())
    }

    async fn stop_dhcp_client(&self) -> TestbedResult<()> {
        Ok(())
    }

    async fn ping_check(&self, target: Option<&str>) -> TestbedResult<bool> {
        self.log.record(format!(
            "client {} ping {}",
            self.name,
            target.unwrap_or("internet")
        ));
        Ok(match target {
            None => self.internet.next(),
            Some(_) => self.peers.next(),
        })
    }

    async fn wifi_connect(&self, network: &WifiNetwork, bssid: Option<&str>) -> TestbedResult<()> {
        self.log.record(format!(
            "client {} wifi {} {}",
            self.name,
            network.ssid,
            bssid.unwrap_or("any")
        ));
        Ok(())
    }

    async fn wifi_disconnect(&self) -> TestbedResult<()> {
        self.log.record(format!("client {} wifi off", self.name));
        Ok(())
    }
}

/// A fake testbed plus handles on every fake in it
pub struct FakeBed {
    pub log: CallLog,
    pub location: MockLocation,
    pub cloud: Arc<FakeCloud>,
    pub switch: Arc<FakeSwitch>,
    pub pods: HashMap<String, Arc<FakePod>>,
    pub clients: HashMap<String, Arc<FakeClient>>,
    pub testbed: Arc<Testbed>,
}

impl FakeBed {
    /// Standard location: gw, l1, l2, eth1, eth2 and w1
    pub fn standard() -> Self {
        Self::build(MockLocation::standard(7), |_| {})
    }

    /// Build from `location`, letting `tune` adjust the cloud before the
    /// testbed is assembled
    pub fn build(location: MockLocation, tune: impl FnOnce(&mut FakeCloud)) -> Self {
        let log = CallLog::new();
        let mut cloud = FakeCloud::new(log.clone());
        tune(&mut cloud);
        let cloud = Arc::new(cloud);
        let switch = Arc::new(FakeSwitch {
            log: log.clone(),
            ports: location
                .pods
                .iter()
                .map(|p| (p.name.clone(), p.ports.clone()))
                .collect(),
            wan_port: Mutex::new(WanPort::Primary),
        });

        let mut testbed = Testbed::new("fake", cloud.clone(), switch.clone())
            .with_network(WifiNetwork {
                ssid: "home".into(),
                key: "secret".into(),
            })
            .with_test_server("10.10.0.1");

        let mut pods = HashMap::new();
        for mock in &location.pods {
            let pod = Arc::new(FakePod::from_mock(mock, log.clone()));
            pods.insert(mock.name.clone(), Arc::clone(&pod));
            testbed = testbed.with_pod(pod);
        }
        let mut clients = HashMap::new();
        for mock in &location.clients {
            let client = Arc::new(FakeClient::from_mock(mock, log.clone()));
            clients.insert(mock.name.clone(), Arc::clone(&client));
            testbed = testbed.with_client(client);
        }

        Self {
            log,
            location,
            cloud,
            switch,
            pods,
            clients,
            testbed: Arc::new(testbed),
        }
    }

    pub fn context(&self, params: ScenarioParams) -> ScenarioContext {
        self.context_with(params, &[])
    }

    /// Context with integer scenario options such as `attempts`
    pub fn context_with(&self, params: ScenarioParams, options: &[(&str, u64)]) -> ScenarioContext {
        let mut opts = ScenarioOptions::default();
        for (key, value) in options {
            opts.extra.insert((*key).to_string(), (*value).into());
        }
        ScenarioContext::new(Arc::clone(&self.testbed), params, Timing::default(), opts)
    }

    pub fn client(&self, name: &str) -> &Arc<FakeClient> {
        &self.clients[name]
    }

    pub fn pod(&self, name: &str) -> &Arc<FakePod> {
        &self.pods[name]
    }
}

/// Cloud record for a connected client owned by `owner`
pub fn connected_record(mac: &str, ip: &str, owner: &str) -> ClientRecord {
    ClientRecord {
        mac: Some(mac.to_string()),
        connection_state: Some(ConnState::Connected),
        ip_address: Some(ip.to_string()),
        leaf_to_root: vec![NodeRef {
            id: owner.to_string(),
            name: None,
        }],
        ..ClientRecord::default()
    }
}

/// A connected record the cloud has named and typed
pub fn fingerprinted_record(mac: &str, ip: &str, owner: &str) -> ClientRecord {
    ClientRecord {
        name: Some("Living room laptop".to_string()),
        device_type: Some("laptop".to_string()),
        ..connected_record(mac, ip, owner)
    }
}
