//! Testbed gateway client
//!
//! The lab exposes the cloud controller, the switch, pod management and
//! client shells behind one REST gateway. This module maps the collaborator
//! traits onto that gateway; it owns no protocol of its own.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::{
    Bssid, ClientKind, ClientRecord, Cloud, ConnectivityQuery, NetworkMode, NodeRole, Pod,
    Switch, TestClient, TestbedError, TestbedResult, WanPort, WifiNetwork,
};

/// Default per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Extra time granted on top of a server-side wait
const SERVER_WAIT_SLACK: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConnectedResponse {
    connected: bool,
}

#[derive(Debug, Deserialize, Serialize)]
struct ModeBody {
    mode: NetworkMode,
}

#[derive(Debug, Deserialize)]
struct NicknameResponse {
    nickname: String,
}

#[derive(Debug, Deserialize)]
struct PortResponse {
    port: String,
}

#[derive(Debug, Deserialize)]
struct WanPortResponse {
    wan_port: WanPort,
}

#[derive(Debug, Deserialize)]
struct LoopStatus {
    engaged: bool,
}

#[derive(Debug, Deserialize)]
struct SanityResponse {
    #[serde(default)]
    failures: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
    exit_code: i32,
}

#[derive(Debug, Deserialize)]
struct PingResponse {
    ok: bool,
}

/// HTTP client for the testbed gateway
///
/// # Example
/// ```no_run
/// use meshcheck::testbed::TestbedClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = TestbedClient::new("http://testbed-gw:8000/api")?;
/// println!("Gateway: {}", client.base_url());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TestbedClient {
    base_url: Url,
    client: Client,
}

impl TestbedClient {
    /// Create a client for the gateway at `gateway_url`
    pub fn new(gateway_url: &str) -> TestbedResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Self::with_client(gateway_url, client)
    }

    pub fn with_client(gateway_url: &str, client: Client) -> TestbedResult<Self> {
        // Url::join drops the last segment unless the base ends in '/'
        let mut base_url = Url::parse(gateway_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> TestbedResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn send(&self, request: RequestBuilder) -> TestbedResult<Response> {
        let response = request.send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status().as_u16();
            let error: ApiError = response
                .json()
                .await
                .unwrap_or(ApiError { message: None });
            Err(TestbedError::Api {
                status,
                message: error.message.unwrap_or_else(|| "Unknown error".into()),
            })
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> TestbedResult<T> {
        let url = self.endpoint(path)?;
        Ok(self.send(self.client.get(url)).await?.json().await?)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> TestbedResult<T> {
        let url = self.endpoint(path)?;
        let mut request = self.client.post(url).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        Ok(self.send(request).await?.json().await?)
    }

    async fn post_action<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> TestbedResult<()> {
        let url = self.endpoint(path)?;
        self.send(self.client.post(url).json(body)).await?;
        Ok(())
    }
}

/// Cloud controller behind the gateway
#[derive(Debug, Clone)]
pub struct HttpCloud {
    client: Arc<TestbedClient>,
}

impl HttpCloud {
    pub fn new(client: Arc<TestbedClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Cloud for HttpCloud {
    async fn client_details(&self, mac: &str) -> TestbedResult<ClientRecord> {
        match self.client.get(&format!("cloud/clients/{mac}")).await {
            // Controller has not seen the client yet
            Err(TestbedError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(ClientRecord::default())
            }
            other => other,
        }
    }

    async fn pods_connected(&self, query: &ConnectivityQuery) -> TestbedResult<bool> {
        let response: ConnectedResponse = self
            .client
            .post(
                "cloud/pods/connected",
                query,
                Some(query.timeout + SERVER_WAIT_SLACK),
            )
            .await?;
        Ok(response.connected)
    }

    async fn network_mode(&self) -> TestbedResult<NetworkMode> {
        let body: ModeBody = self.client.get("cloud/network-mode").await?;
        Ok(body.mode)
    }

    async fn set_network_mode(&self, mode: NetworkMode) -> TestbedResult<()> {
        self.client
            .post_action("cloud/network-mode", &ModeBody { mode })
            .await
    }

    async fn reboot_location(&self) -> TestbedResult<()> {
        self.client.post_action("cloud/reboot", &json!({})).await
    }

    async fn reboot_pod(&self, serial: &str) -> TestbedResult<()> {
        self.client
            .post_action(&format!("cloud/pods/{serial}/reboot"), &json!({}))
            .await
    }

    async fn device_nickname(&self, serial: &str) -> TestbedResult<String> {
        let body: NicknameResponse = self
            .client
            .get(&format!("cloud/pods/{serial}/nickname"))
            .await?;
        Ok(body.nickname)
    }

    async fn rename_device(&self, serial: &str, nickname: &str) -> TestbedResult<()> {
        self.client
            .post_action(
                &format!("cloud/pods/{serial}/nickname"),
                &json!({ "nickname": nickname }),
            )
            .await
    }

    async fn set_ethernet_lan(&self, enabled: bool) -> TestbedResult<()> {
        self.client
            .post_action("cloud/ethernet-lan", &json!({ "enabled": enabled }))
            .await
    }

    async fn recreate_location(&self) -> TestbedResult<()> {
        self.client
            .post_action("cloud/location/recreate", &json!({}))
            .await
    }

    async fn restore_location(&self) -> TestbedResult<()> {
        self.client
            .post_action("cloud/location/restore", &json!({}))
            .await
    }

    async fn home_ap_bssids(&self) -> TestbedResult<Vec<Bssid>> {
        self.client.get("cloud/bssids").await
    }
}

/// Managed switch behind the gateway
#[derive(Debug, Clone)]
pub struct HttpSwitch {
    client: Arc<TestbedClient>,
}

impl HttpSwitch {
    pub fn new(client: Arc<TestbedClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Switch for HttpSwitch {
    async fn connect_eth_client(&self, pod: &str, client: &str) -> TestbedResult<String> {
        let body: PortResponse = self
            .client
            .post(
                "switch/connect",
                &json!({ "pod": pod, "client": client }),
                None,
            )
            .await?;
        Ok(body.port)
    }

    async fn disconnect_eth_client(&self, pod: &str, client: &str) -> TestbedResult<()> {
        self.client
            .post_action("switch/disconnect", &json!({ "pod": pod, "client": client }))
            .await
    }

    async fn recover_default_configuration(
        &self,
        pods: &[String],
        wan_port: WanPort,
    ) -> TestbedResult<()> {
        self.client
            .post_action(
                "switch/recover",
                &json!({ "pods": pods, "wan_port": wan_port }),
            )
            .await
    }

    async fn switch_wan_port(&self, pod: &str) -> TestbedResult<WanPort> {
        let body: WanPortResponse = self
            .client
            .post(&format!("switch/pods/{pod}/wan/switch"), &json!({}), None)
            .await?;
        Ok(body.wan_port)
    }

    async fn wan_port_alias(&self, pod: &str) -> TestbedResult<String> {
        let body: PortResponse = self.client.get(&format!("switch/pods/{pod}/wan")).await?;
        Ok(body.port)
    }

    async fn set_port_enabled(&self, alias: &str, enabled: bool) -> TestbedResult<()> {
        self.client
            .post_action(
                &format!("switch/ports/{alias}"),
                &json!({ "enabled": enabled }),
            )
            .await
    }

    async fn port_aliases(&self, pod: &str) -> TestbedResult<Vec<String>> {
        self.client.get(&format!("switch/pods/{pod}/ports")).await
    }
}

/// Pod management channel behind the gateway
#[derive(Debug, Clone)]
pub struct HttpPod {
    client: Arc<TestbedClient>,
    name: String,
    serial: String,
    role: NodeRole,
    management: bool,
}

impl HttpPod {
    pub fn new(
        client: Arc<TestbedClient>,
        name: impl Into<String>,
        serial: impl Into<String>,
        role: NodeRole,
    ) -> Self {
        Self {
            client,
            name: name.into(),
            serial: serial.into(),
            role,
            management: true,
        }
    }

    pub fn with_management(mut self, management: bool) -> Self {
        self.management = management;
        self
    }
}

#[async_trait]
impl Pod for HttpPod {
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
        let status: LoopStatus = self
            .client
            .get(&format!("pods/{}/loop-status", self.name))
            .await?;
        Ok(status.engaged)
    }

    async fn sanity_failures(&self) -> TestbedResult<Vec<String>> {
        let sanity: SanityResponse = self
            .client
            .get(&format!("pods/{}/sanity", self.name))
            .await?;
        Ok(sanity.failures)
    }

    async fn reboot(&self) -> TestbedResult<()> {
        self.client
            .post_action(&format!("pods/{}/reboot", self.name), &json!({}))
            .await
    }
}

/// Test client shell behind the gateway
#[derive(Debug, Clone)]
pub struct HttpTestClient {
    client: Arc<TestbedClient>,
    name: String,
    kind: ClientKind,
    iface: String,
    mac: String,
}

impl HttpTestClient {
    pub fn new(
        client: Arc<TestbedClient>,
        name: impl Into<String>,
        kind: ClientKind,
        iface: impl Into<String>,
        mac: impl Into<String>,
    ) -> Self {
        Self {
            client,
            name: name.into(),
            kind,
            iface: iface.into(),
            mac: mac.into(),
        }
    }

    fn path(&self, action: &str) -> String {
        format!("clients/{}/{action}", self.name)
    }
}

#[async_trait]
impl TestClient for HttpTestClient {
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
        let output: RunResponse = self
            .client
            .post(&self.path("run"), &json!({ "command": command }), None)
            .await?;
        if output.exit_code == 0 {
            Ok(output.stdout)
        } else {
            Err(TestbedError::Command {
                device: self.name.clone(),
                message: format!("exit code {}: {}", output.exit_code, output.stderr.trim()),
            })
        }
    }

    async fn refresh_ip_address(&self, timeout: Duration) -> TestbedResult<()> {
        let _: serde_json::Value = self
            .client
            .post(
                &self.path("dhcp/refresh"),
                &json!({ "timeout_secs": timeout.as_secs() }),
                Some(timeout + SERVER_WAIT_SLACK),
            )
            .await?;
        Ok(())
    }

    async fn stop_dhcp_client(&self) -> TestbedResult<()> {
        self.client
            .post_action(&self.path("dhcp/stop"), &json!({}))
            .await
    }

    async fn ping_check(&self, target: Option<&str>) -> TestbedResult<bool> {
        let response: PingResponse = self
            .client
            .post(&self.path("ping"), &json!({ "target": target }), None)
            .await?;
        Ok(response.ok)
    }

    async fn wifi_connect(
        &self,
        network: &WifiNetwork,
        bssid: Option<&str>,
    ) -> TestbedResult<()> {
        self.client
            .post_action(
                &self.path("wifi/connect"),
                &json!({ "ssid": network.ssid, "key": network.key, "bssid": bssid }),
            )
            .await
    }

    async fn wifi_disconnect(&self) -> TestbedResult<()> {
        self.client
            .post_action(&self.path("wifi/disconnect"), &json!({}))
            .await
    }
}
