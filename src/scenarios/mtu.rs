//! Client Connectivity MTU Scenario
//!
//! Pings the testbed's test server with full-size frames and fragmentation
//! prohibited, so a mesh path that cannot carry a 1500 byte MTU end to end
//! fails the ping.
//!
//! ## Clients
//!
//! - wired: the first wired client on the gateway, after a lease renewal
//! - wireless: the WiFi client, once through every home AP BSSID
//!
//! The server address comes from `testbed.test_server` in the config.

use async_trait::async_trait;
use futures::FutureExt;
use tracing::info;

use super::common::{connect_eth_client, ensure_internet, recover_switch_step};
use super::steps::{StepFuture, StepPlan};
use super::traits::{Scenario, ScenarioContext, ScenarioParams, ScenarioReport};
use super::wifi::{disconnect, home_ap_targets, home_network};
use crate::testbed::{NetworkMode, NodeRole, TestClient, TestbedError, WanPort};
use crate::verify::VerifyError;

/// ICMP payload that fills a 1500 byte IPv4 frame
pub const MTU_PAYLOAD: usize = 1472;

/// Ping `server` five times with DF set and a full-size payload
pub fn mtu_ping_command(server: &str) -> String {
    format!("sudo /bin/ping -c 5 -w 60 -s {MTU_PAYLOAD} -M do {server}")
}

pub struct MtuScenario {
    wifi: bool,
}

impl MtuScenario {
    pub fn eth() -> Self {
        Self { wifi: false }
    }

    pub fn wifi() -> Self {
        Self { wifi: true }
    }
}

#[derive(Default)]
struct State {
    server: String,
}

/// Full-size frames reach `server` from `client`
async fn ensure_full_frames(client: &dyn TestClient, server: &str) -> Result<(), VerifyError> {
    info!(client = client.name(), server = server, "Pinging test server with full-size frames");
    match client.run(&mtu_ping_command(server)).await {
        Ok(_) => Ok(()),
        Err(TestbedError::Command { message, .. }) => Err(VerifyError::mismatch(
            format!("{MTU_PAYLOAD} byte ping from {} to {server}", client.name()),
            "answered",
            message,
        )),
        Err(e) => Err(e.into()),
    }
}

fn resolve_server<'a>(ctx: &'a ScenarioContext, state: &'a mut State) -> StepFuture<'a> {
    async move {
        state.server = ctx
            .testbed
            .test_server
            .clone()
            .ok_or_else(|| VerifyError::precondition("no test server configured"))?;
        Ok(())
    }
    .boxed()
}

fn connect_eth<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        connect_eth_client(ctx, ctx.gateway()?, ctx.eth_client(0)?.as_ref())
            .await
            .map(|_| ())
    }
    .boxed()
}

fn ping_server_eth<'a>(ctx: &'a ScenarioContext, state: &'a mut State) -> StepFuture<'a> {
    async move { ensure_full_frames(ctx.eth_client(0)?.as_ref(), &state.server).await }.boxed()
}

fn ping_server_each_bssid<'a>(ctx: &'a ScenarioContext, state: &'a mut State) -> StepFuture<'a> {
    async move {
        let network = home_network(ctx)?;
        let client = ctx.wifi_client()?.as_ref();
        for bssid in home_ap_targets(ctx).await? {
            client.wifi_connect(network, bssid.as_deref()).await?;
            ensure_internet(client).await?;
            ensure_full_frames(client, &state.server).await?;
            client.wifi_disconnect().await?;
        }
        Ok(())
    }
    .boxed()
}

fn plan(wifi: bool) -> StepPlan<State> {
    let plan = StepPlan::new(if wifi {
        "client_connectivity_mtu_wifi"
    } else {
        "client_connectivity_mtu"
    })
    .step("resolve_server", resolve_server);

    if wifi {
        plan.step("ping_server_each_bssid", ping_server_each_bssid)
            .teardown("disconnect", disconnect)
    } else {
        plan.step("recover_switch", recover_switch_step)
            .step("connect_client", connect_eth)
            .step("ping_server", ping_server_eth)
            .teardown("recover_switch", recover_switch_step)
    }
}

#[async_trait]
impl Scenario for MtuScenario {
    fn name(&self) -> &'static str {
        if self.wifi {
            "client_connectivity_mtu_wifi"
        } else {
            "client_connectivity_mtu"
        }
    }

    fn description(&self) -> &'static str {
        if self.wifi {
            "WiFi client passes full-size frames to the test server"
        } else {
            "Wired client passes full-size frames to the test server"
        }
    }

    fn variants(&self) -> Vec<ScenarioParams> {
        ScenarioParams::matrix(
            &[NetworkMode::Bridge, NetworkMode::Router],
            &[WanPort::Primary],
            &[NodeRole::Gw],
        )
    }

    async fn run(&self, ctx: &ScenarioContext) -> ScenarioReport {
        plan(self.wifi).run(ctx, State::default()).await
    }
}
