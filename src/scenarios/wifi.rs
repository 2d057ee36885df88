//! WiFi Client Scenario
//!
//! Connects the WiFi client to every home access point the cloud lists and
//! checks internet through each.
//!
//! Without any BSSID from the cloud the client joins the network once and
//! lets the driver pick the access point.

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{info, warn};

use super::common::ensure_internet;
use super::steps::{StepFuture, StepPlan};
use super::traits::{Scenario, ScenarioContext, ScenarioParams, ScenarioReport};
use crate::testbed::{NetworkMode, NodeRole, WanPort, WifiNetwork};
use crate::verify::VerifyError;

pub struct WifiClientScenario;

#[derive(Default)]
struct State;

/// BSSIDs to pin the client to, or a single `None` when the cloud lists none
pub(super) async fn home_ap_targets(ctx: &ScenarioContext) -> Result<Vec<Option<String>>, VerifyError> {
    let bssids = ctx.testbed.cloud.home_ap_bssids().await?;
    if bssids.is_empty() {
        warn!("Cloud lists no home AP BSSIDs, connecting without one");
        return Ok(vec![None]);
    }
    Ok(bssids.into_iter().map(|b| Some(b.bssid)).collect())
}

pub(super) fn home_network(ctx: &ScenarioContext) -> Result<&WifiNetwork, VerifyError> {
    ctx.testbed
        .network
        .as_ref()
        .ok_or_else(|| VerifyError::precondition("no WiFi network configured"))
}

fn connect_each_bssid<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        let network = home_network(ctx)?;
        let client = ctx.wifi_client()?.as_ref();

        for bssid in home_ap_targets(ctx).await? {
            info!(client = client.name(), ssid = %network.ssid, bssid = ?bssid, "Connecting WiFi client");
            client.wifi_connect(network, bssid.as_deref()).await?;
            ensure_internet(client).await?;
            client.wifi_disconnect().await?;
        }
        Ok(())
    }
    .boxed()
}

pub(super) fn disconnect<'a, S>(ctx: &'a ScenarioContext, _: &'a mut S) -> StepFuture<'a> {
    async move {
        ctx.wifi_client()?.wifi_disconnect().await?;
        Ok(())
    }
    .boxed()
}

fn plan() -> StepPlan<State> {
    StepPlan::new("connect_wifi_client")
        .step("connect_each_bssid", connect_each_bssid)
        .teardown("disconnect", disconnect)
}

#[async_trait]
impl Scenario for WifiClientScenario {
    fn name(&self) -> &'static str {
        "connect_wifi_client"
    }

    fn description(&self) -> &'static str {
        "WiFi client reaches the internet through every home access point"
    }

    fn variants(&self) -> Vec<ScenarioParams> {
        ScenarioParams::matrix(
            &[NetworkMode::Bridge, NetworkMode::Router],
            &[WanPort::Primary],
            &[NodeRole::Gw],
        )
    }

    async fn run(&self, ctx: &ScenarioContext) -> ScenarioReport {
        plan().run(ctx, State).await
    }
}
