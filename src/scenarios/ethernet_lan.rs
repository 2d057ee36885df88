//! Disable Ethernet LAN Scenario
//!
//! Turns off the wired LAN ports through the cloud and checks that wired
//! clients lose service, then regain it once the ports are back.
//!
//! ## What it checks
//!
//! 1. Two wired clients reach the internet and each other
//! 2. With Ethernet LAN disabled neither reaches the internet or the other
//! 3. With it enabled again both recover after a lease renewal
//!
//! The clients go on the gateway and the first leaf when the gateway has a
//! spare switch port, otherwise on the first two leaves wired to the switch.

use async_trait::async_trait;
use futures::FutureExt;
use std::sync::Arc;
use tracing::info;

use super::common::{
    connect_eth_client, ensure_internet, ensure_isolated, ensure_no_internet, ensure_reachable,
    poll_internet, recover_switch_step,
};
use super::steps::{StepFuture, StepPlan};
use super::traits::{Scenario, ScenarioContext, ScenarioParams, ScenarioReport};
use crate::testbed::{NetworkMode, NodeRole, Pod, WanPort};
use crate::verify::{VerifyError, wait_for};

pub struct EthernetLanScenario;

#[derive(Default)]
struct State {
    /// Pods for the first and second wired client
    pods: Vec<Arc<dyn Pod>>,
}

async fn select_pods(ctx: &ScenarioContext) -> Result<Vec<Arc<dyn Pod>>, VerifyError> {
    let switch = ctx.testbed.switch.as_ref();
    let gw = ctx.gateway()?;
    let mut pods = Vec::with_capacity(2);
    if switch.port_aliases(gw.name()).await?.len() > 1 {
        pods.push(Arc::clone(gw));
    }
    for leaf in ctx.testbed.leaves() {
        if pods.len() == 2 {
            break;
        }
        if !switch.port_aliases(leaf.name()).await?.is_empty() {
            pods.push(Arc::clone(leaf));
        }
    }
    if pods.len() < 2 {
        return Err(VerifyError::precondition(
            "need a gateway with a spare port or two leaves with a switch port",
        ));
    }
    Ok(pods)
}

fn connect_clients<'a>(ctx: &'a ScenarioContext, state: &'a mut State) -> StepFuture<'a> {
    async move {
        state.pods = select_pods(ctx).await?;
        for (index, pod) in state.pods.iter().enumerate() {
            info!(pod = pod.name(), "Selected pod for wired client");
            connect_eth_client(ctx, pod, ctx.eth_client(index)?.as_ref()).await?;
        }
        Ok(())
    }
    .boxed()
}

fn check_connected<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        let eth1 = ctx.eth_client(0)?.as_ref();
        let eth2 = ctx.eth_client(1)?.as_ref();
        ensure_internet(eth1).await?;
        ensure_internet(eth2).await?;
        ensure_reachable(eth1, eth2).await
    }
    .boxed()
}

fn disable_lan<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        info!("Disabling Ethernet LAN");
        ctx.testbed.cloud.set_ethernet_lan(false).await?;
        Ok(())
    }
    .boxed()
}

fn check_cut_off<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        let eth1 = ctx.eth_client(0)?.as_ref();
        let eth2 = ctx.eth_client(1)?.as_ref();
        // The pods apply the setting asynchronously
        wait_for(
            &format!("internet lost on {}", eth1.name()),
            ctx.poll(ctx.timing.cloud_timeout)?,
            move || async move { eth1.ping_check(None).await },
            |ok: &bool| !*ok,
        )
        .await?;
        ensure_no_internet(eth2).await?;
        ensure_isolated(eth1, eth2).await
    }
    .boxed()
}

fn enable_lan<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        info!("Enabling Ethernet LAN");
        ctx.testbed.cloud.set_ethernet_lan(true).await?;
        Ok(())
    }
    .boxed()
}

fn check_recovered<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        let eth1 = ctx.eth_client(0)?.as_ref();
        let eth2 = ctx.eth_client(1)?.as_ref();
        poll_internet(ctx, eth1, ctx.timing.internet_timeout).await?;
        poll_internet(ctx, eth2, ctx.timing.internet_timeout).await?;
        ensure_reachable(eth1, eth2).await
    }
    .boxed()
}

fn plan() -> StepPlan<State> {
    StepPlan::new("disable_ethernet_lan")
        .step("recover_switch", recover_switch_step)
        .step("connect_clients", connect_clients)
        .step("check_connected", check_connected)
        .step("disable_lan", disable_lan)
        .step("check_cut_off", check_cut_off)
        .step("enable_lan", enable_lan)
        .step("check_recovered", check_recovered)
        .teardown("enable_lan", enable_lan)
        .teardown("recover_switch", recover_switch_step)
}

#[async_trait]
impl Scenario for EthernetLanScenario {
    fn name(&self) -> &'static str {
        "disable_ethernet_lan"
    }

    fn description(&self) -> &'static str {
        "Wired clients lose and regain service with Ethernet LAN toggled"
    }

    fn variants(&self) -> Vec<ScenarioParams> {
        ScenarioParams::matrix(
            &[NetworkMode::Bridge, NetworkMode::Router],
            &[WanPort::Primary],
            &[NodeRole::Gw],
        )
    }

    async fn run(&self, ctx: &ScenarioContext) -> ScenarioReport {
        plan().run(ctx, State::default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lan_enabled_in_teardown() {
        assert_eq!(plan().teardown_names(), vec!["enable_lan", "recover_switch"]);
    }

    #[test]
    fn test_variants() {
        let variants = EthernetLanScenario.variants();
        assert_eq!(variants[0].network_mode, NetworkMode::Bridge);
        assert_eq!(variants[1].network_mode, NetworkMode::Router);
    }
}
