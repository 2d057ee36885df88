//! Network Mode Scenarios
//!
//! Flips the location between router and bridge mode under live wired
//! clients.
//!
//! ## What it checks
//!
//! - `network_mode_change`: two clients on the leaf reach each other, keep
//!   doing so after one mode flip, and regain internet within budget
//! - `switching_network_mode`: a client on the gateway regains internet
//!   after each of `attempts` consecutive flips
//!
//! ## Options
//!
//! - `attempts`: flips for `switching_network_mode` (default: 3)

use async_trait::async_trait;
use futures::FutureExt;
use tracing::info;

use super::common::{
    connect_eth_client, ensure_reachable, poll_internet, pods_ready_step, recover_switch_step,
    wait_pods_ready,
};
use super::steps::{StepFuture, StepPlan};
use super::traits::{Scenario, ScenarioContext, ScenarioOptions, ScenarioParams, ScenarioReport};
use crate::testbed::{NetworkMode, NodeRole, WanPort};

/// Default number of consecutive flips
const DEFAULT_ATTEMPTS: u32 = 3;

/// One mode flip with clients on a leaf
pub struct NetworkModeChangeScenario;

/// Repeated mode flips with a client on the gateway
pub struct SwitchingNetworkModeScenario;

#[derive(Default)]
struct State;

fn connect_clients<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        let pod = ctx.target_pod()?;
        connect_eth_client(ctx, pod, ctx.eth_client(0)?.as_ref()).await?;
        connect_eth_client(ctx, pod, ctx.eth_client(1)?.as_ref()).await?;
        Ok(())
    }
    .boxed()
}

fn connect_client<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        connect_eth_client(ctx, ctx.target_pod()?, ctx.eth_client(0)?.as_ref())
            .await
            .map(|_| ())
    }
    .boxed()
}

fn clients_reach_each_other<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        let eth1 = ctx.eth_client(0)?.as_ref();
        let eth2 = ctx.eth_client(1)?.as_ref();
        ensure_reachable(eth1, eth2).await?;
        ensure_reachable(eth2, eth1).await
    }
    .boxed()
}

fn toggle_mode<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        let mode = ctx.params.network_mode.toggled();
        info!(mode = %mode, "Switching network mode");
        ctx.testbed.cloud.set_network_mode(mode).await?;
        Ok(())
    }
    .boxed()
}

fn internet_on_clients<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        for index in 0..2 {
            poll_internet(ctx, ctx.eth_client(index)?.as_ref(), ctx.timing.internet_timeout)
                .await?;
        }
        Ok(())
    }
    .boxed()
}

fn toggle_repeatedly<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        let attempts = ctx.options.extra_or("attempts", DEFAULT_ATTEMPTS);
        let client = ctx.eth_client(0)?.as_ref();
        let mut mode = ctx.params.network_mode;
        for attempt in 1..=attempts {
            mode = mode.toggled();
            info!(attempt = attempt, mode = %mode, "Switching network mode");
            ctx.testbed.cloud.set_network_mode(mode).await?;
            wait_pods_ready(ctx).await?;
            poll_internet(ctx, client, ctx.timing.internet_timeout).await?;
        }
        Ok(())
    }
    .boxed()
}

fn restore_mode<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        ctx.testbed
            .cloud
            .set_network_mode(ctx.params.network_mode)
            .await?;
        Ok(())
    }
    .boxed()
}

fn change_plan() -> StepPlan<State> {
    StepPlan::new("network_mode_change")
        .step("recover_switch", recover_switch_step)
        .step("connect_clients", connect_clients)
        .step("clients_reach_each_other", clients_reach_each_other)
        .step("toggle_mode", toggle_mode)
        .step("wait_ready", pods_ready_step)
        .step("internet_on_clients", internet_on_clients)
        .step("clients_reach_each_other_after_toggle", clients_reach_each_other)
        .teardown("restore_mode", restore_mode)
        .teardown("recover_switch", recover_switch_step)
}

fn switching_plan() -> StepPlan<State> {
    StepPlan::new("switching_network_mode")
        .step("recover_switch", recover_switch_step)
        .step("connect_client", connect_client)
        .step("toggle_repeatedly", toggle_repeatedly)
        .teardown("restore_mode", restore_mode)
        .teardown("recover_switch", recover_switch_step)
}

#[async_trait]
impl Scenario for NetworkModeChangeScenario {
    fn name(&self) -> &'static str {
        "network_mode_change"
    }

    fn description(&self) -> &'static str {
        "Leaf clients stay reachable across a network mode change"
    }

    fn variants(&self) -> Vec<ScenarioParams> {
        ScenarioParams::matrix(
            &[NetworkMode::Router, NetworkMode::Bridge],
            &[WanPort::Primary],
            &[NodeRole::Leaf],
        )
    }

    async fn run(&self, ctx: &ScenarioContext) -> ScenarioReport {
        change_plan().run(ctx, State).await
    }
}

#[async_trait]
impl Scenario for SwitchingNetworkModeScenario {
    fn name(&self) -> &'static str {
        "switching_network_mode"
    }

    fn description(&self) -> &'static str {
        "Gateway client regains internet after repeated mode changes"
    }

    fn variants(&self) -> Vec<ScenarioParams> {
        vec![ScenarioParams::new(
            NetworkMode::Bridge,
            WanPort::Primary,
            NodeRole::Gw,
        )]
    }

    async fn run(&self, ctx: &ScenarioContext) -> ScenarioReport {
        switching_plan().run(ctx, State).await
    }

    fn default_options(&self) -> ScenarioOptions {
        let mut opts = ScenarioOptions::default();
        opts.extra
            .insert("attempts".to_string(), DEFAULT_ATTEMPTS.into());
        opts
    }
}
