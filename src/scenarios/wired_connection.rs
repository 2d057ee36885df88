//! Wired Connection Scenario
//!
//! Plugs wired clients into the gateway and a leaf and checks that they get
//! a lease, reach the internet and reach each other.
//!
//! ## What it checks
//!
//! 1. eth1 on the gateway obtains a lease and reaches the internet
//! 2. eth1 and eth2 on the same leaf both do the same
//! 3. The two clients can ping each other by their local addresses
//!
//! ## Variants
//!
//! router mode on the primary uplink, bridge mode on the secondary uplink.

use async_trait::async_trait;
use futures::FutureExt;
use std::sync::Arc;

use super::common::{
    connect_eth_client, disconnect_eth_client, ensure_reachable, recover_switch_step,
};
use super::steps::{StepFuture, StepPlan};
use super::traits::{Scenario, ScenarioContext, ScenarioParams, ScenarioReport};
use crate::testbed::{NetworkMode, NodeRole, Pod, WanPort};
use crate::verify::VerifyError;

/// Wired client connectivity through gateway and leaf
pub struct WiredConnectionScenario;

#[derive(Default)]
struct State {
    leaf: Option<Arc<dyn Pod>>,
}

impl State {
    fn leaf(&self) -> Result<&Arc<dyn Pod>, VerifyError> {
        self.leaf
            .as_ref()
            .ok_or_else(|| VerifyError::precondition("no leaf selected"))
    }
}

fn eth1_via_gateway<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        let gw = ctx.gateway()?;
        let eth1 = ctx.eth_client(0)?.as_ref();
        connect_eth_client(ctx, gw, eth1).await?;
        disconnect_eth_client(ctx, gw, eth1).await
    }
    .boxed()
}

fn eth1_via_leaf<'a>(ctx: &'a ScenarioContext, state: &'a mut State) -> StepFuture<'a> {
    async move {
        let leaf = ctx
            .testbed
            .pod_by_role(NodeRole::Leaf)
            .ok_or_else(|| VerifyError::precondition("testbed has no leaf pod"))?;
        state.leaf = Some(Arc::clone(leaf));
        connect_eth_client(ctx, leaf, ctx.eth_client(0)?.as_ref())
            .await
            .map(|_| ())
    }
    .boxed()
}

fn eth2_via_leaf<'a>(ctx: &'a ScenarioContext, state: &'a mut State) -> StepFuture<'a> {
    async move {
        connect_eth_client(ctx, state.leaf()?, ctx.eth_client(1)?.as_ref())
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

fn plan() -> StepPlan<State> {
    StepPlan::new("wired_connection")
        .step("recover_switch", recover_switch_step)
        .step("eth1_via_gateway", eth1_via_gateway)
        .step("eth1_via_leaf", eth1_via_leaf)
        .step("eth2_via_leaf", eth2_via_leaf)
        .step("clients_reach_each_other", clients_reach_each_other)
        .teardown("recover_switch", recover_switch_step)
}

#[async_trait]
impl Scenario for WiredConnectionScenario {
    fn name(&self) -> &'static str {
        "wired_connection"
    }

    fn description(&self) -> &'static str {
        "Wired clients on gateway and leaf get a lease and reach each other"
    }

    fn variants(&self) -> Vec<ScenarioParams> {
        vec![
            ScenarioParams::new(NetworkMode::Router, WanPort::Primary, NodeRole::Gw),
            ScenarioParams::new(NetworkMode::Bridge, WanPort::Secondary, NodeRole::Gw),
        ]
    }

    async fn run(&self, ctx: &ScenarioContext) -> ScenarioReport {
        plan().run(ctx, State::default()).await
    }
}
