//! Wired Clients After Reboot Scenario
//!
//! Attaches two wired clients to a leaf, reboots part of the mesh and
//! checks that both clients come back.
//!
//! ## What it checks
//!
//! 1. Both clients connect to a leaf with at least two switch ports
//! 2. After the reboot the controller sees the pods drop and return
//! 3. Sanity and loop protection settle on every pod
//! 4. Both clients renew their lease and reach the internet
//!
//! ## Targets
//!
//! - `reboot_location`: the whole location through the cloud
//! - `reboot_leaf`: the leaf the clients hang off
//! - `reboot_gw`: the gateway

use async_trait::async_trait;
use futures::FutureExt;
use std::sync::Arc;
use tracing::info;

use super::common::{
    acquire_dhcp, connect_eth_client, ensure_internet, leaf_with_ports, reboot_pod,
    recover_switch_step, wait_pods_disconnected, wait_pods_ready,
};
use super::steps::{StepFuture, StepPlan};
use super::traits::{Scenario, ScenarioContext, ScenarioParams, ScenarioReport};
use crate::testbed::{NetworkMode, NodeRole, Pod, WanPort};
use crate::verify::VerifyError;

/// What gets rebooted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootTarget {
    Location,
    Leaf,
    Gw,
}

impl std::fmt::Display for RebootTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RebootTarget::Location => write!(f, "location"),
            RebootTarget::Leaf => write!(f, "leaf"),
            RebootTarget::Gw => write!(f, "gw"),
        }
    }
}

/// Wired clients survive a reboot
pub struct AfterRebootScenario {
    target: RebootTarget,
}

impl AfterRebootScenario {
    pub fn new(target: RebootTarget) -> Self {
        Self { target }
    }
}

struct State {
    target: RebootTarget,
    leaf: Option<Arc<dyn Pod>>,
}

impl State {
    fn leaf(&self) -> Result<&Arc<dyn Pod>, VerifyError> {
        self.leaf
            .as_ref()
            .ok_or_else(|| VerifyError::precondition("no leaf selected"))
    }
}

fn select_leaf<'a>(ctx: &'a ScenarioContext, state: &'a mut State) -> StepFuture<'a> {
    async move {
        let leaf = leaf_with_ports(ctx, 2).await?;
        info!(leaf = leaf.name(), "Selected leaf");
        state.leaf = Some(leaf);
        Ok(())
    }
    .boxed()
}

fn connect_clients<'a>(ctx: &'a ScenarioContext, state: &'a mut State) -> StepFuture<'a> {
    async move {
        let leaf = state.leaf()?;
        connect_eth_client(ctx, leaf, ctx.eth_client(0)?.as_ref()).await?;
        connect_eth_client(ctx, leaf, ctx.eth_client(1)?.as_ref()).await?;
        Ok(())
    }
    .boxed()
}

fn reboot<'a>(ctx: &'a ScenarioContext, state: &'a mut State) -> StepFuture<'a> {
    async move {
        info!(target = %state.target, "Rebooting");
        match state.target {
            RebootTarget::Location => ctx.testbed.cloud.reboot_location().await?,
            RebootTarget::Leaf => reboot_pod(ctx, state.leaf()?).await?,
            RebootTarget::Gw => reboot_pod(ctx, ctx.gateway()?).await?,
        }
        Ok(())
    }
    .boxed()
}

fn wait_ready<'a>(ctx: &'a ScenarioContext, state: &'a mut State) -> StepFuture<'a> {
    async move {
        match state.target {
            RebootTarget::Location => {
                let all: Vec<&Arc<dyn Pod>> = ctx.testbed.pods().iter().collect();
                let min = all.len().min(2);
                wait_pods_disconnected(ctx, &all, min).await?;
            }
            RebootTarget::Leaf => wait_pods_disconnected(ctx, &[state.leaf()?], 1).await?,
            RebootTarget::Gw => wait_pods_disconnected(ctx, &[ctx.gateway()?], 1).await?,
        }
        wait_pods_ready(ctx).await.map(|_| ())
    }
    .boxed()
}

fn renew_leases<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        for index in 0..2 {
            acquire_dhcp(ctx.eth_client(index)?.as_ref(), ctx.timing.internet_timeout).await?;
        }
        Ok(())
    }
    .boxed()
}

fn check_internet<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        ensure_internet(ctx.eth_client(0)?.as_ref()).await?;
        ensure_internet(ctx.eth_client(1)?.as_ref()).await
    }
    .boxed()
}

fn plan(name: &'static str) -> StepPlan<State> {
    StepPlan::new(name)
        .step("recover_switch", recover_switch_step)
        .step("select_leaf", select_leaf)
        .step("connect_clients", connect_clients)
        .step("reboot", reboot)
        .step("wait_ready", wait_ready)
        .step("renew_leases", renew_leases)
        .step("check_internet", check_internet)
        .teardown("recover_switch", recover_switch_step)
}

#[async_trait]
impl Scenario for AfterRebootScenario {
    fn name(&self) -> &'static str {
        match self.target {
            RebootTarget::Location => "reboot_location",
            RebootTarget::Leaf => "reboot_leaf",
            RebootTarget::Gw => "reboot_gw",
        }
    }

    fn description(&self) -> &'static str {
        match self.target {
            RebootTarget::Location => "Wired clients on a leaf recover after a location reboot",
            RebootTarget::Leaf => "Wired clients recover after their leaf reboots",
            RebootTarget::Gw => "Wired clients on a leaf recover after a gateway reboot",
        }
    }

    fn variants(&self) -> Vec<ScenarioParams> {
        let modes: &[NetworkMode] = match self.target {
            RebootTarget::Location => &[NetworkMode::Router, NetworkMode::Bridge],
            RebootTarget::Leaf | RebootTarget::Gw => &[NetworkMode::Router],
        };
        ScenarioParams::matrix(modes, &[WanPort::Primary], &[NodeRole::Leaf])
    }

    async fn run(&self, ctx: &ScenarioContext) -> ScenarioReport {
        let state = State {
            target: self.target,
            leaf: None,
        };
        plan(self.name()).run(ctx, state).await
    }
}
