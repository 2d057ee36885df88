//! Switching WAN Scenario
//!
//! Disturbs the gateway uplink in three ways and checks that a wired client
//! on the gateway gets back online each time.
//!
//! ## What it checks
//!
//! 1. Internet returns after a gateway reboot
//! 2. Internet returns after the uplink moves to the other gateway port
//! 3. Internet returns after the uplink port is disabled and re-enabled
//!
//! ## Options
//!
//! - `attempts`: repetitions of the port switch and of the port bounce
//!   (default: 3)

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{info, warn};

use super::common::{
    connect_eth_client, poll_internet, reboot_pod, recover_switch_step, wait_pods_disconnected,
    wait_pods_ready, wait_reboot_noticed,
};
use super::steps::{StepFuture, StepPlan};
use super::traits::{Scenario, ScenarioContext, ScenarioOptions, ScenarioParams, ScenarioReport};
use crate::testbed::{NetworkMode, NodeRole, WanPort};
use crate::verify::VerifyError;

const DEFAULT_ATTEMPTS: u32 = 3;

pub struct SwitchingWanScenario;

#[derive(Default)]
struct State {
    /// Uplink alias currently disabled on the switch
    disabled_port: Option<String>,
}

async fn back_online(ctx: &ScenarioContext) -> Result<(), VerifyError> {
    wait_pods_ready(ctx).await?;
    poll_internet(ctx, ctx.eth_client(0)?.as_ref(), ctx.timing.internet_timeout).await?;
    Ok(())
}

fn connect_client<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        connect_eth_client(ctx, ctx.gateway()?, ctx.eth_client(0)?.as_ref())
            .await
            .map(|_| ())
    }
    .boxed()
}

fn reboot_gateway<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        let gw = ctx.gateway()?;
        reboot_pod(ctx, gw).await?;
        wait_reboot_noticed(ctx, gw).await?;
        back_online(ctx).await
    }
    .boxed()
}

fn switch_uplink<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        let attempts = ctx.options.extra_or("attempts", DEFAULT_ATTEMPTS);
        let gw = ctx.gateway()?;
        for attempt in 1..=attempts {
            let port = ctx.testbed.switch.switch_wan_port(gw.name()).await?;
            info!(attempt = attempt, wan_port = %port, "Uplink moved");
            back_online(ctx).await?;
        }
        Ok(())
    }
    .boxed()
}

fn bounce_uplink<'a>(ctx: &'a ScenarioContext, state: &'a mut State) -> StepFuture<'a> {
    async move {
        let attempts = ctx.options.extra_or("attempts", DEFAULT_ATTEMPTS);
        let gw = ctx.gateway()?;
        let switch = ctx.testbed.switch.as_ref();
        for attempt in 1..=attempts {
            let alias = switch.wan_port_alias(gw.name()).await?;
            info!(attempt = attempt, port = %alias, "Disabling uplink port");
            switch.set_port_enabled(&alias, false).await?;
            state.disabled_port = Some(alias.clone());
            wait_pods_disconnected(ctx, &[gw], 1).await?;

            switch.set_port_enabled(&alias, true).await?;
            state.disabled_port = None;
            back_online(ctx).await?;
        }
        Ok(())
    }
    .boxed()
}

fn enable_uplink<'a>(ctx: &'a ScenarioContext, state: &'a mut State) -> StepFuture<'a> {
    async move {
        if let Some(alias) = state.disabled_port.take() {
            warn!(port = %alias, "Re-enabling uplink port left disabled");
            ctx.testbed.switch.set_port_enabled(&alias, true).await?;
        }
        Ok(())
    }
    .boxed()
}

fn plan() -> StepPlan<State> {
    StepPlan::new("switching_wan")
        .step("recover_switch", recover_switch_step)
        .step("connect_client", connect_client)
        .step("reboot_gateway", reboot_gateway)
        .step("switch_uplink", switch_uplink)
        .step("bounce_uplink", bounce_uplink)
        .teardown("enable_uplink", enable_uplink)
        .teardown("recover_switch", recover_switch_step)
}

#[async_trait]
impl Scenario for SwitchingWanScenario {
    fn name(&self) -> &'static str {
        "switching_wan"
    }

    fn description(&self) -> &'static str {
        "Gateway client regains internet after uplink disruptions"
    }

    fn variants(&self) -> Vec<ScenarioParams> {
        ScenarioParams::matrix(
            &[NetworkMode::Router, NetworkMode::Bridge],
            &[WanPort::Primary],
            &[NodeRole::Gw],
        )
    }

    async fn run(&self, ctx: &ScenarioContext) -> ScenarioReport {
        plan().run(ctx, State::default()).await
    }

    fn default_options(&self) -> ScenarioOptions {
        let mut opts = ScenarioOptions::default();
        opts.extra
            .insert("attempts".to_string(), DEFAULT_ATTEMPTS.into());
        opts
    }
}
