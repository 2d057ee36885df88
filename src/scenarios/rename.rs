//! Connect, Disconnect and Rename Scenario
//!
//! Renames the gateway through the cloud while a wired client is attached
//! and checks the client is unaffected, then reconnects it repeatedly.
//!
//! ## What it checks
//!
//! 1. The cloud reports the gateway nickname
//! 2. The client reaches the internet before and after the rename
//! 3. The cloud reports the new nickname
//! 4. The client reconnects `attempts` times
//! 5. Sanity passes on every pod afterwards
//!
//! ## Options
//!
//! - `attempts`: number of reconnect cycles (default: 4)

use async_trait::async_trait;
use futures::FutureExt;
use rand::Rng;
use std::time::Duration;
use tracing::info;

use super::common::{
    connect_eth_client, disconnect_eth_client, ensure_internet, recover_switch_step, sanity_step,
};
use super::steps::{StepFuture, StepPlan};
use super::traits::{Scenario, ScenarioContext, ScenarioOptions, ScenarioParams, ScenarioReport};
use crate::testbed::{NetworkMode, NodeRole, WanPort};
use crate::verify::{VerifyError, wait_for};

/// Default number of reconnect cycles
const DEFAULT_ATTEMPTS: u32 = 4;

/// Budget for the cloud to report a nickname
const NICKNAME_TIMEOUT: Duration = Duration::from_secs(60);

/// Rename the gateway and reconnect a wired client
pub struct RenameScenario;

#[derive(Default)]
struct State {
    original_name: Option<String>,
}

/// Random 6-digit uppercase hex nickname
fn random_nickname() -> String {
    let value: u32 = rand::rng().random_range(0..=0xFF_FFFF);
    format!("{value:06X}")
}

async fn wait_for_nickname(
    ctx: &ScenarioContext,
    expected: Option<&str>,
) -> Result<String, VerifyError> {
    let cloud = ctx.testbed.cloud.as_ref();
    let serial = ctx.gateway()?.serial();
    let description = match expected {
        Some(name) => format!("gateway nickname {name}"),
        None => "gateway nickname".to_string(),
    };
    let verified = wait_for(
        &description,
        ctx.poll(NICKNAME_TIMEOUT)?,
        move || async move { cloud.device_nickname(serial).await },
        |name: &String| expected.is_none_or(|e| name == e),
    )
    .await?;
    Ok(verified.observation)
}

fn connect_client<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        connect_eth_client(ctx, ctx.gateway()?, ctx.eth_client(0)?.as_ref())
            .await
            .map(|_| ())
    }
    .boxed()
}

fn read_nickname<'a>(ctx: &'a ScenarioContext, state: &'a mut State) -> StepFuture<'a> {
    async move {
        let name = wait_for_nickname(ctx, None).await?;
        info!(nickname = %name, "Current gateway nickname");
        state.original_name = Some(name);
        Ok(())
    }
    .boxed()
}

fn check_connectivity<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move { ensure_internet(ctx.eth_client(0)?.as_ref()).await }.boxed()
}

fn rename_gateway<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        let name = random_nickname();
        info!(nickname = %name, "Renaming gateway");
        ctx.testbed
            .cloud
            .rename_device(ctx.gateway()?.serial(), &name)
            .await?;
        wait_for_nickname(ctx, Some(&name)).await.map(|_| ())
    }
    .boxed()
}

fn reconnect<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        let attempts = ctx.options.extra_or("attempts", DEFAULT_ATTEMPTS);
        let gw = ctx.gateway()?;
        let eth1 = ctx.eth_client(0)?.as_ref();
        for attempt in 1..=attempts {
            info!(attempt = attempt, total = attempts, "Reconnecting client");
            disconnect_eth_client(ctx, gw, eth1).await?;
            connect_eth_client(ctx, gw, eth1).await?;
        }
        Ok(())
    }
    .boxed()
}

fn restore_nickname<'a>(ctx: &'a ScenarioContext, state: &'a mut State) -> StepFuture<'a> {
    async move {
        if let Some(name) = &state.original_name {
            ctx.testbed
                .cloud
                .rename_device(ctx.gateway()?.serial(), name)
                .await?;
        }
        Ok(())
    }
    .boxed()
}

fn plan() -> StepPlan<State> {
    StepPlan::new("connect_disconnect_rename")
        .step("recover_switch", recover_switch_step)
        .step("connect_client", connect_client)
        .step("read_nickname", read_nickname)
        .step("check_connectivity", check_connectivity)
        .step("rename_gateway", rename_gateway)
        .step("check_connectivity_after_rename", check_connectivity)
        .step("reconnect", reconnect)
        .step("sanity", sanity_step)
        .teardown("restore_nickname", restore_nickname)
        .teardown("recover_switch", recover_switch_step)
}

#[async_trait]
impl Scenario for RenameScenario {
    fn name(&self) -> &'static str {
        "connect_disconnect_rename"
    }

    fn description(&self) -> &'static str {
        "Rename the gateway and reconnect a wired client"
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

    fn default_options(&self) -> ScenarioOptions {
        let mut opts = ScenarioOptions::default();
        opts.extra
            .insert("attempts".to_string(), DEFAULT_ATTEMPTS.into());
        opts
    }
}
