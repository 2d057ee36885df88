//! Device Fingerprinting Scenario
//!
//! Checks that the cloud identifies a wired client: a display name other
//! than its MAC or hostname, a device type, and the address the client
//! holds locally.
//!
//! ## What it checks
//!
//! 1. A freshly recreated location comes up sane
//! 2. The cloud fingerprints a client generating traffic
//! 3. The fingerprint survives a reboot of the pod the client hangs off
//!
//! The location is restored in teardown.

use async_trait::async_trait;
use futures::FutureExt;
use std::time::Duration;
use tracing::info;

use super::common::{
    connect_eth_client, pods_ready_step, reboot_pod, recover_switch_step, sanity_step,
    start_background_ping, stop_background_ping, wait_pods_ready, wait_reboot_noticed,
};
use super::steps::{StepFuture, StepPlan};
use super::traits::{Scenario, ScenarioContext, ScenarioParams, ScenarioReport};
use crate::testbed::{ClientRecord, NetworkMode, NodeRole, TestbedError, WanPort};
use crate::verify::inet::{extract_inet_address, inet_query_command};
use crate::verify::{CrossSourceCheck, VerifyError};

/// Budget for the cloud to finish fingerprinting
const FINGERPRINT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct FingerprintingScenario;

#[derive(Default)]
struct State {
    hostname: Option<String>,
}

/// The cloud agrees on the client address and has named and typed it
async fn check_fingerprint(ctx: &ScenarioContext, hostname: &str) -> Result<(), VerifyError> {
    let client = ctx.eth_client(0)?.as_ref();
    let check = CrossSourceCheck::new(
        format!("fingerprint of {}", client.name()),
        client.name(),
        "cloud",
        ctx.poll(FINGERPRINT_TIMEOUT)?,
    );
    let cloud = ctx.testbed.cloud.as_ref();
    let mac = client.mac();

    let consistent = check
        .run(
            async {
                let output = client.run(&inet_query_command(client.iface())).await?;
                Ok::<_, TestbedError>(extract_inet_address(&output).map(str::to_string))
            },
            move || async move { cloud.client_details(mac).await },
            |record: &ClientRecord| {
                if record.is_fingerprinted() {
                    record.ip_address.clone()
                } else {
                    None
                }
            },
        )
        .await?;

    let record = &consistent.observation;
    let name = record.name.as_deref().unwrap_or_default();
    if name.eq_ignore_ascii_case(hostname) {
        return Err(VerifyError::mismatch(
            format!("display name of {}", client.name()),
            "a fingerprinted name",
            format!("hostname {hostname}"),
        ));
    }
    info!(
        client = client.name(),
        name = name,
        device_type = record.device_type.as_deref().unwrap_or_default(),
        elapsed_ms = consistent.elapsed.as_millis() as u64,
        "Client fingerprinted"
    );
    Ok(())
}

fn recreate_location<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        info!(testbed = %ctx.testbed.name, "Recreating location");
        ctx.testbed.cloud.recreate_location().await?;
        wait_pods_ready(ctx).await.map(|_| ())
    }
    .boxed()
}

fn connect_client<'a>(ctx: &'a ScenarioContext, state: &'a mut State) -> StepFuture<'a> {
    async move {
        let client = ctx.eth_client(0)?.as_ref();
        connect_eth_client(ctx, ctx.target_pod()?, client).await?;
        start_background_ping(client).await?;
        let hostname = client.run("hostname").await?.trim().to_string();
        info!(client = client.name(), hostname = %hostname, "Client traffic started");
        state.hostname = Some(hostname);
        Ok(())
    }
    .boxed()
}

fn fingerprint<'a>(ctx: &'a ScenarioContext, state: &'a mut State) -> StepFuture<'a> {
    async move {
        let hostname = state
            .hostname
            .as_deref()
            .ok_or_else(|| VerifyError::precondition("client hostname unknown"))?;
        check_fingerprint(ctx, hostname).await
    }
    .boxed()
}

fn reboot_and_recheck<'a>(ctx: &'a ScenarioContext, state: &'a mut State) -> StepFuture<'a> {
    async move {
        let pod = ctx.target_pod()?;
        reboot_pod(ctx, pod).await?;
        wait_reboot_noticed(ctx, pod).await?;
        wait_pods_ready(ctx).await?;
        tokio::time::sleep(ctx.timing.reboot_settle).await;
        fingerprint(ctx, state).await
    }
    .boxed()
}

fn stop_traffic<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move { stop_background_ping(ctx.eth_client(0)?.as_ref()).await }.boxed()
}

fn restore_location<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        ctx.testbed.cloud.restore_location().await?;
        Ok(())
    }
    .boxed()
}

fn plan() -> StepPlan<State> {
    StepPlan::new("device_fingerprinting")
        .step("recover_switch", recover_switch_step)
        .step("recreate_location", recreate_location)
        .step("sanity", sanity_step)
        .step("connect_client", connect_client)
        .step("check_fingerprint", fingerprint)
        .step("reboot_and_recheck", reboot_and_recheck)
        .teardown("stop_traffic", stop_traffic)
        .teardown("restore_location", restore_location)
        .teardown("recover_switch", recover_switch_step)
        .teardown("wait_ready", pods_ready_step)
}

#[async_trait]
impl Scenario for FingerprintingScenario {
    fn name(&self) -> &'static str {
        "device_fingerprinting"
    }

    fn description(&self) -> &'static str {
        "Cloud fingerprints a wired client and keeps it across a reboot"
    }

    fn variants(&self) -> Vec<ScenarioParams> {
        vec![
            ScenarioParams::new(NetworkMode::Bridge, WanPort::Primary, NodeRole::Gw),
            ScenarioParams::new(NetworkMode::Router, WanPort::Primary, NodeRole::Gw),
            ScenarioParams::new(NetworkMode::Bridge, WanPort::Primary, NodeRole::Leaf),
        ]
    }

    async fn run(&self, ctx: &ScenarioContext) -> ScenarioReport {
        plan().run(ctx, State::default()).await
    }
}
