//! Plug/Unplug Wired Client Scenario
//!
//! Repeatedly plugs a wired client into the pod selected by the variant's
//! role and unplugs it again, timing every transition against its KPI.
//!
//! ## What it checks
//!
//! 1. The client obtains a lease and reaches the internet
//! 2. The cloud reports it connected, with the client's own address and
//!    attached to the expected pod
//! 3. After unplugging, the cloud reports it disconnected
//!
//! ## Modes
//!
//! - dynamic: the pod stays up. Connect < 20s, cloud appear < 50s,
//!   cloud disappear < 30s.
//! - static: the pod is rebooted with the client attached and again after
//!   unplugging. Connect < onboard + 60s, cloud appear < onboard + 90s,
//!   with the onboarding budget taken from the testbed KPIs for the role.
//!
//! ## Options
//!
//! - `iterations`: number of plug/unplug cycles (default: 4)

use async_trait::async_trait;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

use super::common::{
    PlugIn, acquire_dhcp, attach_eth_client, connect_eth_client, disconnect_eth_client,
    ensure_internet, ensure_kpi, reboot_pod, recover_switch_step, verify_client_gone_from_cloud,
    verify_client_in_cloud, wait_controller_connected, wait_loop_released, wait_pods_ready,
    wait_reboot_noticed,
};
use super::steps::{StepFuture, StepPlan};
use super::traits::{Scenario, ScenarioContext, ScenarioParams, ScenarioReport};
use crate::testbed::{NetworkMode, NodeRole, Pod, TestClient, WanPort};
use crate::verify::VerifyError;

/// Default number of plug/unplug cycles
const DEFAULT_ITERATIONS: usize = 4;

/// Plug and unplug a wired client, with or without pod reboots
pub struct PlugUnplugScenario {
    static_mode: bool,
}

impl PlugUnplugScenario {
    pub fn dynamic() -> Self {
        Self { static_mode: false }
    }

    pub fn static_mode() -> Self {
        Self { static_mode: true }
    }
}

/// Per-transition limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Limits {
    connect: Duration,
    appear: Duration,
    disappear: Option<Duration>,
}

impl Limits {
    fn for_mode(static_mode: bool, onboard: Duration) -> Self {
        if static_mode {
            Self {
                connect: onboard + Duration::from_secs(60),
                appear: onboard + Duration::from_secs(90),
                disappear: None,
            }
        } else {
            Self {
                connect: Duration::from_secs(20),
                appear: Duration::from_secs(50),
                disappear: Some(Duration::from_secs(30)),
            }
        }
    }
}

struct State {
    static_mode: bool,
    iteration: usize,
}

/// Attach the client, then reboot the pod so it comes up with the client present
async fn connect_static(
    ctx: &ScenarioContext,
    pod: &Arc<dyn Pod>,
    client: &dyn TestClient,
) -> Result<PlugIn, VerifyError> {
    let at = attach_eth_client(ctx, pod, client).await?;
    reboot_pod(ctx, pod).await?;
    wait_reboot_noticed(ctx, pod).await?;
    wait_controller_connected(ctx, &[pod]).await?;
    if !pod.role().is_gateway() {
        wait_loop_released(ctx, pod).await?;
    }
    acquire_dhcp(client, ctx.timing.dhcp_timeout).await?;
    let leased_after = at.elapsed();
    ensure_internet(client).await?;
    Ok(PlugIn { at, leased_after })
}

fn plug_unplug_once<'a>(ctx: &'a ScenarioContext, state: &'a mut State) -> StepFuture<'a> {
    async move {
        state.iteration += 1;
        let pod = ctx.target_pod()?;
        let client = ctx.eth_client(0)?.as_ref();
        let limits = Limits::for_mode(
            state.static_mode,
            ctx.testbed.kpi.onboard_time(pod.role()),
        );
        info!(
            iteration = state.iteration,
            pod = pod.name(),
            static_mode = state.static_mode,
            "Plugging client"
        );

        // Both connection KPIs run from the moment the switch patched the client through
        let plug = if state.static_mode {
            connect_static(ctx, pod, client).await?
        } else {
            connect_eth_client(ctx, pod, client).await?
        };
        verify_client_in_cloud(ctx, client, Some(pod.as_ref())).await?;
        let appeared_after = plug.at.elapsed();

        ensure_kpi("connection time", plug.leased_after, limits.connect)?;
        ensure_kpi("cloud appear time", appeared_after, limits.appear)?;

        let unplugged = Instant::now();
        disconnect_eth_client(ctx, pod, client).await?;
        if state.static_mode {
            reboot_pod(ctx, pod).await?;
            wait_reboot_noticed(ctx, pod).await?;
            wait_pods_ready(ctx).await?;
        }
        verify_client_gone_from_cloud(ctx, client).await?;

        if let Some(limit) = limits.disappear {
            ensure_kpi("cloud disappear time", unplugged.elapsed(), limit)?;
        }
        Ok(())
    }
    .boxed()
}

fn unplug_client<'a>(ctx: &'a ScenarioContext, _: &'a mut State) -> StepFuture<'a> {
    async move {
        disconnect_eth_client(ctx, ctx.target_pod()?, ctx.eth_client(0)?.as_ref()).await
    }
    .boxed()
}

fn plan(iterations: usize) -> StepPlan<State> {
    let mut plan = StepPlan::new("plug_unplug").step("recover_switch", recover_switch_step);
    for i in 1..=iterations {
        plan = plan.step(format!("plug_unplug_{i}"), plug_unplug_once);
    }
    plan.teardown("unplug_client", unplug_client)
        .teardown("recover_switch", recover_switch_step)
}

#[async_trait]
impl Scenario for PlugUnplugScenario {
    fn name(&self) -> &'static str {
        if self.static_mode {
            "plug_unplug_static"
        } else {
            "plug_unplug_dynamic"
        }
    }

    fn description(&self) -> &'static str {
        if self.static_mode {
            "Plug/unplug a wired client across pod reboots within KPI"
        } else {
            "Plug/unplug a wired client within connection and cloud KPIs"
        }
    }

    fn variants(&self) -> Vec<ScenarioParams> {
        ScenarioParams::matrix(
            &[NetworkMode::Bridge, NetworkMode::Router],
            &[WanPort::Primary],
            &[NodeRole::Gw, NodeRole::Leaf],
        )
    }

    async fn run(&self, ctx: &ScenarioContext) -> ScenarioReport {
        let iterations = ctx.options.extra_or("iterations", DEFAULT_ITERATIONS);
        let state = State {
            static_mode: self.static_mode,
            iteration: 0,
        };
        plan(iterations).run(ctx, state).await
    }
}
