//! Shared scenario building blocks
//!
//! Device choreography reused across scenarios: attaching wired clients,
//! waiting for leases and reachability, rebooting pods and confirming what
//! the cloud reports about a client.

use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::steps::StepFuture;
use super::traits::ScenarioContext;
use crate::testbed::{ClientRecord, ConnectivityQuery, Pod, TestClient, TestbedError};
use crate::verify::inet::{client_ipv4, extract_inet_address, inet_query_command};
use crate::verify::readiness::{CloudConnectivity, FleetSanity, LoopProtection};
use crate::verify::{
    Consistent, CrossSourceCheck, PollOptions, ReadinessCheck, ReadinessGate, ReadinessReport,
    Verified, VerifyError, wait_for,
};

/// Tick between DHCP renewal attempts
pub const DHCP_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Budget for a single DHCP renewal
pub const DHCP_REFRESH_TIMEOUT: Duration = Duration::from_secs(7);

/// Restore the switch to its default layout with the variant's uplink
pub async fn recover_switch(ctx: &ScenarioContext) -> Result<(), VerifyError> {
    let pods = ctx.testbed.pod_names();
    info!(wan_port = %ctx.params.wan_port, "Recovering default switch configuration");
    ctx.testbed
        .switch
        .recover_default_configuration(&pods, ctx.params.wan_port)
        .await?;
    Ok(())
}

/// Connectivity, then sanity, then loop protection
pub fn readiness_gate(ctx: &ScenarioContext) -> Result<ReadinessGate<'_>, VerifyError> {
    let pods = ctx.testbed.pods();
    Ok(ReadinessGate::new()
        .then(CloudConnectivity::new(
            ctx.testbed.cloud.as_ref(),
            ConnectivityQuery::connected(ctx.timing.connectivity_timeout),
        ))
        .then(FleetSanity::new(pods, ctx.poll(ctx.timing.sanity_timeout)?))
        .then(LoopProtection::new(
            pods,
            ctx.poll(ctx.timing.loop_timeout)?,
            ctx.timing.unmanaged_settle,
        )))
}

pub async fn wait_pods_ready(ctx: &ScenarioContext) -> Result<ReadinessReport, VerifyError> {
    readiness_gate(ctx)?.run().await
}

/// Wait until at least `min_pods` of `pods` dropped off the controller
pub async fn wait_pods_disconnected(
    ctx: &ScenarioContext,
    pods: &[&Arc<dyn Pod>],
    min_pods: usize,
) -> Result<(), VerifyError> {
    let serials = pods.iter().map(|p| p.serial().to_string()).collect();
    let query = ConnectivityQuery::disconnected(ctx.timing.pod_timeout)
        .with_pods(serials)
        .with_min_pods(min_pods);
    CloudConnectivity::new(ctx.testbed.cloud.as_ref(), query)
        .check()
        .await
}

/// Wait until the controller link (not the full backhaul) of `pods` is back
pub async fn wait_controller_connected(
    ctx: &ScenarioContext,
    pods: &[&Arc<dyn Pod>],
) -> Result<(), VerifyError> {
    let serials = pods.iter().map(|p| p.serial().to_string()).collect();
    let query = ConnectivityQuery::connected(ctx.timing.connectivity_timeout)
        .with_pods(serials)
        .controller_only();
    CloudConnectivity::new(ctx.testbed.cloud.as_ref(), query)
        .check()
        .await
}

pub async fn check_sanity(ctx: &ScenarioContext) -> Result<(), VerifyError> {
    FleetSanity::new(ctx.testbed.pods(), ctx.poll(ctx.timing.sanity_timeout)?)
        .check()
        .await
}

pub async fn wait_loop_released(
    ctx: &ScenarioContext,
    pod: &Arc<dyn Pod>,
) -> Result<(), VerifyError> {
    LoopProtection::new(
        std::slice::from_ref(pod),
        ctx.poll(ctx.timing.loop_timeout)?,
        ctx.timing.unmanaged_settle,
    )
    .check()
    .await
}

/// Reboot through the management channel, or through the cloud without one
pub async fn reboot_pod(ctx: &ScenarioContext, pod: &Arc<dyn Pod>) -> Result<(), VerifyError> {
    info!(pod = pod.name(), "Rebooting pod");
    if pod.has_management() {
        pod.reboot().await?;
    } else {
        ctx.testbed.cloud.reboot_pod(pod.serial()).await?;
    }
    Ok(())
}

/// Timing of one wired plug-in
#[derive(Debug, Clone, Copy)]
pub struct PlugIn {
    /// When the switch patched the client through to the pod
    pub at: Instant,
    /// From plug-in to an acquired lease
    pub leased_after: Duration,
}

/// Plug a wired client into `pod` with its DHCP client stopped
///
/// Loop protection on the pod is released first. Returns the moment the
/// switch patched the client through, which is where connection KPIs start.
pub async fn attach_eth_client(
    ctx: &ScenarioContext,
    pod: &Arc<dyn Pod>,
    client: &dyn TestClient,
) -> Result<Instant, VerifyError> {
    wait_loop_released(ctx, pod).await?;
    client.stop_dhcp_client().await?;
    let port = ctx
        .testbed
        .switch
        .connect_eth_client(pod.name(), client.name())
        .await?;
    let at = Instant::now();
    debug!(pod = pod.name(), client = client.name(), port = %port, "Client plugged in");
    Ok(at)
}

/// Renew the lease until it succeeds; returns the time it took
pub async fn acquire_dhcp(client: &dyn TestClient, timeout: Duration) -> Result<Duration, VerifyError> {
    let opts = PollOptions::new(timeout, DHCP_POLL_INTERVAL)?;
    let verified = wait_for(
        &format!("DHCP lease on {}", client.name()),
        opts,
        move || async move { client.refresh_ip_address(DHCP_REFRESH_TIMEOUT).await },
        |_| true,
    )
    .await?;
    Ok(verified.elapsed)
}

/// Attach, lease and confirm internet
pub async fn connect_eth_client(
    ctx: &ScenarioContext,
    pod: &Arc<dyn Pod>,
    client: &dyn TestClient,
) -> Result<PlugIn, VerifyError> {
    let at = attach_eth_client(ctx, pod, client).await?;
    acquire_dhcp(client, ctx.timing.dhcp_timeout).await?;
    let leased_after = at.elapsed();
    ensure_internet(client).await?;
    info!(
        pod = pod.name(),
        client = client.name(),
        elapsed_ms = leased_after.as_millis() as u64,
        "Wired client connected"
    );
    Ok(PlugIn { at, leased_after })
}

pub async fn disconnect_eth_client(
    ctx: &ScenarioContext,
    pod: &Arc<dyn Pod>,
    client: &dyn TestClient,
) -> Result<(), VerifyError> {
    ctx.testbed
        .switch
        .disconnect_eth_client(pod.name(), client.name())
        .await?;
    debug!(pod = pod.name(), client = client.name(), "Client unplugged");
    Ok(())
}

async fn expect_ping(
    client: &dyn TestClient,
    target: Option<&str>,
    reachable: bool,
) -> Result<(), VerifyError> {
    let ok = client.ping_check(target).await?;
    if ok == reachable {
        return Ok(());
    }
    let label = |r: bool| if r { "reachable" } else { "unreachable" };
    Err(VerifyError::mismatch(
        format!(
            "{} from {}",
            target.unwrap_or("internet"),
            client.name()
        ),
        label(reachable),
        label(ok),
    ))
}

pub async fn ensure_internet(client: &dyn TestClient) -> Result<(), VerifyError> {
    expect_ping(client, None, true).await
}

pub async fn ensure_no_internet(client: &dyn TestClient) -> Result<(), VerifyError> {
    expect_ping(client, None, false).await
}

/// `from` can ping the address `to` reports for itself
pub async fn ensure_reachable(from: &dyn TestClient, to: &dyn TestClient) -> Result<(), VerifyError> {
    let target = client_ipv4(to).await?;
    expect_ping(from, Some(&target), true).await
}

pub async fn ensure_isolated(from: &dyn TestClient, to: &dyn TestClient) -> Result<(), VerifyError> {
    let target = client_ipv4(to).await?;
    expect_ping(from, Some(&target), false).await
}

/// Renew and ping until the client is back online
pub async fn poll_internet(
    ctx: &ScenarioContext,
    client: &dyn TestClient,
    timeout: Duration,
) -> Result<Duration, VerifyError> {
    let verified = wait_for(
        &format!("internet on {}", client.name()),
        ctx.poll(timeout)?,
        move || async move {
            client.refresh_ip_address(DHCP_REFRESH_TIMEOUT).await?;
            client.ping_check(None).await
        },
        |ok: &bool| *ok,
    )
    .await?;
    Ok(verified.elapsed)
}

/// Cloud reports the client connected with the address it has locally
///
/// With `owner`, the client must also hang off that pod.
pub async fn verify_client_in_cloud(
    ctx: &ScenarioContext,
    client: &dyn TestClient,
    owner: Option<&dyn Pod>,
) -> Result<Consistent<String, ClientRecord>, VerifyError> {
    let check = CrossSourceCheck::new(
        format!("ip address of {}", client.name()),
        client.name(),
        "cloud",
        ctx.poll(ctx.timing.cloud_timeout)?,
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
                if record.is_connected() {
                    record.ip_address.clone()
                } else {
                    None
                }
            },
        )
        .await?;

    if let Some(pod) = owner {
        let owner_id = consistent.observation.owner_id();
        if owner_id != Some(pod.serial()) {
            return Err(VerifyError::mismatch(
                format!("owner of {}", client.name()),
                pod.serial(),
                owner_id.unwrap_or("none"),
            ));
        }
    }
    Ok(consistent)
}

/// Cloud reports the client disconnected
///
/// An empty record is still converging and does not count.
pub async fn verify_client_gone_from_cloud(
    ctx: &ScenarioContext,
    client: &dyn TestClient,
) -> Result<Verified<ClientRecord>, VerifyError> {
    let cloud = ctx.testbed.cloud.as_ref();
    let mac = client.mac();
    wait_for(
        &format!("{} disconnected in cloud", client.name()),
        ctx.poll(ctx.timing.cloud_timeout)?,
        move || async move { cloud.client_details(mac).await },
        |record: &ClientRecord| record.is_disconnected(),
    )
    .await
}

/// Step: [`recover_switch`]
pub fn recover_switch_step<'a, S>(ctx: &'a ScenarioContext, _: &'a mut S) -> StepFuture<'a> {
    recover_switch(ctx).boxed()
}

/// Step: [`check_sanity`]
pub fn sanity_step<'a, S>(ctx: &'a ScenarioContext, _: &'a mut S) -> StepFuture<'a> {
    check_sanity(ctx).boxed()
}

/// Step: [`wait_pods_ready`]
pub fn pods_ready_step<'a, S>(ctx: &'a ScenarioContext, _: &'a mut S) -> StepFuture<'a> {
    async move { wait_pods_ready(ctx).await.map(|_| ()) }.boxed()
}

/// Wait for the controller to notice a pod reboot
///
/// A gateway reboot takes the whole location down, so at least two pods
/// must drop (or all of them, on smaller testbeds). A leaf reboot only
/// takes the leaf itself.
pub async fn wait_reboot_noticed(
    ctx: &ScenarioContext,
    pod: &Arc<dyn Pod>,
) -> Result<(), VerifyError> {
    if pod.role().is_gateway() {
        let all: Vec<&Arc<dyn Pod>> = ctx.testbed.pods().iter().collect();
        let min = all.len().min(2);
        wait_pods_disconnected(ctx, &all, min).await
    } else {
        wait_pods_disconnected(ctx, &[pod], 1).await
    }
}

pub fn ensure_kpi(metric: &str, actual: Duration, limit: Duration) -> Result<(), VerifyError> {
    if actual > limit {
        return Err(VerifyError::KpiExceeded {
            metric: metric.to_string(),
            actual,
            limit,
        });
    }
    debug!(metric = metric, actual_ms = actual.as_millis() as u64, "KPI met");
    Ok(())
}

/// First leaf wired to at least `min_ports` switch ports
pub async fn leaf_with_ports(
    ctx: &ScenarioContext,
    min_ports: usize,
) -> Result<Arc<dyn Pod>, VerifyError> {
    for leaf in ctx.testbed.leaves() {
        let ports = ctx.testbed.switch.port_aliases(leaf.name()).await?;
        if ports.len() >= min_ports {
            return Ok(Arc::clone(leaf));
        }
    }
    Err(VerifyError::precondition(format!(
        "no leaf with at least {min_ports} switch ports"
    )))
}

/// Where the background ping leaves its PID on the client
const BACKGROUND_PING_PID: &str = "/tmp/meshcheck-ping.pid";

/// Start a background ping so the cloud sees traffic from the client
pub async fn start_background_ping(client: &dyn TestClient) -> Result<(), VerifyError> {
    client
        .run(&format!(
            "nohup ping -i 1 8.8.8.8 > /dev/null 2>&1 & echo $! > {BACKGROUND_PING_PID}"
        ))
        .await?;
    Ok(())
}

/// Stop the ping started by [`start_background_ping`], if there is one
pub async fn stop_background_ping(client: &dyn TestClient) -> Result<(), VerifyError> {
    client
        .run(&format!(
            "if [ -f {BACKGROUND_PING_PID} ]; then \
             kill \"$(cat {BACKGROUND_PING_PID})\" && rm -f {BACKGROUND_PING_PID}; fi"
        ))
        .await?;
    Ok(())
}
