//! End-to-end scenario runs against in-memory fakes
//!
//! The tokio clock is paused, so every poll loop and settle delay runs at
//! full length without real waiting.

mod common;

use std::time::Duration;

use common::{FakeBed, connected_record, fingerprinted_record};
use meshcheck::api::ApiState;
use meshcheck::config::Config;
use meshcheck::scenarios::common::{
    verify_client_gone_from_cloud, verify_client_in_cloud, wait_pods_ready,
};
use meshcheck::scenarios::{
    AfterRebootScenario, EthernetLanScenario, FingerprintingScenario, MtuScenario,
    NetworkModeChangeScenario, PlugUnplugScenario, RebootTarget, RenameScenario, Scenario,
    ScenarioContext, ScenarioOptions, ScenarioParams, StepStatus, SwitchingNetworkModeScenario,
    SwitchingWanScenario, Timing, WifiClientScenario, WiredConnectionScenario, run_scenarios,
    run_variant,
};
use meshcheck::testbed::{Bssid, ClientRecord, ConnState, NetworkMode, NodeRole, Pod, TestClient, WanPort};
use meshcheck::verify::VerifyError;
use meshcheck_testkit::{MockClient, MockLocation, MockPod, Script};
use std::sync::Arc;

fn router_gw() -> ScenarioParams {
    ScenarioParams::new(NetworkMode::Router, WanPort::Primary, NodeRole::Gw)
}

#[tokio::test(start_paused = true)]
async fn wired_connection_passes_on_healthy_testbed() {
    let bed = FakeBed::standard();

    let report = WiredConnectionScenario.run(&bed.context(router_gw())).await;

    assert!(report.passed, "{:?}", report.message);
    assert_eq!(report.count(StepStatus::Passed), 5);
    assert_eq!(bed.log.position("switch recover"), Some(0));
    assert!(bed.log.contains("switch connect eth1 gw"));
    assert!(bed.log.contains("switch disconnect eth1 gw"));
    assert!(bed.log.contains("switch connect eth2 l1"));
    let eth2_ip = &bed.client("eth2").ip;
    assert!(bed.log.contains(&format!("client eth1 ping {eth2_ip}")));
}

#[tokio::test(start_paused = true)]
async fn readiness_checks_sanity_only_after_connectivity() {
    let bed = FakeBed::standard();

    let report = wait_pods_ready(&bed.context(router_gw())).await.unwrap();

    assert_eq!(report.phases.len(), 3);
    let connected = bed.log.position("cloud pods connected").unwrap();
    let sanity = bed.log.position("pod sanity").unwrap();
    assert!(connected < sanity);
}

#[tokio::test(start_paused = true)]
async fn connectivity_failure_aborts_before_sanity() {
    let bed = FakeBed::build(MockLocation::standard(7), |cloud| {
        *cloud.mode.get_mut() = NetworkMode::Bridge;
        cloud.connected = Script::constant(false);
    });

    let report = run_variant(
        &WiredConnectionScenario,
        Arc::clone(&bed.testbed),
        router_gw(),
        Timing::default(),
        ScenarioOptions::default(),
    )
    .await;

    assert!(!report.passed);
    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.steps[0].name, "set_network_mode");
    assert_eq!(report.steps[0].error_kind.as_deref(), Some("timeout"));
    assert!(bed.log.contains("cloud mode router"));
    assert_eq!(bed.log.count("pod sanity"), 0);
    assert_eq!(bed.log.count("switch"), 0);
}

#[tokio::test(start_paused = true)]
async fn cloud_converges_to_device_address() {
    let bed = FakeBed::standard();
    let eth1 = bed.client("eth1");
    bed.cloud.script_client(
        &eth1.mac,
        [
            ClientRecord::default(),
            ClientRecord::default(),
            connected_record(&eth1.mac, &eth1.ip, "S0000000001"),
        ],
    );
    let ctx = bed.context(router_gw());
    let owner: &dyn Pod = &**bed.pod("gw");

    let consistent = verify_client_in_cloud(&ctx, &**eth1, Some(owner))
        .await
        .unwrap();

    assert_eq!(consistent.value, eth1.ip);
    assert_eq!(consistent.attempts, 3);
    assert_eq!(consistent.elapsed, Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn client_on_wrong_pod_is_a_mismatch() {
    let bed = FakeBed::standard();
    let eth1 = bed.client("eth1");
    bed.cloud.script_client(
        &eth1.mac,
        [connected_record(&eth1.mac, &eth1.ip, "S0000000002")],
    );
    let ctx = bed.context(router_gw());
    let owner: &dyn Pod = &**bed.pod("gw");

    let err = verify_client_in_cloud(&ctx, &**eth1, Some(owner))
        .await
        .unwrap_err();

    match err {
        VerifyError::Mismatch {
            property,
            expected,
            actual,
        } => {
            assert_eq!(property, "owner of eth1");
            assert_eq!(expected, "S0000000001");
            assert_eq!(actual, "S0000000002");
        }
        other => panic!("expected mismatch, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn stale_cloud_address_is_reported_after_timeout() {
    let bed = FakeBed::standard();
    let eth1 = bed.client("eth1");
    bed.cloud.script_client(
        &eth1.mac,
        [connected_record(&eth1.mac, "192.168.40.250", "S0000000001")],
    );
    let ctx = bed.context(router_gw());
    let start = tokio::time::Instant::now();

    let err = verify_client_in_cloud(&ctx, &**eth1, None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "mismatch");
    assert_eq!(start.elapsed(), Timing::default().cloud_timeout);
}

#[tokio::test(start_paused = true)]
async fn unfinished_fingerprint_skips_reboot_and_restores_location() {
    let bed = FakeBed::standard();
    let eth1 = bed.client("eth1");
    bed.cloud
        .script_client(&eth1.mac, [connected_record(&eth1.mac, &eth1.ip, "S0000000001")]);
    let params = ScenarioParams::new(NetworkMode::Bridge, WanPort::Primary, NodeRole::Gw);

    let report = FingerprintingScenario.run(&bed.context(params)).await;

    assert!(!report.passed);
    let check = &report.steps[4];
    assert_eq!(check.name, "check_fingerprint");
    assert_eq!(check.error_kind.as_deref(), Some("timeout"));
    assert_eq!(report.steps[5].status, StepStatus::Skipped);
    assert_eq!(
        report.steps[5].error_kind.as_deref(),
        Some("precondition_failed")
    );
    assert!(bed.log.contains("cloud restore location"));
    assert_eq!(bed.log.count("pod reboot"), 0);
    assert!(report.teardown.iter().all(|s| s.status == StepStatus::Passed));
}

#[tokio::test(start_paused = true)]
async fn fingerprint_survives_reboot() {
    let bed = FakeBed::standard();
    let eth1 = bed.client("eth1");
    bed.cloud.script_client(
        &eth1.mac,
        [fingerprinted_record(&eth1.mac, &eth1.ip, "S0000000001")],
    );
    let params = ScenarioParams::new(NetworkMode::Bridge, WanPort::Primary, NodeRole::Gw);

    let report = FingerprintingScenario.run(&bed.context(params)).await;

    assert!(report.passed, "{:?}", report.message);
    assert!(bed.log.contains("cloud recreate location"));
    assert!(bed.log.contains("pod reboot gw"));
    let reboot = bed.log.position("pod reboot gw").unwrap();
    let restore = bed.log.position("cloud restore location").unwrap();
    assert!(reboot < restore);
    // the ping is stopped by the PID it recorded, not by pattern
    let entries = bed.log.entries();
    let stop = entries
        .iter()
        .find(|e| e.starts_with("client eth1 run if [ -f /tmp/meshcheck-ping.pid ]"))
        .unwrap();
    assert!(stop.contains("kill \"$(cat /tmp/meshcheck-ping.pid)\""));
    assert!(!entries.iter().any(|e| e.contains("pkill")));
}

#[tokio::test(start_paused = true)]
async fn failing_traffic_stop_fails_teardown() {
    let bed = FakeBed::standard();
    let eth1 = bed.client("eth1");
    bed.cloud.script_client(
        &eth1.mac,
        [fingerprinted_record(&eth1.mac, &eth1.ip, "S0000000001")],
    );
    eth1.failing.lock().push("if [ -f /tmp/meshcheck-ping.pid ]".into());
    let params = ScenarioParams::new(NetworkMode::Bridge, WanPort::Primary, NodeRole::Gw);

    let report = FingerprintingScenario.run(&bed.context(params)).await;

    assert!(!report.passed);
    let failure = report.first_failure().unwrap();
    assert_eq!(failure.name, "stop_traffic");
    // the rest of the teardown still ran
    assert!(bed.log.contains("cloud restore location"));
}

#[tokio::test(start_paused = true)]
async fn ethernet_lan_cuts_and_restores_wired_clients() {
    let bed = FakeBed::standard();
    let eth1 = bed.client("eth1");
    // connect, check_connected, cut off, recovered
    eth1.internet.reset([true, true, false, true]);
    bed.client("eth2").internet.reset([true, true, false, true]);
    // reachable, isolated, reachable again
    eth1.peers.reset([true, false, true]);

    let report = EthernetLanScenario.run(&bed.context(router_gw())).await;

    assert!(report.passed, "{:?}", report.message);
    assert_eq!(bed.log.count("client eth2 ping internet"), 4);
    assert!(bed.log.contains("switch connect eth1 gw"));
    assert!(bed.log.contains("switch connect eth2 l1"));
    let disabled = bed.log.position("cloud ethernet_lan false").unwrap();
    let enabled = bed.log.position("cloud ethernet_lan true").unwrap();
    assert!(disabled < enabled);
    assert_eq!(bed.log.count("cloud ethernet_lan true"), 2);
}

#[tokio::test(start_paused = true)]
async fn ethernet_lan_fails_when_clients_stay_reachable() {
    let bed = FakeBed::standard();
    // internet goes away but eth2 still answers pings
    bed.client("eth1").internet.reset([true, true, false]);
    bed.client("eth2").internet.reset([true, true, false]);

    let report = EthernetLanScenario.run(&bed.context(router_gw())).await;

    assert!(!report.passed);
    let failure = report.first_failure().unwrap();
    assert_eq!(failure.name, "check_cut_off");
    assert_eq!(failure.error_kind.as_deref(), Some("mismatch"));
    assert_eq!(report.count(StepStatus::Skipped), 2);
    assert_eq!(bed.log.count("cloud ethernet_lan true"), 1);
}

#[tokio::test(start_paused = true)]
async fn switching_wan_repeats_each_disruption() {
    let bed = FakeBed::standard();
    let mut options = ScenarioOptions::default();
    options.extra.insert("attempts".into(), 2.into());
    let ctx = ScenarioContext::new(
        Arc::clone(&bed.testbed),
        router_gw(),
        Timing::default(),
        options,
    );

    let report = SwitchingWanScenario.run(&ctx).await;

    assert!(report.passed, "{:?}", report.message);
    assert!(bed.log.contains("pod reboot gw"));
    assert_eq!(bed.log.count("switch wan gw"), 2);
    assert_eq!(bed.log.count("switch port gw_wan false"), 2);
    assert_eq!(bed.log.count("switch port gw_wan true"), 2);
}

#[tokio::test(start_paused = true)]
async fn wifi_client_visits_every_bssid() {
    let bed = FakeBed::build(MockLocation::standard(7), |cloud| {
        *cloud.bssids.get_mut() = vec![
            Bssid {
                bssid: "aa:aa:aa:aa:aa:01".into(),
                band: Some("2.4G".into()),
            },
            Bssid {
                bssid: "aa:aa:aa:aa:aa:02".into(),
                band: Some("5G".into()),
            },
        ];
    });

    let report = WifiClientScenario.run(&bed.context(router_gw())).await;

    assert!(report.passed, "{:?}", report.message);
    assert!(bed.log.contains("client w1 wifi home aa:aa:aa:aa:aa:01"));
    assert!(bed.log.contains("client w1 wifi home aa:aa:aa:aa:aa:02"));
    // once per BSSID plus teardown
    assert_eq!(bed.log.count("client w1 wifi off"), 3);
}

#[tokio::test(start_paused = true)]
async fn wifi_client_without_bssids_connects_once() {
    let bed = FakeBed::standard();

    let report = WifiClientScenario.run(&bed.context(router_gw())).await;

    assert!(report.passed, "{:?}", report.message);
    assert!(bed.log.contains("client w1 wifi home any"));
    assert_eq!(bed.log.count("client w1 ping internet"), 1);
}

#[tokio::test(start_paused = true)]
async fn runner_filters_variants_and_publishes_progress() {
    let bed = FakeBed::standard();
    let config = Config::from_yaml(
        r"
testbed:
  gateway_url: http://localhost:8000
  nodes:
    - name: gw
      id: S0000000001
      role: gw
scenarios:
  wired_connection:
    network_modes: [router]
",
    )
    .unwrap();
    let state = ApiState::new();
    let scenarios: Vec<Arc<dyn Scenario>> = vec![Arc::new(WiredConnectionScenario)];

    let reports = run_scenarios(&scenarios, Arc::clone(&bed.testbed), &config, &state).await;

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].params.network_mode, NetworkMode::Router);
    let counts = state.counts();
    assert_eq!(counts.total, 1);
    assert_eq!(counts.passed, 1);
    assert_eq!(state.reports().len(), 1);
    assert!(state.current().is_none());
    // the location was already in router mode
    assert_eq!(bed.log.count("cloud mode"), 0);
}

#[tokio::test(start_paused = true)]
async fn client_ip_parse_uses_first_inet_line() {
    let bed = FakeBed::standard();
    let eth2 = bed.client("eth2");
    let client: &dyn TestClient = &**eth2;

    let ip = meshcheck::verify::inet::client_ipv4(client).await.unwrap();

    assert_eq!(ip, eth2.ip);
}

fn single_iteration(bed: &FakeBed, params: ScenarioParams) -> ScenarioContext {
    let mut options = ScenarioOptions::default();
    options.extra.insert("iterations".into(), 1.into());
    ScenarioContext::new(Arc::clone(&bed.testbed), params, Timing::default(), options)
}

fn disconnected_record() -> ClientRecord {
    ClientRecord {
        connection_state: Some(ConnState::Disconnected),
        ..ClientRecord::default()
    }
}

#[tokio::test(start_paused = true)]
async fn plug_unplug_dynamic_within_kpi() {
    let bed = FakeBed::standard();
    let eth1 = bed.client("eth1");
    bed.cloud.script_client(
        &eth1.mac,
        [
            connected_record(&eth1.mac, &eth1.ip, "S0000000001"),
            disconnected_record(),
        ],
    );

    let report = PlugUnplugScenario::dynamic()
        .run(&single_iteration(&bed, router_gw()))
        .await;

    assert!(report.passed, "{:?}", report.message);
    assert_eq!(report.steps.len(), 2);
    assert_eq!(bed.log.count("switch connect eth1 gw"), 1);
    assert_eq!(bed.log.count("pod reboot"), 0);
}

#[tokio::test(start_paused = true)]
async fn plug_unplug_dynamic_flags_slow_cloud() {
    let bed = FakeBed::standard();
    let eth1 = bed.client("eth1");
    // the cloud shows the client on the 12th poll, 55s in
    let mut records = vec![ClientRecord::default(); 11];
    records.push(connected_record(&eth1.mac, &eth1.ip, "S0000000001"));
    records.push(disconnected_record());
    bed.cloud.script_client(&eth1.mac, records);

    let report = PlugUnplugScenario::dynamic()
        .run(&single_iteration(&bed, router_gw()))
        .await;

    assert!(!report.passed);
    let failure = report.first_failure().unwrap();
    assert_eq!(failure.name, "plug_unplug_1");
    assert_eq!(failure.error_kind.as_deref(), Some("kpi_exceeded"));
    assert!(bed.log.contains("switch disconnect eth1 gw"));
}

#[tokio::test(start_paused = true)]
async fn plug_unplug_static_reboots_leaf_with_client_attached() {
    let bed = FakeBed::standard();
    let eth1 = bed.client("eth1");
    bed.cloud.script_client(
        &eth1.mac,
        [
            connected_record(&eth1.mac, &eth1.ip, "S0000000002"),
            disconnected_record(),
        ],
    );
    let params = ScenarioParams::new(NetworkMode::Router, WanPort::Primary, NodeRole::Leaf);

    let report = PlugUnplugScenario::static_mode()
        .run(&single_iteration(&bed, params))
        .await;

    assert!(report.passed, "{:?}", report.message);
    let attached = bed.log.position("switch connect eth1 l1").unwrap();
    let rebooted = bed.log.position("pod reboot l1").unwrap();
    assert!(attached < rebooted);
    // once with the client attached, once after unplugging
    assert_eq!(bed.log.count("pod reboot l1"), 2);
}

#[tokio::test(start_paused = true)]
async fn plug_unplug_connect_time_starts_at_plug_in() {
    let bed = FakeBed::standard();
    let eth1 = bed.client("eth1");
    bed.cloud.script_client(
        &eth1.mac,
        [
            connected_record(&eth1.mac, &eth1.ip, "S0000000001"),
            disconnected_record(),
        ],
    );
    // loop protection holds the port for 25s, longer than the 20s connect KPI
    bed.pod("gw")
        .loop_engaged
        .reset([true, true, true, true, true, false]);

    let report = PlugUnplugScenario::dynamic()
        .run(&single_iteration(&bed, router_gw()))
        .await;

    assert!(report.passed, "{:?}", report.message);
    assert!(report.steps[1].duration >= Duration::from_secs(25));
    assert_eq!(bed.log.count("switch connect eth1 gw"), 1);
}

#[tokio::test(start_paused = true)]
async fn plug_unplug_unmanaged_settle_not_counted() {
    let location = MockLocation::new()
        .with_pod(MockPod::new("gw", "S0000000001").gateway())
        .with_pod(MockPod::new("l1", "S0000000002").without_management())
        .with_client(MockClient::eth("eth1", "02:00:00:00:00:11", "192.168.40.11"));
    let bed = FakeBed::build(location, |_| {});
    let eth1 = bed.client("eth1");
    bed.cloud.script_client(
        &eth1.mac,
        [
            connected_record(&eth1.mac, &eth1.ip, "S0000000002"),
            disconnected_record(),
        ],
    );
    let params = ScenarioParams::new(NetworkMode::Router, WanPort::Primary, NodeRole::Leaf);

    let report = PlugUnplugScenario::dynamic()
        .run(&single_iteration(&bed, params))
        .await;

    assert!(report.passed, "{:?}", report.message);
    assert!(report.steps[1].duration >= Timing::default().unmanaged_settle);
    assert!(bed.log.contains("switch connect eth1 l1"));
}

#[tokio::test(start_paused = true)]
async fn empty_cloud_record_is_not_a_disconnect() {
    let bed = FakeBed::standard();
    let eth1 = bed.client("eth1");
    bed.cloud.script_client(
        &eth1.mac,
        [
            ClientRecord::default(),
            connected_record(&eth1.mac, &eth1.ip, "S0000000001"),
        ],
    );
    let ctx = bed.context(router_gw());
    let start = tokio::time::Instant::now();

    let err = verify_client_gone_from_cloud(&ctx, &**eth1).await.unwrap_err();

    assert_eq!(err.kind(), "timeout");
    assert_eq!(start.elapsed(), Timing::default().cloud_timeout);
}

#[tokio::test(start_paused = true)]
async fn disconnected_record_ends_the_wait() {
    let bed = FakeBed::standard();
    let eth1 = bed.client("eth1");
    bed.cloud.script_client(
        &eth1.mac,
        [
            ClientRecord::default(),
            ClientRecord::default(),
            disconnected_record(),
        ],
    );
    let ctx = bed.context(router_gw());

    let gone = verify_client_gone_from_cloud(&ctx, &**eth1).await.unwrap();

    assert_eq!(gone.attempts, 3);
    assert!(gone.observation.is_disconnected());
}

#[tokio::test(start_paused = true)]
async fn mtu_ping_reaches_test_server() {
    let bed = FakeBed::standard();
    let params = ScenarioParams::new(NetworkMode::Bridge, WanPort::Primary, NodeRole::Gw);

    let report = MtuScenario::eth().run(&bed.context(params)).await;

    assert!(report.passed, "{:?}", report.message);
    assert!(bed.log.contains("switch connect eth1 gw"));
    assert!(
        bed.log
            .contains("client eth1 run sudo /bin/ping -c 5 -w 60 -s 1472 -M do 10.10.0.1")
    );
    let leased = bed.log.position("client eth1 dhcp").unwrap();
    let pinged = bed.log.position("client eth1 run sudo /bin/ping").unwrap();
    assert!(leased < pinged);
}

#[tokio::test(start_paused = true)]
async fn mtu_ping_loss_is_a_mismatch() {
    let bed = FakeBed::standard();
    bed.client("eth1").failing.lock().push("sudo /bin/ping".into());

    let report = MtuScenario::eth().run(&bed.context(router_gw())).await;

    assert!(!report.passed);
    let failure = report.first_failure().unwrap();
    assert_eq!(failure.name, "ping_server");
    assert_eq!(failure.error_kind.as_deref(), Some("mismatch"));
    assert!(failure.error.as_deref().unwrap().contains("1472 byte ping from eth1 to 10.10.0.1"));
    assert_eq!(bed.log.count("switch recover"), 2);
}

#[tokio::test(start_paused = true)]
async fn mtu_ping_from_wifi_client_per_bssid() {
    let bed = FakeBed::build(MockLocation::standard(7), |cloud| {
        *cloud.bssids.get_mut() = vec![
            Bssid {
                bssid: "aa:aa:aa:aa:aa:01".into(),
                band: Some("2.4G".into()),
            },
            Bssid {
                bssid: "aa:aa:aa:aa:aa:02".into(),
                band: Some("5G".into()),
            },
        ];
    });

    let report = MtuScenario::wifi().run(&bed.context(router_gw())).await;

    assert!(report.passed, "{:?}", report.message);
    assert_eq!(bed.log.count("client w1 run sudo /bin/ping -c 5 -w 60 -s 1472"), 2);
    assert_eq!(bed.log.count("switch connect"), 0);
}

#[tokio::test(start_paused = true)]
async fn ethernet_lan_skips_pods_without_switch_ports() {
    let location = MockLocation::new()
        .with_pod(
            MockPod::new("gw", "S0000000001")
                .gateway()
                .with_ports(vec!["gw_eth0".into()]),
        )
        .with_pod(MockPod::new("l1", "S0000000002").with_ports(vec![]))
        .with_pod(MockPod::new("l2", "S0000000003"))
        .with_pod(MockPod::new("l3", "S0000000004"))
        .with_client(MockClient::eth("eth1", "02:00:00:00:00:11", "192.168.40.11"))
        .with_client(MockClient::eth("eth2", "02:00:00:00:00:12", "192.168.40.12"));
    let bed = FakeBed::build(location, |_| {});
    bed.client("eth1").internet.reset([true, true, false, true]);
    bed.client("eth2").internet.reset([true, true, false, true]);
    bed.client("eth1").peers.reset([true, false, true]);

    let report = EthernetLanScenario.run(&bed.context(router_gw())).await;

    assert!(report.passed, "{:?}", report.message);
    assert!(bed.log.contains("switch connect eth1 l2"));
    assert!(bed.log.contains("switch connect eth2 l3"));
    assert_eq!(bed.log.count("switch connect eth1 gw"), 0);
    assert_eq!(bed.log.count("switch connect eth1 l1"), 0);
}

#[tokio::test(start_paused = true)]
async fn ethernet_lan_fails_when_second_client_keeps_internet() {
    let bed = FakeBed::standard();
    bed.client("eth1").internet.reset([true, true, false]);

    let report = EthernetLanScenario.run(&bed.context(router_gw())).await;

    assert!(!report.passed);
    let failure = report.first_failure().unwrap();
    assert_eq!(failure.name, "check_cut_off");
    assert_eq!(failure.error_kind.as_deref(), Some("mismatch"));
    assert!(failure.error.as_deref().unwrap().contains("internet from eth2"));
    // isolation was never tested
    assert_eq!(bed.log.count("client eth1 ping 192"), 1);
}

#[tokio::test(start_paused = true)]
async fn rename_round_trip_restores_nickname() {
    let bed = FakeBed::standard();
    let params = ScenarioParams::new(NetworkMode::Router, WanPort::Primary, NodeRole::Gw);

    let report = RenameScenario.run(&bed.context(params)).await;

    assert!(report.passed, "{:?}", report.message);
    assert_eq!(bed.log.count("cloud rename S0000000001"), 2);
    assert_eq!(
        bed.cloud.nicknames.lock().get("S0000000001").map(String::as_str),
        Some("pod-S0000000001")
    );
    // one connect plus four reconnect cycles
    assert_eq!(bed.log.count("switch connect eth1 gw"), 5);
    assert_eq!(bed.log.count("switch disconnect eth1 gw"), 4);
    assert!(bed.log.contains("pod sanity gw"));
}

#[tokio::test(start_paused = true)]
async fn rename_honours_attempts_option() {
    let bed = FakeBed::standard();

    let report = RenameScenario
        .run(&bed.context_with(router_gw(), &[("attempts", 1)]))
        .await;

    assert!(report.passed, "{:?}", report.message);
    assert_eq!(bed.log.count("switch disconnect eth1 gw"), 1);
}

fn leaf_router() -> ScenarioParams {
    ScenarioParams::new(NetworkMode::Router, WanPort::Primary, NodeRole::Leaf)
}

#[tokio::test(start_paused = true)]
async fn reboot_location_waits_for_two_pods_to_drop() {
    let bed = FakeBed::standard();

    let report = AfterRebootScenario::new(RebootTarget::Location)
        .run(&bed.context(leaf_router()))
        .await;

    assert!(report.passed, "{:?}", report.message);
    assert!(bed.log.contains("cloud reboot location"));
    assert_eq!(bed.log.count("pod reboot"), 0);
    assert_eq!(bed.cloud.disconnect_gates(), vec![(3, Some(2))]);
    assert!(bed.log.contains("switch connect eth1 l1"));
    assert!(bed.log.contains("switch connect eth2 l1"));
}

#[tokio::test(start_paused = true)]
async fn reboot_leaf_waits_for_the_leaf_alone() {
    let bed = FakeBed::standard();

    let report = AfterRebootScenario::new(RebootTarget::Leaf)
        .run(&bed.context(leaf_router()))
        .await;

    assert!(report.passed, "{:?}", report.message);
    assert!(bed.log.contains("pod reboot l1"));
    assert_eq!(bed.cloud.disconnect_gates(), vec![(1, Some(1))]);
    assert_eq!(bed.cloud.queries.lock()[0].pods, vec!["S0000000002".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn reboot_gw_waits_for_the_gateway() {
    let bed = FakeBed::standard();

    let report = AfterRebootScenario::new(RebootTarget::Gw)
        .run(&bed.context(leaf_router()))
        .await;

    assert!(report.passed, "{:?}", report.message);
    assert!(bed.log.contains("pod reboot gw"));
    assert_eq!(bed.cloud.disconnect_gates(), vec![(1, Some(1))]);
    assert_eq!(bed.cloud.queries.lock()[0].pods, vec!["S0000000001".to_string()]);
    // leases are renewed once more after the reboot
    assert_eq!(bed.log.count("client eth1 dhcp"), 2);
}

#[tokio::test(start_paused = true)]
async fn reboot_not_noticed_skips_recovery_checks() {
    let bed = FakeBed::build(MockLocation::standard(7), |cloud| {
        cloud.disconnected = Script::constant(false);
    });

    let report = AfterRebootScenario::new(RebootTarget::Leaf)
        .run(&bed.context(leaf_router()))
        .await;

    assert!(!report.passed);
    let failure = report.first_failure().unwrap();
    assert_eq!(failure.name, "wait_ready");
    assert_eq!(failure.error_kind.as_deref(), Some("timeout"));
    assert_eq!(report.count(StepStatus::Skipped), 2);
}

#[tokio::test(start_paused = true)]
async fn network_mode_change_flips_and_restores() {
    let bed = FakeBed::standard();

    let report = NetworkModeChangeScenario.run(&bed.context(leaf_router())).await;

    assert!(report.passed, "{:?}", report.message);
    assert!(bed.log.contains("switch connect eth1 l1"));
    assert!(bed.log.contains("switch connect eth2 l1"));
    let flipped = bed.log.position("cloud mode bridge").unwrap();
    let restored = bed.log.position("cloud mode router").unwrap();
    assert!(flipped < restored);
    assert_eq!(*bed.cloud.mode.lock(), NetworkMode::Router);
    // both directions, before and after the flip
    assert_eq!(bed.log.count("client eth1 ping 192"), 2);
    assert_eq!(bed.log.count("client eth2 ping 192"), 2);
}

#[tokio::test(start_paused = true)]
async fn switching_network_mode_toggles_each_attempt() {
    let bed = FakeBed::standard();
    let params = ScenarioParams::new(NetworkMode::Bridge, WanPort::Primary, NodeRole::Gw);

    let report = SwitchingNetworkModeScenario
        .run(&bed.context_with(params, &[("attempts", 2)]))
        .await;

    assert!(report.passed, "{:?}", report.message);
    let modes: Vec<String> = bed
        .log
        .entries()
        .into_iter()
        .filter(|e| e.starts_with("cloud mode"))
        .collect();
    // two flips, then the teardown restores the variant's mode
    assert_eq!(
        modes,
        vec!["cloud mode router", "cloud mode bridge", "cloud mode bridge"]
    );
    assert_eq!(bed.log.count("cloud pods connected"), 2);
}

#[tokio::test(start_paused = true)]
async fn unmanaged_pod_skips_sanity_and_settles() {
    let location = MockLocation::new()
        .with_pod(MockPod::new("gw", "S0000000001").gateway())
        .with_pod(MockPod::new("l1", "S0000000002"))
        .with_pod(MockPod::new("l2", "S0000000003").without_management());
    let bed = FakeBed::build(location, |_| {});

    let report = wait_pods_ready(&bed.context(router_gw())).await.unwrap();

    assert!(bed.log.contains("pod sanity gw"));
    assert!(bed.log.contains("pod sanity l1"));
    assert_eq!(bed.log.count("pod sanity l2"), 0);
    let (name, settled) = report.phases[2];
    assert_eq!(name, "loop_protection");
    assert!(settled >= Timing::default().unmanaged_settle);
}
