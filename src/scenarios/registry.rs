//! Scenario registry
//!
//! Central registry of all available scenarios. New scenarios should be
//! registered here.
//!
//! ## Scenario Ordering
//!
//! Scenarios run in registration order. The plain wired checks come first
//! so a broken testbed shows up before the disruptive scenarios spend
//! minutes on reboots and mode changes.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use std::sync::Arc;

use super::traits::Scenario;
use super::{
    AfterRebootScenario, EthernetLanScenario, FingerprintingScenario, MtuScenario,
    NetworkModeChangeScenario, PlugUnplugScenario, RebootTarget, RenameScenario, SwitchingNetworkModeScenario,
    SwitchingWanScenario, WifiClientScenario, WiredConnectionScenario,
};

/// Global registry of all available scenarios
pub static SCENARIOS: Lazy<IndexMap<&'static str, Arc<dyn Scenario>>> = Lazy::new(|| {
    let mut m: IndexMap<&'static str, Arc<dyn Scenario>> = IndexMap::new();

    let scenarios: Vec<Arc<dyn Scenario>> = vec![
        Arc::new(WiredConnectionScenario),
        Arc::new(MtuScenario::eth()),
        Arc::new(RenameScenario),
        Arc::new(PlugUnplugScenario::dynamic()),
        Arc::new(PlugUnplugScenario::static_mode()),
        Arc::new(AfterRebootScenario::new(RebootTarget::Location)),
        Arc::new(AfterRebootScenario::new(RebootTarget::Leaf)),
        Arc::new(AfterRebootScenario::new(RebootTarget::Gw)),
        Arc::new(NetworkModeChangeScenario),
        Arc::new(SwitchingNetworkModeScenario),
        Arc::new(SwitchingWanScenario),
        Arc::new(FingerprintingScenario),
        Arc::new(EthernetLanScenario),
        Arc::new(WifiClientScenario),
        Arc::new(MtuScenario::wifi()),
    ];
    for scenario in scenarios {
        m.insert(scenario.name(), scenario);
    }

    m
});

/// Get a scenario by name
pub fn get_scenario(name: &str) -> Option<Arc<dyn Scenario>> {
    SCENARIOS.get(name).cloned()
}

/// List all available scenario names
pub fn list_scenarios() -> Vec<&'static str> {
    let mut names: Vec<_> = SCENARIOS.keys().copied().collect();
    names.sort();
    names
}
