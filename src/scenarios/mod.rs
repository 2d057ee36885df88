//! Acceptance scenarios for a mesh testbed
//!
//! This module provides the `Scenario` trait, the step plan every scenario
//! is built from, and the scenarios themselves.
//!
//! ## Scenario Groups
//!
//! - **Wired clients**: wired_connection, client_connectivity_mtu,
//!   connect_disconnect_rename, plug_unplug_dynamic, plug_unplug_static
//! - **Disruption**: reboot_location, reboot_leaf, reboot_gw,
//!   network_mode_change, switching_network_mode, switching_wan
//! - **Cloud features**: device_fingerprinting, disable_ethernet_lan
//! - **Wireless**: connect_wifi_client, client_connectivity_mtu_wifi
//!
//! ## Adding New Scenarios
//!
//! 1. Create a new file in `src/scenarios/` (e.g., `my_scenario.rs`)
//! 2. Build a `StepPlan` and implement the `Scenario` trait
//! 3. Register in `registry.rs`
//! 4. Add to `mod.rs` exports

mod after_reboot;
pub mod common;
mod ethernet_lan;
mod fingerprinting;
mod mtu;
mod network_mode;
mod plug_unplug;
pub mod registry;
mod rename;
pub mod runner;
pub mod steps;
mod switching_wan;
mod traits;
mod wifi;
mod wired_connection;

pub use after_reboot::{AfterRebootScenario, RebootTarget};
pub use ethernet_lan::EthernetLanScenario;
pub use fingerprinting::FingerprintingScenario;
pub use mtu::{MtuScenario, mtu_ping_command};
pub use network_mode::{NetworkModeChangeScenario, SwitchingNetworkModeScenario};
pub use plug_unplug::PlugUnplugScenario;
pub use registry::SCENARIOS;
pub use rename::RenameScenario;
pub use runner::{run_scenarios, run_variant};
pub use steps::{StepFn, StepFuture, StepObserver, StepPlan};
pub use switching_wan::SwitchingWanScenario;
pub use traits::*;
pub use wifi::WifiClientScenario;
pub use wired_connection::WiredConnectionScenario;
