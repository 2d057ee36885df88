//! Configuration parsing
//!
//! Handles parsing of testbed configuration files and scenario options.
//!
//! ## Configuration Format
//!
//! ```yaml
//! testbed:
//!   name: lab-1
//!   gateway_url: http://testbed-gw:8000
//!   nodes:
//!     - name: gw
//!       id: S0000000001
//!       role: gw
//!     - name: l1
//!       id: S0000000002
//!       role: leaf
//!       mgmt: false
//!   clients:
//!     - name: eth1
//!       kind: eth
//!       iface: eth0
//!       mac: "02:00:00:00:00:01"
//!   network:
//!     ssid: home
//!     key: secret
//!   test_server: 192.168.200.1
//!
//! timing:
//!   poll_interval: 5s
//!   cloud_timeout: 3m
//!
//! scenarios:
//!   plug_unplug_dynamic:
//!     network_modes: [router]
//!     iterations: 2
//!   connect_wifi_client:
//!     enabled: false
//! ```

mod testbed;

pub use testbed::{ClientConfig, Config, ConfigError, NodeConfig, ScenarioConfig, TestbedConfig};
