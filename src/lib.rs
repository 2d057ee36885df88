//! Meshcheck - acceptance harness for WiFi mesh testbeds
//!
//! Drives a physical testbed (cloud controller, managed switch, mesh pods
//! and test clients) through acceptance scenarios, and verifies the
//! eventually-consistent state the devices and the cloud converge to.
//!
//! ## Modules
//!
//! - [`verify`] - Poll-until-condition, readiness gate, cross-source checks
//! - [`testbed`] - Collaborator traits and their HTTP adapters
//! - [`scenarios`] - Step plans, the scenario registry and the runner
//! - [`config`] - Testbed configuration parsing
//! - [`api`] - Status HTTP API and Prometheus metrics

pub mod api;
pub mod config;
pub mod scenarios;
pub mod testbed;
pub mod verify;
