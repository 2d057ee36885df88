//! meshcheck test kit
//!
//! Test infrastructure for exercising mesh verification without hardware.
//!
//! This crate provides:
//! - Scripted value sequences standing in for converging state sources
//! - Call logs for asserting the order fakes were driven in
//! - Mock testbed layouts with seeded device identities
//!
//! # Example
//!
//! ```rust
//! use meshcheck_testkit::{CallLog, Script};
//!
//! let log = CallLog::new();
//! let state = Script::new(["disconnected", "connected"]);
//!
//! log.record("poll");
//! assert_eq!(state.next(), "disconnected");
//! assert_eq!(log.entries(), vec!["poll"]);
//! ```

pub mod mock;
pub mod random;
pub mod script;

// Re-exports for convenience
pub use mock::{CallLog, MockClient, MockLocation, MockPod};
pub use random::PseudoGenerator;
pub use script::Script;
