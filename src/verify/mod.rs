//! Eventually-consistent state verification
//!
//! The testbed never changes state atomically. A reboot, a cable plug or a
//! mode switch is followed by minutes of convergence during which the cloud,
//! the pods and the clients disagree. Everything in this module waits for
//! that convergence under a bounded deadline and then asserts on the result.
//!
//! ## Building blocks
//!
//! - [`poll`] - bounded poll-until-condition loop
//! - [`readiness`] - ordered, fail-fast composite readiness gate
//! - [`consistency`] - device-local ground truth vs cloud-reported value
//! - [`inet`] - IPv4 extraction from `ip addr` output

pub mod consistency;
pub mod inet;
pub mod poll;
pub mod readiness;

use std::time::Duration;
use thiserror::Error;

use crate::testbed::TestbedError;

pub use consistency::{Consistent, CrossSourceCheck};
pub use inet::{INET_MARKER, extract_inet_address};
pub use poll::{DEFAULT_POLL_INTERVAL, Expired, PollOptions, Verified, poll_until, wait_for};
pub use readiness::{ReadinessCheck, ReadinessGate, ReadinessReport};

/// Errors produced while verifying testbed state
///
/// Every variant carries enough context to explain the failure without
/// re-running the scenario: what was expected and what was last seen.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The deadline passed before the condition held
    #[error("Timed out after {waited:?} waiting for {expected} (last observed: {last_observed})")]
    Timeout {
        expected: String,
        waited: Duration,
        last_observed: String,
    },

    /// The ground-truth source could not be read
    #[error("Source '{source_name}' unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    /// Both sources answered but disagree
    #[error("Mismatch on {property}: expected {expected}, observed {actual}")]
    Mismatch {
        property: String,
        expected: String,
        actual: String,
    },

    /// A measured duration exceeded its limit
    #[error("KPI '{metric}' exceeded: took {actual:?}, limit {limit:?}")]
    KpiExceeded {
        metric: String,
        actual: Duration,
        limit: Duration,
    },

    /// The step could not start
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// A testbed action failed outright
    #[error("Testbed error: {0}")]
    Testbed(#[from] TestbedError),
}

impl VerifyError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionFailed(message.into())
    }

    pub fn source_unavailable(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn mismatch(
        property: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::Mismatch {
            property: property.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Terminal verification phase this error corresponds to, if any
    pub fn phase(&self) -> Option<VerificationPhase> {
        match self {
            Self::Timeout { .. } | Self::Mismatch { .. } => Some(VerificationPhase::TimedOut),
            Self::SourceUnavailable { .. } => Some(VerificationPhase::SourceError),
            _ => None,
        }
    }

    /// Short machine-friendly name of the failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::Mismatch { .. } => "mismatch",
            Self::KpiExceeded { .. } => "kpi_exceeded",
            Self::PreconditionFailed(_) => "precondition_failed",
            Self::Testbed(_) => "testbed",
        }
    }
}

/// Phases of a single verification cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationPhase {
    /// Deadline captured, ground truth being fetched
    Init,
    /// Retry loop running
    Polling,
    /// Condition held before the deadline
    Matched,
    /// Deadline passed
    TimedOut,
    /// Ground truth could not be obtained
    SourceError,
}

impl VerificationPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Matched | Self::TimedOut | Self::SourceError)
    }
}

impl std::fmt::Display for VerificationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationPhase::Init => write!(f, "init"),
            VerificationPhase::Polling => write!(f, "polling"),
            VerificationPhase::Matched => write!(f, "matched"),
            VerificationPhase::TimedOut => write!(f, "timed_out"),
            VerificationPhase::SourceError => write!(f, "source_error"),
        }
    }
}
