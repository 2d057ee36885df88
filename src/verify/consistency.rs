//! Cross-source consistency check
//!
//! Compares one property as seen by two independent observers, typically a
//! device-local command (ground truth) and the cloud controller. The ground
//! truth is read once; the cloud is polled until it agrees.
//!
//! ## Outcomes
//!
//! - `Matched`: the cloud reported the ground-truth value before the deadline
//! - `SourceUnavailable`: the ground truth could not be read, nothing is polled
//! - `Mismatch`: the cloud settled on a different value
//! - `Timeout`: the cloud never reported a value at all

use std::fmt::{Debug, Display};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::poll::{PollOptions, poll_until};
use super::{VerificationPhase, VerifyError};

/// Successful consistency verification
#[derive(Debug, Clone)]
pub struct Consistent<T, O> {
    /// The agreed value
    pub value: T,
    /// The observation that matched
    pub observation: O,
    /// Convergence time of the observed source
    pub elapsed: Duration,
    pub attempts: u32,
}

/// One property compared between a ground-truth source and an observed one
#[derive(Debug, Clone)]
pub struct CrossSourceCheck {
    property: String,
    truth_source: String,
    observed_source: String,
    opts: PollOptions,
}

impl CrossSourceCheck {
    pub fn new(
        property: impl Into<String>,
        truth_source: impl Into<String>,
        observed_source: impl Into<String>,
        opts: PollOptions,
    ) -> Self {
        Self {
            property: property.into(),
            truth_source: truth_source.into(),
            observed_source: observed_source.into(),
            opts,
        }
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    fn enter(&self, phase: VerificationPhase) {
        debug!(
            property = %self.property,
            truth = %self.truth_source,
            observed = %self.observed_source,
            phase = %phase,
            "Consistency check phase"
        );
    }

    /// Run the check
    ///
    /// `ground_truth` resolves once; `Ok(None)` means the source answered
    /// without a value. `observe` is polled and `extract` pulls the property
    /// out of each observation.
    pub async fn run<T, O, E1, E2, G, Q, Fut, X>(
        &self,
        ground_truth: G,
        observe: Q,
        extract: X,
    ) -> Result<Consistent<T, O>, VerifyError>
    where
        T: PartialEq + Display,
        O: Debug,
        E1: Display,
        E2: Display,
        G: Future<Output = Result<Option<T>, E1>>,
        Q: FnMut() -> Fut,
        Fut: Future<Output = Result<O, E2>>,
        X: Fn(&O) -> Option<T>,
    {
        self.enter(VerificationPhase::Init);
        let truth = match ground_truth.await {
            Ok(Some(value)) => value,
            Ok(None) => {
                self.enter(VerificationPhase::SourceError);
                return Err(VerifyError::source_unavailable(
                    &self.truth_source,
                    format!("no {} reported", self.property),
                ));
            }
            Err(e) => {
                self.enter(VerificationPhase::SourceError);
                return Err(VerifyError::source_unavailable(&self.truth_source, e));
            }
        };

        self.enter(VerificationPhase::Polling);
        let outcome = poll_until(self.opts, observe, |o| {
            extract(o).is_some_and(|value| value == truth)
        })
        .await;

        match outcome {
            Ok(verified) => {
                self.enter(VerificationPhase::Matched);
                info!(
                    property = %self.property,
                    value = %truth,
                    source = %self.observed_source,
                    elapsed_ms = verified.elapsed.as_millis() as u64,
                    "Sources agree"
                );
                Ok(Consistent {
                    value: truth,
                    observation: verified.observation,
                    elapsed: verified.elapsed,
                    attempts: verified.attempts,
                })
            }
            Err(expired) => {
                self.enter(VerificationPhase::TimedOut);
                let reported = expired.last.as_ref().and_then(&extract);
                match reported {
                    Some(actual) => {
                        warn!(
                            property = %self.property,
                            expected = %truth,
                            actual = %actual,
                            "Sources disagree at deadline"
                        );
                        Err(VerifyError::mismatch(&self.property, truth, actual))
                    }
                    None => Err(expired.into_timeout(format!(
                        "{} to report {} {}",
                        self.observed_source, self.property, truth
                    ))),
                }
            }
        }
    }
}
