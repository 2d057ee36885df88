//! Bounded poll-until-condition loop
//!
//! Queries a state source on a fixed tick until a predicate holds or the
//! deadline passes. Query errors are treated as transient: they are logged
//! and retried, never returned early. There is no backoff.

use std::fmt::{Debug, Display};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::VerifyError;

/// Tick interval used when a step does not ask for anything else
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Timeout budget and tick interval for one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    timeout: Duration,
    interval: Duration,
}

impl PollOptions {
    /// Validate and build poll options
    ///
    /// Requires `timeout > 0` and `0 < interval < timeout`.
    pub fn new(timeout: Duration, interval: Duration) -> Result<Self, VerifyError> {
        if timeout.is_zero() {
            return Err(VerifyError::precondition("poll timeout must be positive"));
        }
        if interval.is_zero() || interval >= timeout {
            return Err(VerifyError::precondition(format!(
                "poll interval {interval:?} must be positive and shorter than timeout {timeout:?}"
            )));
        }
        Ok(Self { timeout, interval })
    }

    /// Poll options with the default interval
    pub fn with_timeout(timeout: Duration) -> Result<Self, VerifyError> {
        Self::new(timeout, DEFAULT_POLL_INTERVAL)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// A satisfying observation
#[derive(Debug, Clone)]
pub struct Verified<T> {
    pub observation: T,
    /// Time from the first query until the satisfying one returned
    pub elapsed: Duration,
    pub attempts: u32,
}

/// Deadline exceeded without the predicate holding
#[derive(Debug, Clone)]
pub struct Expired<T> {
    pub waited: Duration,
    pub attempts: u32,
    /// Last successful observation, if any query succeeded
    pub last: Option<T>,
    /// Last transient query error, if any
    pub last_error: Option<String>,
}

impl<T: Debug> Expired<T> {
    /// Human readable rendering of what was last seen
    pub fn describe_last(&self) -> String {
        match (&self.last, &self.last_error) {
            (Some(observation), _) => format!("{observation:?}"),
            (None, Some(error)) => format!("query error: {error}"),
            (None, None) => "nothing".to_string(),
        }
    }

    pub fn into_timeout(self, expected: impl Into<String>) -> VerifyError {
        VerifyError::Timeout {
            expected: expected.into(),
            waited: self.waited,
            last_observed: self.describe_last(),
        }
    }
}

/// Poll `query` until `predicate` holds or `opts.timeout` elapses
///
/// The first query runs immediately. The sleep before the last tick is
/// clamped to the deadline, so the call returns within `timeout + interval`
/// plus the duration of the query in flight.
pub async fn poll_until<T, E, Q, Fut, P>(
    opts: PollOptions,
    mut query: Q,
    mut predicate: P,
) -> Result<Verified<T>, Expired<T>>
where
    T: Debug,
    E: Display,
    Q: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&T) -> bool,
{
    let start = Instant::now();
    let deadline = start + opts.timeout;
    let mut attempts = 0u32;
    let mut last = None;
    let mut last_error = None;

    loop {
        attempts += 1;
        match query().await {
            Ok(observation) if predicate(&observation) => {
                let elapsed = start.elapsed();
                debug!(
                    attempts = attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Condition satisfied"
                );
                return Ok(Verified {
                    observation,
                    elapsed,
                    attempts,
                });
            }
            Ok(observation) => {
                trace!(attempt = attempts, observed = ?observation, "Condition not met yet");
                last = Some(observation);
            }
            Err(e) => {
                warn!(attempt = attempts, error = %e, "State query failed, retrying");
                last_error = Some(e.to_string());
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(Expired {
                waited: now - start,
                attempts,
                last,
                last_error,
            });
        }
        tokio::time::sleep(opts.interval.min(deadline - now)).await;
    }
}

/// [`poll_until`] with the expiry mapped to [`VerifyError::Timeout`]
pub async fn wait_for<T, E, Q, Fut, P>(
    expected: &str,
    opts: PollOptions,
    query: Q,
    predicate: P,
) -> Result<Verified<T>, VerifyError>
where
    T: Debug,
    E: Display,
    Q: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&T) -> bool,
{
    poll_until(opts, query, predicate).await.map_err(|expired| {
        warn!(
            expected = expected,
            attempts = expired.attempts,
            waited_ms = expired.waited.as_millis() as u64,
            "Condition not met before deadline"
        );
        expired.into_timeout(expected)
    })
}
