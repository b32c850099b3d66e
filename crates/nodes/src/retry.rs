//! Retry executor applied to every outbound call.
//!
//! The orchestrator owns one [`Retrier`] built from [`RetryConfig`] and hands it
//! to each stage. Stages wrap each single remote operation in
//! [`Retrier::run`]; they never loop on their own. This keeps the budget, the
//! backoff schedule, and the transient/fatal decision in one place.

use std::future::Future;
use std::time::Duration;

use pipeline::{RetryConfig, RetryPolicy, Retryable};
use tracing::{debug, warn};

/// Bounded exponential-backoff retry with a per-attempt deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrier {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    max_server_delay: Duration,
}

/// Server-requested waits longer than this fail the call unless configured
/// otherwise.
pub const DEFAULT_MAX_SERVER_DELAY: Duration = Duration::from_secs(60);

impl Retrier {
    /// Creates a retrier. `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
            max_server_delay: DEFAULT_MAX_SERVER_DELAY,
        }
    }

    /// Caps how long a server may ask the retrier to wait.
    pub fn with_max_server_delay(mut self, max_server_delay: Duration) -> Self {
        self.max_server_delay = max_server_delay;
        self
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.initial_backoff(),
            config.max_backoff(),
        )
        .with_max_server_delay(config.max_server_delay())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `retry` (zero-based): `initial * 2^retry`,
    /// capped at the configured maximum.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(31));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Runs `call` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent.
    ///
    /// Each attempt is bounded by `deadline`; an attempt that overruns it fails
    /// with `E::timed_out(deadline)`, which is retryable. A server-requested
    /// delay (`RetryPolicy::Retryable { after: Some(_) }`) is honoured when it
    /// exceeds the scheduled backoff; one longer than the configured maximum
    /// fails the call without sleeping.
    pub async fn run<T, E, F, Fut>(
        &self,
        operation: &'static str,
        deadline: Duration,
        mut call: F,
    ) -> Result<T, E>
    where
        E: Retryable,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(deadline, call()).await {
                Ok(result) => result,
                Err(_) => Err(E::timed_out(deadline)),
            };

            let err = match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            match err.retry_policy() {
                RetryPolicy::Retryable { after: Some(after) } if after > self.max_server_delay => {
                    warn!(
                        operation,
                        attempt,
                        requested_secs = after.as_secs(),
                        max_secs = self.max_server_delay.as_secs(),
                        error = %err,
                        "server asked for a longer wait than allowed, giving up"
                    );
                    return Err(err);
                }
                RetryPolicy::Retryable { after } if attempt < self.max_attempts => {
                    let delay = self.backoff_for(attempt - 1).max(after.unwrap_or_default());
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryPolicy::Retryable { .. } => {
                    warn!(operation, attempts = attempt, error = %err, "retry budget exhausted");
                    return Err(err);
                }
                RetryPolicy::NonRetryable => {
                    debug!(operation, attempt, error = %err, "non-retryable failure");
                    return Err(err);
                }
            }
        }
    }
}

impl Default for Retrier {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
