//! Reconnection supervisor
//!
//! Retries broker connection establishment with a fixed delay between
//! attempts. The default policy is a single retry after 5 seconds; bounded
//! additional retries can be configured. Once the budget is exhausted the
//! last error propagates to the caller.

use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Fixed-delay retry policy for connection establishment
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay between a failed attempt and the next one
    pub retry_delay: Duration,
    /// Number of retries after the initial attempt
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(5),
            max_retries: 1,
        }
    }
}

/// Run `connect` until it succeeds or the retry budget is exhausted.
///
/// The closure receives the attempt number (0 for the initial attempt).
/// On success no further attempts are made.
pub async fn connect_with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut connect: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        match connect(attempt).await {
            Ok(session) => {
                if attempt > 0 {
                    info!(attempt, "connection established after retry");
                }
                return Ok(session);
            }
            Err(e) if attempt < policy.max_retries => {
                warn!(
                    attempt,
                    delay_ms = policy.retry_delay.as_millis() as u64,
                    "connection attempt failed: {e}, retrying"
                );
                tokio::time::sleep(policy.retry_delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(attempt, "connection attempt failed: {e}, retry budget exhausted");
                return Err(e);
            }
        }
    }
}
