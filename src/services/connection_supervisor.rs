use std::{fmt::Display, future::Future, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

const INITIAL_DELAY: Duration = Duration::from_millis(250);
const MAX_DELAY: Duration = Duration::from_secs(5);
const MAX_CONNECT_ATTEMPTS: u32 = 10;

/// Exponential backoff between connection attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Cap on the doubled delay.
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: INITIAL_DELAY,
            max_delay: MAX_DELAY,
            max_attempts: MAX_CONNECT_ATTEMPTS,
        }
    }
}

/// Call `connect` until it succeeds, sleeping with doubling delays in between.
///
/// The last error is returned once `policy.max_attempts` attempts have failed.
pub async fn connect_with_retry<T, E, F, Fut>(
    backend: &'static str,
    policy: RetryPolicy,
    mut connect: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 1;

    loop {
        match connect().await {
            Ok(connection) => {
                info!(backend, attempt, "connection established");
                return Ok(connection);
            }
            Err(err) if attempt >= policy.max_attempts => {
                warn!(backend, attempt, error = %err, "exhausted connection attempts");
                return Err(err);
            }
            Err(err) => {
                warn!(backend, attempt, error = %err, "connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(policy.max_delay);
                attempt += 1;
            }
        }
    }
}
