//! Retry wrapper with exponential backoff.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How many times to try an operation and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts, including the first. Zero is treated as one.
  pub max_attempts: u32,
  /// Base of the exponential backoff
  pub base_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      base_delay: Duration::from_millis(1000),
    }
  }
}

impl RetryPolicy {
  pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
    Self {
      max_attempts,
      base_delay,
    }
  }

  /// Attempts actually made before giving up.
  pub fn attempts(&self) -> u32 {
    self.max_attempts.max(1)
  }

  /// Wait after the `attempt`-th failure (1-based): `base_delay * 2^attempt`.
  pub fn delay_after(&self, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    self.base_delay.saturating_mul(factor)
  }

  /// Run `op` until it succeeds or the attempt budget is spent.
  ///
  /// The error of the final attempt is returned as-is.
  pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
  {
    let max = self.attempts();
    let mut attempt = 0;

    loop {
      match op().await {
        Ok(value) => return Ok(value),
        Err(e) => {
          attempt += 1;
          if attempt >= max {
            return Err(e);
          }
          let delay = self.delay_after(attempt);
          warn!(
            attempt,
            max_attempts = max,
            delay_ms = delay.as_millis() as u64,
            "Attempt failed, retrying: {}",
            e
          );
          tokio::time::sleep(delay).await;
        }
      }
    }
  }
}

/// Free-function form of [`RetryPolicy::run`].
pub async fn retry<T, E, F, Fut>(op: F, max_attempts: u32, base_delay: Duration) -> Result<T, E>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
  E: std::fmt::Display,
{
  RetryPolicy::new(max_attempts, base_delay).run(op).await
}
