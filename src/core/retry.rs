//! Retry/backoff/timeout wrapper for external service calls.
//!
//! A pure decorator: every attempt runs under the configured timeout and
//! failures are retried with exponential backoff until the attempt budget
//! is exhausted, at which point the final error is returned to the caller.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Upper bound on a single backoff sleep. The base comes from the
/// environment, so the exponential must stay inside `Duration` range.
const MAX_DELAY_SECONDS: f64 = 300.0;

/// Retry policy for a class of external calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallPolicy {
    /// Maximum number of attempts, including the first try
    pub max_attempts: u32,

    /// Per-attempt timeout in seconds
    pub timeout_seconds: u64,

    /// Base of the exponential backoff: the sleep before attempt n+1 is
    /// `backoff_base_seconds ^ n` (attempt numbers starting at 1), capped
    /// at `MAX_DELAY_SECONDS`
    pub backoff_base_seconds: f64,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_seconds: 60,
            backoff_base_seconds: 2.0,
        }
    }
}

impl CallPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Sleep duration after a failed attempt (1-indexed), capped at
    /// `MAX_DELAY_SECONDS`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let raw = self.backoff_base_seconds.powi(attempt as i32);
        let capped = if raw.is_finite() {
            raw.clamp(0.0, MAX_DELAY_SECONDS)
        } else {
            MAX_DELAY_SECONDS
        };
        Duration::from_secs_f64(capped)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Run `op` under this policy. Each attempt is bounded by the
    /// per-attempt timeout; the error of the last attempt is propagated
    /// once the budget is exhausted.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let result = match tokio::time::timeout(self.timeout(), op()).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!(
                    "{} timed out after {}s",
                    label,
                    self.timeout_seconds
                )),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if self.should_retry(attempt) {
                        let delay = self.delay_for_attempt(attempt);
                        warn!(
                            call = label,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "call failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    return Err(e).with_context(|| {
                        format!("{} failed after {} attempts", label, attempt)
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant_policy(max_attempts: u32) -> CallPolicy {
        CallPolicy {
            max_attempts,
            timeout_seconds: 5,
            backoff_base_seconds: 0.0,
        }
    }

    #[test]
    fn test_exponential_delay_schedule() {
        let policy = CallPolicy {
            backoff_base_seconds: 2.0,
            ..Default::default()
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_is_capped_for_extreme_bases() {
        let cap = Duration::from_secs_f64(MAX_DELAY_SECONDS);

        let huge = CallPolicy {
            backoff_base_seconds: 1e300,
            ..Default::default()
        };
        // 1e300 ^ 2 overflows f64 to infinity; both must stay at the cap
        // instead of panicking in Duration construction.
        assert_eq!(huge.delay_for_attempt(1), cap);
        assert_eq!(huge.delay_for_attempt(2), cap);

        let negative = CallPolicy {
            backoff_base_seconds: -2.0,
            ..Default::default()
        };
        assert_eq!(negative.delay_for_attempt(1), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_success_on_last_attempt() {
        let policy = instant_policy(3);
        let calls = AtomicU32::new(0);

        let result = policy
            .run("flaky", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    anyhow::bail!("attempt {} failed", n);
                }
                Ok(n)
            })
            .await
            .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_after_exact_attempts() {
        let policy = instant_policy(3);
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .run("doomed", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("nope");
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempt_times_out() {
        let policy = CallPolicy {
            max_attempts: 1,
            timeout_seconds: 0,
            backoff_base_seconds: 0.0,
        };

        let result: Result<()> = policy
            .run("hung", || async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;

        let err = result.unwrap_err().to_string();
        assert!(err.contains("hung"), "unexpected error: {err}");
    }
}
