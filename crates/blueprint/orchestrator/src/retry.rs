//! Retry policies shared by deployer calls and health polling

use crate::config::{DeployerConfig, HealthConfig};
use crate::error::Retryable;
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Delay schedule between attempts. `attempt` is the 1-based number of the
/// attempt that just failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `base * attempt + random(0..jitter)`
    Linear { base: Duration, jitter: Duration },
    /// `initial + (attempt - 1) * step`
    Stepped { initial: Duration, step: Duration },
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Linear { base, jitter } => {
                let jitter = if jitter.is_zero() {
                    Duration::ZERO
                } else {
                    rand::thread_rng().gen_range(Duration::ZERO..jitter)
                };
                base * attempt + jitter
            }
            Backoff::Stepped { initial, step } => initial + step * attempt.saturating_sub(1),
        }
    }
}

/// A bounded number of attempts separated by a [`Backoff`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Policy for deployer calls.
    pub fn for_deployer(config: &DeployerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Backoff::Linear {
                base: Duration::from_millis(config.backoff_base_ms),
                jitter: Duration::from_millis(config.backoff_jitter_ms),
            },
        }
    }

    /// Policy for polling a component with the given wait budget.
    pub fn for_health(config: &HealthConfig, budget: Duration) -> Self {
        let backoff = Backoff::Stepped {
            initial: Duration::from_millis(config.initial_delay_ms),
            step: Duration::from_millis(config.step_ms),
        };
        Self {
            max_attempts: attempts_for_budget(
                &backoff,
                budget.mul_f64(config.budget_fraction),
                config.max_attempts,
            ),
            backoff,
        }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempts run out. The last error is returned.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && e.is_retryable() => {
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Number of attempts whose cumulative backoff fits in `limit`, at least
/// one and at most `cap`.
pub fn attempts_for_budget(backoff: &Backoff, limit: Duration, cap: u32) -> u32 {
    let cap = cap.max(1);
    let mut attempts = 1;
    let mut elapsed = Duration::ZERO;
    while attempts < cap {
        elapsed += backoff.delay(attempts);
        if elapsed > limit {
            break;
        }
        attempts += 1;
    }
    attempts
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Flaky(bool);

    impl Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky(retryable={})", self.0)
        }
    }

    impl Retryable for Flaky {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    fn stepped() -> Backoff {
        Backoff::Stepped {
            initial: Duration::from_secs(7),
            step: Duration::from_secs(3),
        }
    }

    #[test]
    fn test_stepped_schedule() {
        let backoff = stepped();
        assert_eq!(backoff.delay(1), Duration::from_secs(7));
        assert_eq!(backoff.delay(2), Duration::from_secs(10));
        assert_eq!(backoff.delay(4), Duration::from_secs(16));
    }

    #[test]
    fn test_linear_without_jitter_is_exact() {
        let backoff = Backoff::Linear {
            base: Duration::from_secs(10),
            jitter: Duration::ZERO,
        };
        assert_eq!(backoff.delay(1), Duration::from_secs(10));
        assert_eq!(backoff.delay(2), Duration::from_secs(20));
    }

    #[test]
    fn test_attempts_for_budget() {
        // 7 + 10 + 13 + 16 = 46s fits in 80% of 60s, the next 19s does not.
        let limit = Duration::from_secs(60).mul_f64(0.8);
        assert_eq!(attempts_for_budget(&stepped(), limit, 100), 5);
        assert_eq!(attempts_for_budget(&stepped(), Duration::ZERO, 100), 1);
        assert_eq!(attempts_for_budget(&stepped(), Duration::from_secs(86_400), 100), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_errors_use_every_attempt() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: stepped(),
        };
        let started = tokio::time::Instant::now();
        let result: Result<(), Flaky> = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Flaky(true)) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(17));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff: stepped(),
        };
        let result: Result<(), Flaky> = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Flaky(false)) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_retry() {
        let policy = RetryPolicy {
            max_attempts: 2,
            backoff: stepped(),
        };
        let result: Result<u32, Flaky> = policy
            .run(|attempt| async move {
                if attempt == 1 {
                    Err(Flaky(true))
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
    }

    proptest! {
        #[test]
        fn prop_linear_delay_stays_in_window(attempt in 1u32..10, jitter_ms in 1u64..10_000) {
            let backoff = Backoff::Linear {
                base: Duration::from_secs(10),
                jitter: Duration::from_millis(jitter_ms),
            };
            let delay = backoff.delay(attempt);
            let floor = Duration::from_secs(10) * attempt;
            prop_assert!(delay >= floor);
            prop_assert!(delay < floor + Duration::from_millis(jitter_ms));
        }

        #[test]
        fn prop_budget_attempts_are_bounded(budget_s in 0u64..100_000, cap in 1u32..200) {
            let attempts = attempts_for_budget(&stepped(), Duration::from_secs(budget_s), cap);
            prop_assert!(attempts >= 1);
            prop_assert!(attempts <= cap);
        }
    }
}
