//! Bounded retry with a fixed delay.
//!
//! Every remote step of a device backup goes through [`RetryExecutor`]. The
//! policy is deliberately flat: a fixed number of attempts, a fixed pause
//! between them, no jitter and no backoff.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use super::error::BackupError;

/// How many times to try an action and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no waiting.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(5))
    }
}

/// Details of one failed attempt, handed to the caller's progress sink.
#[derive(Debug)]
pub struct FailedAttempt<'a> {
    /// 1-based attempt number.
    pub attempt: u32,
    pub max_attempts: u32,
    pub error: &'a BackupError,
    /// Pause before the next attempt, `None` when this was the last one.
    pub next_delay: Option<Duration>,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `action` until it succeeds or the attempt budget is spent.
    ///
    /// `on_failure` sees every failed attempt before the executor sleeps. When
    /// all attempts fail the last error is returned wrapped in
    /// [`BackupError::RetriesExhausted`]. No delay follows the final attempt.
    pub async fn run<T, F, Fut, S>(
        &self,
        mut action: F,
        mut on_failure: S,
    ) -> Result<T, BackupError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackupError>>,
        S: FnMut(FailedAttempt<'_>),
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let error = match action().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let is_last = attempt >= max_attempts;
            on_failure(FailedAttempt {
                attempt,
                max_attempts,
                error: &error,
                next_delay: (!is_last).then_some(self.policy.delay),
            });

            if is_last {
                return Err(BackupError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(error),
                });
            }

            sleep(self.policy.delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tokio::time::Instant;

    fn failure(n: u32) -> BackupError {
        BackupError::command("/export file=x", format!("attempt {} failed", n))
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_last_allowed_attempt() {
        let executor = RetryExecutor::new(RetryPolicy::new(5, Duration::from_secs(5)));
        let calls = Cell::new(0u32);
        let mut reported_delays = 0;

        let start = Instant::now();
        let result = executor
            .run(
                || {
                    calls.set(calls.get() + 1);
                    let n = calls.get();
                    async move { if n < 5 { Err(failure(n)) } else { Ok(n) } }
                },
                |failed| {
                    if failed.next_delay.is_some() {
                        reported_delays += 1;
                    }
                },
            )
            .await;

        assert_eq!(result.unwrap(), 5);
        assert_eq!(calls.get(), 5);
        assert_eq!(reported_delays, 4);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(20) && elapsed < Duration::from_secs(25));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_action_exhausts_budget() {
        let executor = RetryExecutor::new(RetryPolicy::new(3, Duration::from_secs(2)));
        let calls = Cell::new(0u32);
        let mut seen = Vec::new();

        let start = Instant::now();
        let result: Result<(), _> = executor
            .run(
                || {
                    calls.set(calls.get() + 1);
                    let n = calls.get();
                    async move { Err(failure(n)) }
                },
                |failed| seen.push((failed.attempt, failed.max_attempts, failed.next_delay)),
            )
            .await;

        assert_eq!(calls.get(), 3);
        // Two pauses: none after the final attempt.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(4) && elapsed < Duration::from_secs(6));
        assert_eq!(
            seen,
            vec![
                (1, 3, Some(Duration::from_secs(2))),
                (2, 3, Some(Duration::from_secs(2))),
                (3, 3, None),
            ]
        );

        match result.unwrap_err() {
            BackupError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(last.to_string().contains("attempt 3 failed"));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_skips_sink_and_delay() {
        let executor = RetryExecutor::new(RetryPolicy::default());
        let mut failures = 0;

        let start = Instant::now();
        let result = executor
            .run(|| async { Ok::<_, BackupError>("ok") }, |_| failures += 1)
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(failures, 0);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_zero_attempts_is_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
