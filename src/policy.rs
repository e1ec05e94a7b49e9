//! Retry and Poll Policies
//!
//! Two separate loops share the injected [`Sleeper`]:
//! - propagation polling, a fixed interval bounded by a maximum wait
//! - transport retry, exponential backoff for transient provider failures
//!
//! Both stop as soon as the invocation's cancellation token fires.

use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::clock::Sleeper;
use crate::error::{HookError, HookResult, Stage};

/// Shortest pause between two change status queries
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long and how often to poll a pending change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(300),
        }
    }
}

impl PollPolicy {
    /// Interval actually slept between polls, never below [`MIN_POLL_INTERVAL`]
    pub fn effective_interval(&self) -> Duration {
        self.interval.max(MIN_POLL_INTERVAL)
    }
}

/// Backoff schedule for transient transport errors.
///
/// Retry `n` (1-based) waits `unit * base^n`, capped at `max_backoff`.
/// The default gives 1 s, 2 s, 4 s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base: u64,
    pub unit: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base: 2,
            unit: Duration::from_millis(500),
            max_backoff: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    /// Never retry
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delays before each retry, in order
    pub fn strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(self.base)
            .factor(self.unit.as_millis() as u64)
            .max_delay(self.max_backoff)
            .take(self.max_retries)
    }

    /// Run `op`, retrying retryable failures with backoff.
    ///
    /// Errors are re-tagged with `stage` before being returned. A cancelled
    /// token aborts both the pending call and the backoff wait.
    pub async fn run<T, F, Fut>(
        &self,
        sleeper: &dyn Sleeper,
        cancel: &CancellationToken,
        stage: Stage,
        mut op: F,
    ) -> HookResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = HookResult<T>>,
    {
        let mut delays = self.strategy();
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(HookError::Cancelled { stage });
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(HookError::Cancelled { stage }),
                result = op() => result,
            };
            attempt += 1;

            let e = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let wait = match delays.next() {
                Some(wait) if e.is_retryable() => wait,
                _ => return Err(e.at_stage(stage)),
            };

            warn!(
                stage = %stage,
                attempt,
                backoff = ?wait,
                error = %e,
                "Transient provider error, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(HookError::Cancelled { stage }),
                _ = sleeper.sleep(wait) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::fake::RecordingSleeper;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> HookError {
        HookError::Transport {
            stage: Stage::Submission,
            message: "ServiceUnavailable".to_string(),
            retryable: true,
        }
    }

    #[test]
    fn test_backoff_schedule_is_capped() {
        let policy = RetryPolicy {
            max_retries: 6,
            ..Default::default()
        };

        let delays: Vec<u64> = policy.strategy().map(|d| d.as_secs()).collect();

        assert_eq!(delays, vec![1, 2, 4, 8, 16, 20]);
        assert_eq!(RetryPolicy::default().strategy().count(), 3);
        assert_eq!(RetryPolicy::none().strategy().count(), 0);
    }

    #[test]
    fn test_effective_interval_has_floor() {
        let zero = PollPolicy {
            interval: Duration::ZERO,
            max_wait: Duration::from_secs(60),
        };

        assert_eq!(zero.effective_interval(), MIN_POLL_INTERVAL);
        assert_eq!(
            PollPolicy::default().effective_interval(),
            Duration::from_secs(5)
        );
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let sleeper = RecordingSleeper::default();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result = RetryPolicy::default()
            .run(&sleeper, &CancellationToken::new(), Stage::Submission, move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            sleeper.waits(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let sleeper = RecordingSleeper::default();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: HookResult<()> = RetryPolicy::default()
            .run(&sleeper, &CancellationToken::new(), Stage::Polling, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Polling));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let sleeper = RecordingSleeper::default();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: HookResult<()> = RetryPolicy::default()
            .run(&sleeper, &CancellationToken::new(), Stage::Submission, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HookError::Transport {
                    stage: Stage::Submission,
                    message: "InvalidChangeBatch".to_string(),
                    retryable: false,
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.waits().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_retry_stops_backoff() {
        let sleeper = RecordingSleeper::default();
        let cancel = CancellationToken::new();
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let token = &cancel;

        let result: HookResult<()> = RetryPolicy::default()
            .run(&sleeper, &cancel, Stage::Polling, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                token.cancel();
                Err(transient())
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, HookError::Cancelled { stage: Stage::Polling }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.waits().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_call() {
        let sleeper = RecordingSleeper::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: HookResult<()> = RetryPolicy::default()
            .run(&sleeper, &cancel, Stage::Resolution, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(HookError::Cancelled { stage: Stage::Resolution })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_retry_policy_fails_fast() {
        let sleeper = RecordingSleeper::default();
        let cancel = CancellationToken::new();

        let result: HookResult<()> = tokio_test::block_on(RetryPolicy::none().run(
            &sleeper,
            &cancel,
            Stage::Resolution,
            || async { Err(transient()) },
        ));

        let err = result.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.stage(), Some(Stage::Resolution));
        assert!(sleeper.waits().is_empty());
    }
}
