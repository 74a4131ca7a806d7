//! Bounded retry with exponential backoff.
//!
//! Every phase handler retries the same way: a fixed number of attempts,
//! doubling delays between them, and a classifier deciding which errors are
//! worth another attempt.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Exponential delay schedule: `base * 2^(n-1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// Delay after the `n`-th attempt (1-based). `delay(0)` is zero.
    pub fn delay(&self, n: u32) -> Duration {
        if n == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(n - 1).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

/// Outcome of [`RetryPolicy::run`]: the last result and how many attempts it took.
#[derive(Debug)]
pub struct Attempted<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
    /// Retrying stopped because the cancellation token was raised during a
    /// backoff; `result` holds the last error.
    pub cancelled: bool,
}

impl<T, E> Attempted<T, E> {
    fn finished(result: Result<T, E>, attempts: u32) -> Self {
        Self {
            result,
            attempts,
            cancelled: false,
        }
    }
}

/// Bounded retry policy shared by initiation, polling, promotion and notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// A policy making at most `max_attempts` calls (at least one).
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::new(base_delay, max_delay),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent.
    ///
    /// `on_retry(attempt, delay, error)` is called before each backoff sleep.
    pub async fn run<T, E, F, Fut, R, N>(
        &self,
        op: F,
        is_retryable: R,
        on_retry: N,
    ) -> Attempted<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        N: FnMut(u32, Duration, &E),
    {
        self.run_inner(None, op, is_retryable, on_retry).await
    }

    /// Like [`run`](Self::run), but every backoff sleep races `cancel`.
    ///
    /// Once the token is raised no further attempt is made. A call already
    /// in flight is not interrupted.
    pub async fn run_cancellable<T, E, F, Fut, R, N>(
        &self,
        cancel: &CancellationToken,
        op: F,
        is_retryable: R,
        on_retry: N,
    ) -> Attempted<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        N: FnMut(u32, Duration, &E),
    {
        self.run_inner(Some(cancel), op, is_retryable, on_retry).await
    }

    async fn run_inner<T, E, F, Fut, R, N>(
        &self,
        cancel: Option<&CancellationToken>,
        mut op: F,
        is_retryable: R,
        mut on_retry: N,
    ) -> Attempted<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        N: FnMut(u32, Duration, &E),
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Attempted::finished(Ok(value), attempt),
                Err(e) if attempt < self.max_attempts && is_retryable(&e) => {
                    let delay = self.backoff.delay(attempt);
                    on_retry(attempt, delay, &e);
                    let Some(cancel) = cancel else {
                        tokio::time::sleep(delay).await;
                        continue;
                    };
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return Attempted {
                                result: Err(e),
                                attempts: attempt,
                                cancelled: true,
                            };
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Attempted::finished(Err(e), attempt),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(4))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(backoff.delay(0), Duration::ZERO);
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
        assert_eq!(backoff.delay(4), Duration::from_millis(500));
        assert_eq!(backoff.delay(60), Duration::from_millis(500));
    }

    #[test]
    fn test_backoff_max_never_below_base() {
        let backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(backoff.max(), Duration::from_secs(2));
    }

    #[test]
    fn test_policy_makes_at_least_one_attempt() {
        let policy = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = &AtomicU32::new(0);
        let mut retries = Vec::new();

        let outcome = fast_policy(5)
            .run(
                move || async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("busy")
                    } else {
                        Ok(42)
                    }
                },
                |_| true,
                |attempt, _, _| retries.push(attempt),
            )
            .await;

        assert_eq!(outcome.result, Ok(42));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(retries, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_stops_on_non_retryable_error() {
        let calls = &AtomicU32::new(0);
        let outcome: Attempted<(), &str> = fast_policy(5)
            .run(
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("denied")
                },
                |e| *e != "denied",
                |_, _, _| {},
            )
            .await;

        assert_eq!(outcome.result, Err("denied"));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let outcome: Attempted<(), &str> = fast_policy(3)
            .run(
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("busy")
                },
                |_| true,
                |_, _, _| {},
            )
            .await;

        assert!(outcome.result.is_err());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_stops_retrying() {
        let calls = &AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::new(5, Duration::from_millis(200), Duration::from_secs(1));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome: Attempted<(), &str> = policy
            .run_cancellable(
                &cancel,
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("busy")
                },
                |_| true,
                |_, _, _| {},
            )
            .await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.result, Err("busy"));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_uncancelled_token_behaves_like_run() {
        let cancel = CancellationToken::new();
        let outcome = fast_policy(3)
            .run_cancellable(&cancel, || async { Ok::<_, &str>(7) }, |_| true, |_, _, _| {})
            .await;

        assert_eq!(outcome.result, Ok(7));
        assert!(!outcome.cancelled);
    }
}
