//! Bounded retry with backoff.
//!
//! [`RetryState`] holds the bookkeeping (how many consecutive failures, how long to wait next) and
//! is shared by the [`RetryExecutor`] and by the evaluation polling task, which needs the same
//! arithmetic but owns its own cancellable timer.
use std::{future::Future, time::Duration};

use crate::Result;

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry.
    Constant(Duration),
    /// `base * 2^(retry - 1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay before the `retry`-th retry (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Backoff::Constant(delay) => delay,
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(retry.saturating_sub(1));
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub backoff: Backoff,
}

/// Consecutive-failure counter for a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    retries: u32,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> RetryState {
        RetryState { policy, retries: 0 }
    }

    /// Record a failure. Returns the delay before the next retry, or `None` once the budget is
    /// spent; the budget is then reset so that the next failure starts a fresh series.
    pub fn on_failure(&mut self) -> Option<Duration> {
        if self.retries >= self.policy.max_retries {
            self.retries = 0;
            return None;
        }
        self.retries += 1;
        Some(self.policy.backoff.delay(self.retries))
    }

    pub fn on_success(&mut self) {
        self.retries = 0;
    }

    /// Retries used in the current series.
    pub fn retries(&self) -> u32 {
        self.retries
    }
}

/// Runs an operation until it succeeds, the retry budget is spent, or `should_retry` refuses.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> RetryExecutor {
        RetryExecutor { policy }
    }

    /// Execute `operation`, retrying on errors accepted by `should_retry`.
    ///
    /// `should_retry` is consulted before each wait and again right before the next attempt, so a
    /// predicate tied to a liveness flag stops retries as soon as the flag flips.
    pub async fn execute<T, F, Fut, P>(&self, mut operation: F, should_retry: P) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&crate::Error) -> bool,
    {
        let mut state = RetryState::new(self.policy);
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !should_retry(&err) {
                return Err(err);
            }
            let Some(delay) = state.on_failure() else {
                return Err(err);
            };
            log::debug!(target: "flagsync", retry = state.retries(); "retrying in {delay:?} after error: {err}");
            tokio::time::sleep(delay).await;
            if !should_retry(&err) {
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicBool, AtomicU32, Ordering},
            Arc,
        },
        time::Duration,
    };

    use super::{Backoff, RetryExecutor, RetryPolicy, RetryState};
    use crate::Error;

    fn network_error() -> Error {
        Error::Network {
            message: "down".to_owned(),
        }
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let backoff = Backoff::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(5),
        };

        let delays: Vec<_> = (1..=5).map(|retry| backoff.delay(retry)).collect();

        assert_eq!(
            delays,
            [1, 2, 4, 5, 5].map(Duration::from_secs).to_vec()
        );
    }

    #[test]
    fn state_exhausts_and_resets() {
        let mut state = RetryState::new(RetryPolicy {
            max_retries: 2,
            backoff: Backoff::Constant(Duration::from_secs(60)),
        });

        assert_eq!(state.on_failure(), Some(Duration::from_secs(60)));
        assert_eq!(state.on_failure(), Some(Duration::from_secs(60)));
        assert_eq!(state.on_failure(), None);
        // Fresh series after exhaustion.
        assert_eq!(state.on_failure(), Some(Duration::from_secs(60)));
        state.on_success();
        assert_eq!(state.retries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let executor = RetryExecutor::new(RetryPolicy {
            max_retries: 3,
            backoff: Backoff::Constant(Duration::from_secs(1)),
        });
        let attempts = AtomicU32::new(0);

        let result = executor
            .execute(
                || async {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(network_error())
                    } else {
                        Ok("done")
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_budget() {
        let executor = RetryExecutor::new(RetryPolicy {
            max_retries: 2,
            backoff: Backoff::Constant(Duration::from_secs(1)),
        });
        let attempts = AtomicU32::new(0);

        let result: crate::Result<()> = executor
            .execute(
                || async {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(network_error())
                },
                |_| true,
            )
            .await;

        assert!(matches!(result, Err(Error::Network { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn predicate_stops_retries() {
        let executor = RetryExecutor::new(RetryPolicy {
            max_retries: 10,
            backoff: Backoff::Constant(Duration::from_secs(1)),
        });
        let running = Arc::new(AtomicBool::new(true));
        let attempts = AtomicU32::new(0);

        let result: crate::Result<()> = executor
            .execute(
                || async {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 1 {
                        running.store(false, Ordering::SeqCst);
                    }
                    Err(network_error())
                },
                |_| running.load(Ordering::SeqCst),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
