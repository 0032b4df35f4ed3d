//! Retry-with-backoff shared by the page fetcher, the dispatcher and the scheduler.

use std::{future::Future, time::Duration};

use tokio::time::sleep;
use tracing::debug;

/// How long to wait after the `attempt`-th failure (1-based).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `step * attempt`
    Linear(Duration),
    /// `base * 2^(attempt - 1)`, capped.
    Exponential { base: Duration, cap: Duration },
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match *self {
            Backoff::Fixed(d) => d,
            Backoff::Linear(step) => step.saturating_mul(attempt),
            Backoff::Exponential { base, cap } => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(cap)
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}

/// What to do after a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the policy's backoff.
    Retry,
    /// Retry after an explicit wait (e.g. a server-provided retry-after).
    RetryAfter(Duration),
    GiveUp,
}

#[derive(Debug)]
pub struct RetryError<E> {
    pub attempts: u32,
    pub error: E,
}

/// Run `op` until it succeeds, `decide` gives up, or `policy.max_attempts` is spent.
///
/// `op` receives the 1-based attempt number; `decide` sees every error together with
/// the attempt that produced it, so callers can keep their own failure bookkeeping
/// (circuit breakers, per-error waits) in it.
pub async fn retry<T, E, Op, Fut, Decide>(
    policy: &RetryPolicy,
    mut op: Op,
    mut decide: Decide,
) -> std::result::Result<T, RetryError<E>>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    Decide: FnMut(&E, u32) -> RetryDecision,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;
    loop {
        let error = match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };

        let delay = match decide(&error, attempt) {
            RetryDecision::GiveUp => return Err(RetryError { attempts: attempt, error }),
            RetryDecision::Retry => policy.backoff.delay(attempt),
            RetryDecision::RetryAfter(d) => d,
        };
        if attempt >= max_attempts {
            return Err(RetryError {
                attempts: attempt,
                error,
            });
        }

        debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after failure");
        sleep(delay).await;
        attempt += 1;
    }
}
