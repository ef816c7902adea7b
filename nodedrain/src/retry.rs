//! Bounded retries of cluster API calls.
//!
//! Kubernetes reports a lost optimistic-concurrency race on write as `409 Conflict` and API priority and fairness
//! throttling as `429 Too Many Requests`. Both are transient, so the failed operation is re-run a fixed number of
//! times with a short jittered pause. Every other error ends the loop immediately.
use crate::cancel::Cancellation;
use crate::constants::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_INTERVAL};
use crate::node::ClusterError;

use std::future::Future;
use tokio::time::Duration;
use tokio_retry::{
    strategy::{jitter, FixedInterval},
    Condition, RetryIf,
};

/// How many times, and how far apart, an operation is attempted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub attempts: usize,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl RetryPolicy {
    /// Delays between consecutive attempts.
    fn strategy(&self) -> impl Iterator<Item = Duration> {
        FixedInterval::new(self.interval)
            .map(jitter)
            .take(self.attempts.saturating_sub(1))
    }
}

/// Retries concurrent-modification conflicts and throttled requests. Used for read-modify-write loops.
#[derive(Copy, Clone, Debug, Default)]
pub struct ConflictOrThrottled;

impl Condition<ClusterError> for ConflictOrThrottled {
    fn should_retry(&mut self, error: &ClusterError) -> bool {
        error.is_conflict() || error.is_too_many_requests()
    }
}

/// Retries throttled requests only.
#[derive(Copy, Clone, Debug, Default)]
pub struct Throttled;

impl Condition<ClusterError> for Throttled {
    fn should_retry(&mut self, error: &ClusterError) -> bool {
        error.is_too_many_requests()
    }
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum Interrupted<E> {
    /// The operation failed with a non-retriable error, or ran out of attempts. Holds the last error.
    Failed(E),
    /// Cancellation was requested before the operation succeeded.
    Cancelled,
}

/// Runs `action` until it succeeds, fails with an error `condition` rejects, runs out of attempts, or `cancel` fires.
pub async fn retry_on<A, Fut, T, E, C>(
    policy: &RetryPolicy,
    cancel: &Cancellation,
    condition: C,
    action: A,
) -> Result<T, Interrupted<E>>
where
    A: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Condition<E>,
{
    let retried = RetryIf::spawn(policy.strategy(), action, condition);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupted::Cancelled),
        result = retried => result.map_err(Interrupted::Failed),
    }
}
