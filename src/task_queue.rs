use crate::errors::AppError;
use failsafe::backoff;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Retry schedule for task-queue units.
///
/// Delays grow exponentially from `initial_interval` and are capped at
/// `max_interval`. Only transient errors (see [`AppError::is_transient`]) retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delays slept between attempts; one fewer than `max_attempts`.
    pub fn delays(&self) -> Vec<Duration> {
        backoff::exponential(self.initial_interval, self.max_interval)
            .take(self.max_attempts.saturating_sub(1) as usize)
            .collect()
    }
}

/// Cooperative cancellation shared between a run and whoever may stop it.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs units of work with retries and exposes the run's cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct TaskQueue {
    policy: RetryPolicy,
    cancel: CancellationFlag,
}

impl TaskQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_cancellation(policy: RetryPolicy, cancel: CancellationFlag) -> Self {
        Self { policy, cancel }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn cancellation(&self) -> &CancellationFlag {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Executes `task`, retrying transient failures per the policy.
    ///
    /// Non-transient errors are returned immediately. Cancellation stops
    /// further retries but never interrupts an attempt in flight.
    pub async fn execute<T, F, Fut>(&self, name: &str, mut task: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut delays = self.policy.delays().into_iter();
        let mut attempt = 1u32;

        loop {
            match task().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!("{} succeeded on attempt {}", name, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && !self.is_cancelled() => match delays.next() {
                    Some(delay) => {
                        tracing::warn!(
                            "{} failed on attempt {} ({}), retrying in {:?}",
                            name,
                            attempt,
                            e,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        tracing::error!("{} failed after {} attempt(s): {}", name, attempt, e);
                        return Err(e);
                    }
                },
                Err(e) => {
                    tracing::error!("{} failed: {}", name, e);
                    return Err(e);
                }
            }
        }
    }
}
