//! Retry policy for calls to the system of record
//!
//! Retrying itself is driven by the `backon` crate: [`RetryPolicy`] is a
//! [`BackoffBuilder`] producing a bounded linear backoff, and [`sleeper`]
//! adapts a [`Delay`] so tests can observe pauses without sleeping.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::BackoffBuilder;

/// Bounded retry: at most `max_attempts` calls, the n-th retry waiting `n * unit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub unit: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn linear(max_attempts: u32, unit: Duration) -> Self {
        Self { max_attempts, unit }
    }

    /// A single attempt, no retry.
    #[must_use]
    pub const fn once() -> Self {
        Self::linear(1, Duration::ZERO)
    }
}

impl BackoffBuilder for RetryPolicy {
    type Backoff = LinearBackoff;

    fn build(self) -> Self::Backoff {
        LinearBackoff {
            unit: self.unit,
            retry: 0,
            retries: self.max_attempts.saturating_sub(1),
        }
    }
}

/// Pauses between attempts of one [`RetryPolicy`] run.
///
/// Yields one item per retry, so exhaustion ends the run.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    unit: Duration,
    retry: u32,
    retries: u32,
}

impl Iterator for LinearBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.retry >= self.retries {
            return None;
        }
        self.retry += 1;
        Some(self.unit.saturating_mul(self.retry))
    }
}

/// Source of waiting, swappable so tests do not sleep for real.
#[async_trait]
pub trait Delay: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real delay backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

pub type DelayFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Sleeper for `Retryable::sleep` backed by a [`Delay`].
pub fn sleeper(delay: Arc<dyn Delay>) -> impl Fn(Duration) -> DelayFuture + Send + Sync + 'static {
    move |duration| {
        let delay = Arc::clone(&delay);
        Box::pin(async move { delay.sleep(duration).await })
    }
}

/// Records requested pauses and returns immediately.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Default)]
pub struct RecordingDelay {
    slept: parking_lot::Mutex<Vec<Duration>>,
}

#[cfg(any(test, feature = "test-util"))]
impl RecordingDelay {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl Delay for RecordingDelay {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().push(duration);
    }
}
