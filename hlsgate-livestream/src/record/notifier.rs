// Status notifier
//
// Each status change is pushed to the system of record on its own task so
// neither the registry lock nor the request path waits on the network.
// Delivery is best-effort: bounded retry, then the fact is dropped.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hlsgate_core::config::NotifierConfig;
use backon::Retryable;
use hlsgate_core::resilience::{sleeper, Delay, RetryPolicy, TokioDelay};
use hlsgate_core::StreamStatus;
use tokio::task::JoinHandle;
use tracing::{debug, error, info_span, warn, Instrument};

use super::client::SystemOfRecord;

#[derive(Clone)]
pub struct Notifier {
    record: Arc<dyn SystemOfRecord>,
    policy: RetryPolicy,
    delay: Arc<dyn Delay>,
}

impl Notifier {
    pub fn new(record: Arc<dyn SystemOfRecord>, policy: RetryPolicy) -> Self {
        Self {
            record,
            policy,
            delay: Arc::new(TokioDelay),
        }
    }

    pub fn from_config(record: Arc<dyn SystemOfRecord>, config: &NotifierConfig) -> Self {
        Self::new(
            record,
            RetryPolicy::linear(
                config.max_attempts,
                Duration::from_millis(config.backoff_unit_ms),
            ),
        )
    }

    /// Replace the delay used between attempts.
    #[must_use]
    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    /// Fire-and-forget delivery. The handle resolves to whether the fact was delivered;
    /// callers are free to drop it.
    pub fn notify(&self, stream_id: &str, status: StreamStatus) -> JoinHandle<bool> {
        let notifier = self.clone();
        let stream_id = stream_id.to_string();
        let span = info_span!("notify", stream_id = %stream_id, status = %status);
        tokio::spawn(async move { notifier.deliver(&stream_id, status).await }.instrument(span))
    }

    /// Deliver one status fact, retrying per policy. Never returns an error.
    pub async fn deliver(&self, stream_id: &str, status: StreamStatus) -> bool {
        let record: &dyn SystemOfRecord = self.record.as_ref();
        let failures = AtomicU32::new(0);
        let result = (move || record.update_status(stream_id, status))
            .retry(self.policy)
            .sleep(sleeper(Arc::clone(&self.delay)))
            .notify(|e, pause| {
                warn!(
                    attempt = failures.fetch_add(1, Ordering::Relaxed) + 1,
                    max_attempts = self.policy.max_attempts,
                    retry_in = ?pause,
                    "Status notification failed: {}",
                    e
                );
            })
            .await;

        match result {
            Ok(()) => {
                debug!("Status delivered to system of record");
                true
            }
            Err(e) => {
                error!(
                    stream_id = %stream_id,
                    status = %status,
                    "Dropping status notification after {} attempts: {}",
                    self.policy.max_attempts,
                    e
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MockSystemOfRecord;
    use hlsgate_core::resilience::RecordingDelay;

    #[tokio::test]
    async fn test_deliver_success() {
        let record = Arc::new(MockSystemOfRecord::new());
        let notifier = Notifier::new(record.clone(), RetryPolicy::linear(3, Duration::from_secs(2)))
            .with_delay(RecordingDelay::new());

        assert!(notifier.notify("a", StreamStatus::Starting).await.unwrap());
        assert_eq!(record.updates_for("a"), vec![StreamStatus::Starting]);
    }

    #[tokio::test]
    async fn test_deliver_gives_up_after_policy() {
        let record = Arc::new(MockSystemOfRecord::new());
        record.set_fail_updates(true);
        let delay = RecordingDelay::new();
        let notifier = Notifier::new(record.clone(), RetryPolicy::linear(3, Duration::from_secs(2)))
            .with_delay(delay.clone());

        assert!(!notifier.deliver("a", StreamStatus::Running).await);
        assert_eq!(
            delay.recorded(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
        assert!(record.updates().is_empty());
    }

    #[tokio::test]
    async fn test_refused_transition_is_a_delivery_failure() {
        let record = Arc::new(MockSystemOfRecord::new().with_stream("a", StreamStatus::Stopped));
        let notifier = Notifier::new(record.clone(), RetryPolicy::once());

        assert!(!notifier.deliver("a", StreamStatus::Running).await);
        assert_eq!(record.status_of("a"), Some(StreamStatus::Stopped));
    }
}
