// Startup recovery
//
// The registry is memory-only, so after a restart every stream the system of
// record still believes is starting or running gets a fresh Start.

use std::sync::Arc;
use std::time::Duration;

use hlsgate_core::config::RecoveryConfig;
use backon::Retryable;
use hlsgate_core::resilience::{sleeper, Delay, RetryPolicy, TokioDelay};
use hlsgate_core::StreamStatus;
use tracing::{error, info, warn};

use super::client::{RecordedStream, SystemOfRecord};
use crate::livestream::StreamManager;

/// Statuses replayed on recovery, queried in this order.
const ACTIVE_STATUSES: [StreamStatus; 2] = [StreamStatus::Starting, StreamStatus::Running];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverySettings {
    pub settle_delay: Duration,
    pub stagger: Duration,
    pub query_policy: RetryPolicy,
}

impl RecoverySettings {
    #[must_use]
    pub fn from_config(config: &RecoveryConfig) -> Self {
        Self {
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            stagger: Duration::from_millis(config.stagger_ms),
            query_policy: RetryPolicy::linear(
                config.query_attempts,
                Duration::from_millis(config.query_backoff_unit_ms),
            ),
        }
    }
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self::from_config(&RecoveryConfig::default())
    }
}

/// Outcome of one recovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Stream IDs returned by the system of record, in query order
    pub discovered: Vec<String>,
    pub recovered: Vec<String>,
    pub failed: Vec<(String, String)>,
}

pub struct Recovery {
    record: Arc<dyn SystemOfRecord>,
    manager: Arc<StreamManager>,
    settings: RecoverySettings,
    delay: Arc<dyn Delay>,
}

impl Recovery {
    pub fn new(
        record: Arc<dyn SystemOfRecord>,
        manager: Arc<StreamManager>,
        settings: RecoverySettings,
    ) -> Self {
        Self {
            record,
            manager,
            settings,
            delay: Arc::new(TokioDelay),
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    /// Replay Start for every presumed-active stream.
    ///
    /// Per-stream failures are logged and recorded in the report; they never
    /// abort the run.
    pub async fn run(&self) -> RecoveryReport {
        info!(
            "Recovery: waiting {:?} for the system of record to settle",
            self.settings.settle_delay
        );
        self.delay.sleep(self.settings.settle_delay).await;

        let mut report = RecoveryReport::default();
        for status in ACTIVE_STATUSES {
            let streams = self.query(status).await;
            report
                .discovered
                .extend(streams.into_iter().map(|s| s.stream_id));
        }

        if report.discovered.is_empty() {
            info!("Recovery: no active streams to restore");
            return report;
        }
        info!("Recovery: restoring {} stream(s)", report.discovered.len());

        for (i, stream_id) in report.discovered.clone().into_iter().enumerate() {
            if i > 0 {
                self.delay.sleep(self.settings.stagger).await;
            }

            match self.manager.start(&stream_id).await {
                Ok(summary) => {
                    info!(
                        stream_id = %stream_id,
                        port = summary.srt_port,
                        "Recovery: stream restarted"
                    );
                    report.recovered.push(stream_id);
                }
                Err(e) => {
                    error!(stream_id = %stream_id, "Recovery: failed to restart stream: {}", e);
                    report.failed.push((stream_id, e.to_string()));
                }
            }
        }

        info!(
            recovered = report.recovered.len(),
            failed = report.failed.len(),
            "Recovery finished"
        );
        report
    }

    async fn query(&self, status: StreamStatus) -> Vec<RecordedStream> {
        let record: &dyn SystemOfRecord = self.record.as_ref();
        let result = (move || record.list_by_status(status))
            .retry(self.settings.query_policy)
            .sleep(sleeper(Arc::clone(&self.delay)))
            .notify(|e, pause| {
                warn!(status = %status, retry_in = ?pause, "Recovery query failed: {}", e);
            })
            .await;

        match result {
            Ok(streams) => {
                info!(status = %status, count = streams.len(), "Recovery: found streams");
                streams
            }
            Err(e) => {
                error!(
                    status = %status,
                    "Recovery: giving up on query after {} attempts: {}",
                    self.settings.query_policy.max_attempts,
                    e
                );
                Vec::new()
            }
        }
    }
}
