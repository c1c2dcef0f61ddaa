// Liveness monitor
//
// Workers have no health channel, so activity is inferred from the newest
// artifact modification time in the stream's output directory. One monitor
// task per stream; it ends when cancelled or when the stream is no longer
// tracked.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use hlsgate_core::config::LivenessConfig;
use hlsgate_core::StreamStatus;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, trace, Instrument};

use super::registry::StreamRegistry;
use crate::record::Notifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessSettings {
    pub poll_interval: Duration,
    pub idle_threshold: Duration,
    pub max_inactive_checks: u32,
    pub artifact_extension: String,
}

impl LivenessSettings {
    #[must_use]
    pub fn from_config(config: &LivenessConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            idle_threshold: config.idle_threshold(),
            max_inactive_checks: config.max_inactive_checks.max(1),
            artifact_extension: config.artifact_extension.trim_start_matches('.').to_string(),
        }
    }
}

impl Default for LivenessSettings {
    fn default() -> Self {
        Self::from_config(&LivenessConfig::default())
    }
}

/// Classification of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// An artifact newer than anything seen before
    Fresh(SystemTime),
    /// Nothing new, but the newest artifact is within the idle threshold
    Quiet,
    /// Nothing new and nothing recent, or no artifacts at all
    Inactive,
}

/// Per-stream debounce state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityTracker {
    last_seen: Option<SystemTime>,
    inactive_checks: u32,
}

impl ActivityTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from artifacts already on disk, so leftovers are not taken for activity.
    #[must_use]
    pub fn with_baseline(newest_existing: Option<SystemTime>) -> Self {
        Self {
            last_seen: newest_existing,
            inactive_checks: 0,
        }
    }

    pub const fn inactive_checks(&self) -> u32 {
        self.inactive_checks
    }

    pub const fn last_seen(&self) -> Option<SystemTime> {
        self.last_seen
    }

    pub fn reset_inactivity(&mut self) {
        self.inactive_checks = 0;
    }

    pub fn observe(
        &mut self,
        newest: Option<SystemTime>,
        now: SystemTime,
        idle_threshold: Duration,
    ) -> Activity {
        match newest {
            Some(modified) if self.last_seen.is_none_or(|seen| modified > seen) => {
                self.last_seen = Some(modified);
                self.inactive_checks = 0;
                Activity::Fresh(modified)
            }
            Some(modified)
                if now.duration_since(modified).unwrap_or(Duration::ZERO) <= idle_threshold =>
            {
                Activity::Quiet
            }
            _ => {
                self.inactive_checks = self.inactive_checks.saturating_add(1);
                Activity::Inactive
            }
        }
    }
}

/// Automatic transition for the current status, if any.
///
/// Only two are ever produced: Starting -> Running on fresh activity and
/// Running -> Starting once the inactivity counter reaches `max_inactive_checks`.
#[must_use]
pub const fn decide(
    status: StreamStatus,
    activity: Activity,
    inactive_checks: u32,
    max_inactive_checks: u32,
) -> Option<StreamStatus> {
    match (status, activity) {
        (StreamStatus::Starting, Activity::Fresh(_)) => Some(StreamStatus::Running),
        (StreamStatus::Running, _) if inactive_checks >= max_inactive_checks => {
            Some(StreamStatus::Starting)
        }
        _ => None,
    }
}

/// Newest modification time among files in `dir` with the given extension.
///
/// A missing directory is reported as no artifacts.
pub async fn newest_artifact(dir: &Path, extension: &str) -> io::Result<Option<SystemTime>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut newest: Option<SystemTime> = None;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let Ok(meta) = entry.metadata().await else {
            // segment rotated away between listing and stat
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        if let Ok(modified) = meta.modified() {
            newest = newest.max(Some(modified));
        }
    }
    Ok(newest)
}

/// One liveness monitor, consumed by [`LivenessMonitor::spawn`].
pub struct LivenessMonitor {
    pub stream_id: String,
    pub output_dir: PathBuf,
    pub registry: Arc<StreamRegistry>,
    pub notifier: Notifier,
    pub settings: LivenessSettings,
    pub tracker: ActivityTracker,
    pub cancel: CancellationToken,
}

impl LivenessMonitor {
    pub fn spawn(self) -> JoinHandle<()> {
        let span = info_span!("liveness", stream_id = %self.stream_id);
        tokio::spawn(self.run().instrument(span))
    }

    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;

        debug!("Liveness monitor started");
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    debug!("Liveness monitor cancelled");
                    break;
                }
                _ = ticker.tick() => {}
            }

            if !self.tick().await {
                debug!("Liveness monitor exiting");
                break;
            }
        }
    }

    /// One poll. Returns false once the stream is gone from the registry or
    /// has left the monitored statuses.
    async fn tick(&mut self) -> bool {
        if !self.registry.contains(&self.stream_id) {
            return false;
        }

        let newest = match newest_artifact(&self.output_dir, &self.settings.artifact_extension).await {
            Ok(newest) => newest,
            Err(e) => {
                debug!("Scanning {} failed: {}", self.output_dir.display(), e);
                None
            }
        };

        let activity = self
            .tracker
            .observe(newest, SystemTime::now(), self.settings.idle_threshold);
        let inactive_checks = self.tracker.inactive_checks();
        trace!(?activity, inactive_checks, "Liveness poll");

        let max = self.settings.max_inactive_checks;
        let outcome = self.registry.with_instance_mut(&self.stream_id, |instance| {
            let status = instance.status();
            if !status.is_active() {
                return Err(status);
            }
            if instance.is_stopping() {
                return Ok(None);
            }
            Ok(decide(status, activity, inactive_checks, max)
                .map(|next| instance.transition(next, Utc::now())))
        });

        let applied = match outcome {
            None => return false,
            Some(Err(status)) => {
                debug!(%status, "Stream left Starting/Running");
                return false;
            }
            Some(Ok(applied)) => applied,
        };

        if let Some(change) = applied {
            if change.to == StreamStatus::Starting {
                self.tracker.reset_inactivity();
            }
            change.log();
            self.notifier.notify(&change.stream_id, change.to);
        }
        true
    }
}
