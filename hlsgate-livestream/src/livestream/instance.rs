// Stream instance record
//
// The record owns the worker handle, so it never leaves the registry.
// Readers get a `StreamSnapshot` instead.

use chrono::{DateTime, Utc};
use hlsgate_core::StreamStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::supervisor::WorkerHandle;

/// Filesystem locations owned by one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPaths {
    pub output_dir: PathBuf,
    pub log_file: PathBuf,
    pub stop_marker: PathBuf,
}

impl StreamPaths {
    #[must_use]
    pub fn new(hls_root: &Path, logs_dir: &Path, marker_dir: &Path, stream_id: &str) -> Self {
        Self {
            output_dir: hls_root.join(stream_id),
            log_file: logs_dir.join(format!("{stream_id}.log")),
            stop_marker: marker_dir.join(format!("stop_{stream_id}")),
        }
    }
}

/// A status change applied to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub stream_id: String,
    pub from: StreamStatus,
    pub to: StreamStatus,
    pub at: DateTime<Utc>,
}

impl Transition {
    /// True when the system of record's table would refuse this change.
    #[must_use]
    pub const fn diverges_from_record(&self) -> bool {
        !self.from.record_accepts(self.to)
    }

    /// Log the change; a change the system of record would refuse is logged as an anomaly.
    pub fn log(&self) {
        if self.diverges_from_record() {
            warn!(
                stream_id = %self.stream_id,
                from = %self.from,
                to = %self.to,
                "Status divergence: system of record does not accept this transition"
            );
        } else {
            info!(
                stream_id = %self.stream_id,
                from = %self.from,
                to = %self.to,
                "Stream status changed"
            );
        }
    }
}

pub struct StreamInstance {
    stream_id: String,
    status: StreamStatus,
    created_at: DateTime<Utc>,
    live_since: Option<DateTime<Utc>>,
    worker: Option<Box<dyn WorkerHandle>>,
    port: u16,
    server_ip: String,
    paths: StreamPaths,
    monitor_token: CancellationToken,
    stopping: bool,
}

impl StreamInstance {
    #[must_use]
    pub fn new(
        stream_id: String,
        port: u16,
        server_ip: String,
        paths: StreamPaths,
        worker: Box<dyn WorkerHandle>,
        monitor_token: CancellationToken,
    ) -> Self {
        Self {
            stream_id,
            status: StreamStatus::Starting,
            created_at: Utc::now(),
            live_since: None,
            worker: Some(worker),
            port,
            server_ip,
            paths,
            monitor_token,
            stopping: false,
        }
    }

    pub const fn status(&self) -> StreamStatus {
        self.status
    }

    pub const fn paths(&self) -> &StreamPaths {
        &self.paths
    }

    pub const fn is_stopping(&self) -> bool {
        self.stopping
    }

    pub fn monitor_token(&self) -> CancellationToken {
        self.monitor_token.clone()
    }

    /// Apply a status change. Live-since is stamped on entering `Running`
    /// and cleared on leaving it.
    pub fn transition(&mut self, next: StreamStatus, now: DateTime<Utc>) -> Transition {
        let from = self.status;
        debug_assert!(from.local_accepts(next));

        self.status = next;
        if next.is_running() {
            if !from.is_running() {
                self.live_since = Some(now);
            }
        } else {
            self.live_since = None;
        }

        Transition {
            stream_id: self.stream_id.clone(),
            from,
            to: next,
            at: now,
        }
    }

    /// Claim the stop. Returns the worker handle (if still held) on the first
    /// call, `None` once a stop is already in progress.
    pub fn begin_stop(&mut self) -> Option<Option<Box<dyn WorkerHandle>>> {
        if self.stopping {
            return None;
        }
        self.stopping = true;
        Some(self.worker.take())
    }

    #[must_use]
    pub fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            stream_id: self.stream_id.clone(),
            status: self.status,
            start_time: self.created_at,
            stream_start: self.live_since,
            srt_port: self.port,
            server_ip: self.server_ip.clone(),
            hls_path: self.paths.output_dir.clone(),
            log_file: self.paths.log_file.clone(),
        }
    }
}

impl fmt::Debug for StreamInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamInstance")
            .field("stream_id", &self.stream_id)
            .field("status", &self.status)
            .field("port", &self.port)
            .field("pid", &self.worker.as_ref().and_then(|w| w.pid()))
            .field("stopping", &self.stopping)
            .finish_non_exhaustive()
    }
}

/// Point-in-time copy of a stream record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSnapshot {
    pub stream_id: String,
    pub status: StreamStatus,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_start: Option<DateTime<Utc>>,
    pub srt_port: u16,
    pub server_ip: String,
    pub hls_path: PathBuf,
    pub log_file: PathBuf,
}

impl StreamSnapshot {
    pub const fn is_live(&self) -> bool {
        self.stream_start.is_some()
    }
}
