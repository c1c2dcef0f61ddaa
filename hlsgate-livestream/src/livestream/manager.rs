// StreamManager - stream lifecycle facade
//
// Start/Stop/Get/List plus the derived views served over HTTP. The registry
// lock is only taken for map edits; directory setup, worker launch and
// teardown run outside of it.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hlsgate_core::{Config, StreamStatus};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::instance::{StreamInstance, StreamPaths, StreamSnapshot};
use super::liveness::{newest_artifact, ActivityTracker, LivenessMonitor, LivenessSettings};
use super::registry::{PortAllocator, StreamRegistry};
use super::supervisor::{WorkerHandle, WorkerLauncher, WorkerSpec};
use crate::error::{StreamError, StreamResult};
use crate::record::Notifier;

const PLAYLIST_NAME: &str = "playlist.m3u8";

/// Settings the manager needs, resolved from [`Config`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub hls_root: PathBuf,
    pub logs_dir: PathBuf,
    pub marker_dir: PathBuf,
    pub base_port: u16,
    pub stop_grace: Duration,
    pub kill_timeout: Duration,
    pub liveness: LivenessSettings,
    /// Address advertised in SRT and HLS URLs
    pub server_ip: String,
    pub http_port: u16,
    pub cdn_domain: Option<String>,
}

impl ManagerConfig {
    #[must_use]
    pub fn from_config(config: &Config, server_ip: String) -> Self {
        Self {
            hls_root: config.streaming.hls_root.clone(),
            logs_dir: config.streaming.logs_dir.clone(),
            marker_dir: config.streaming.marker_dir.clone(),
            base_port: config.streaming.base_port,
            stop_grace: config.streaming.stop_grace(),
            kill_timeout: config.streaming.kill_timeout(),
            liveness: LivenessSettings::from_config(&config.liveness),
            server_ip,
            http_port: config.server.http_port,
            cdn_domain: config
                .server
                .cdn_domain
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
        }
    }

    pub fn srt_url(&self, stream_id: &str, port: u16) -> String {
        format!("srt://{}:{port}?streamid={stream_id}", self.server_ip)
    }

    /// Caller-mode SRT URL for publishers.
    pub fn srt_publish_url(&self, stream_id: &str, port: u16) -> String {
        format!(
            "srt://{}:{port}?mode=caller&transtype=live&streamid={stream_id}",
            self.server_ip
        )
    }

    /// Direct playlist URL on this service.
    pub fn local_hls_url(&self, stream_id: &str) -> String {
        format!(
            "http://{}:{}/hls/{stream_id}/{PLAYLIST_NAME}",
            self.server_ip, self.http_port
        )
    }

    /// Public playlist URL, through the CDN when one is configured.
    pub fn public_hls_url(&self, stream_id: &str) -> String {
        match &self.cdn_domain {
            Some(cdn) => format!("https://{cdn}/hls/{stream_id}/{PLAYLIST_NAME}"),
            None => self.local_hls_url(stream_id),
        }
    }

    pub fn public_host(&self) -> &str {
        self.cdn_domain.as_deref().unwrap_or(&self.server_ip)
    }

    pub fn hls_api_url(&self, stream_id: &str) -> String {
        format!(
            "http://{}:{}/api/hls/{stream_id}",
            self.server_ip, self.http_port
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartSummary {
    pub stream_id: String,
    pub status: StreamStatus,
    pub start_time: DateTime<Utc>,
    pub srt_port: u16,
    pub server_ip: String,
    pub srt_url: String,
    pub hls_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopSummary {
    pub stream_id: String,
    pub previous_status: StreamStatus,
    pub status: StreamStatus,
    /// Worker ignored the stop marker and had to be killed
    pub forced: bool,
    /// Teardown problems that did not prevent the stop
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub anomalies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamDetail {
    #[serde(flatten)]
    pub snapshot: StreamSnapshot,
    pub mode: &'static str,
    pub srt_url: String,
    pub hls_url: String,
    pub hls_api: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_duration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    pub total_streams: usize,
    pub running_streams: usize,
    pub timestamp: DateTime<Utc>,
    pub hls_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistDebug {
    pub stream_id: String,
    pub status: StreamStatus,
    pub mode: &'static str,
    pub hls_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist_error: Option<String>,
    pub segments: Vec<String>,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_duration: Option<String>,
}

/// Workers repackage only; nothing is transcoded.
const MODE: &str = "repack_only";

pub struct StreamManager {
    config: ManagerConfig,
    registry: Arc<StreamRegistry>,
    ports: PortAllocator,
    launcher: Arc<dyn WorkerLauncher>,
    notifier: Notifier,
    shutdown: CancellationToken,
}

impl StreamManager {
    pub fn new(
        config: ManagerConfig,
        launcher: Arc<dyn WorkerLauncher>,
        notifier: Notifier,
    ) -> Self {
        Self {
            ports: PortAllocator::new(config.base_port),
            config,
            registry: StreamRegistry::new(),
            launcher,
            notifier,
            shutdown: CancellationToken::new(),
        }
    }

    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub const fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    /// Start a stream: reserve the id, prepare its directories, launch the
    /// worker, then publish the record and begin liveness monitoring.
    pub async fn start(&self, stream_id: &str) -> StreamResult<StartSummary> {
        validate_stream_id(stream_id)?;

        // released on any early return below
        let reservation = self.registry.reserve(stream_id)?;
        let port = self.ports.allocate()?;
        let paths = StreamPaths::new(
            &self.config.hls_root,
            &self.config.logs_dir,
            &self.config.marker_dir,
            stream_id,
        );

        if let Err(e) = prepare_paths(&paths).await {
            remove_dir_if_exists(&paths.output_dir).await.ok();
            error!(stream_id = %stream_id, "Failed to prepare stream directories: {}", e);
            return Err(e);
        }

        // leftovers from an unclean shutdown are not activity
        let baseline = newest_artifact(&paths.output_dir, &self.config.liveness.artifact_extension)
            .await
            .unwrap_or(None);

        let spec = WorkerSpec {
            stream_id: stream_id.to_string(),
            port,
            output_dir: paths.output_dir.clone(),
            log_file: paths.log_file.clone(),
            stop_marker: paths.stop_marker.clone(),
        };
        let worker = match self.launcher.launch(&spec).await {
            Ok(worker) => worker,
            Err(e) => {
                error!(stream_id = %stream_id, port, "Worker launch failed: {}", e);
                remove_dir_if_exists(&paths.output_dir).await.ok();
                self.notifier.notify(stream_id, StreamStatus::Error);
                return Err(e);
            }
        };

        let cancel = self.shutdown.child_token();
        let instance = StreamInstance::new(
            stream_id.to_string(),
            port,
            self.config.server_ip.clone(),
            paths.clone(),
            worker,
            cancel.clone(),
        );
        let snapshot = instance.snapshot();
        reservation.commit(instance);

        LivenessMonitor {
            stream_id: stream_id.to_string(),
            output_dir: paths.output_dir,
            registry: Arc::clone(&self.registry),
            notifier: self.notifier.clone(),
            settings: self.config.liveness.clone(),
            tracker: ActivityTracker::with_baseline(baseline),
            cancel,
        }
        .spawn();

        info!(stream_id = %stream_id, port, "Stream started");
        self.notifier.notify(stream_id, StreamStatus::Starting);

        Ok(StartSummary {
            srt_url: self.config.srt_url(stream_id, port),
            hls_url: self.config.local_hls_url(stream_id),
            stream_id: snapshot.stream_id,
            status: snapshot.status,
            start_time: snapshot.start_time,
            srt_port: snapshot.srt_port,
            server_ip: snapshot.server_ip,
        })
    }

    /// Stop a stream: signal the worker, escalate if it lingers, then remove
    /// artifacts and the record. Escalation failures are logged, not returned.
    pub async fn stop(&self, stream_id: &str) -> StreamResult<StopSummary> {
        let ticket = self.registry.begin_stop(stream_id)?;
        info!(stream_id = %stream_id, status = %ticket.status, "Stopping stream");

        ticket.monitor_token.cancel();
        let mut anomalies = Vec::new();

        if let Err(e) = tokio::fs::write(&ticket.paths.stop_marker, b"stop").await {
            warn!(stream_id = %stream_id, "Failed to write stop marker: {}", e);
            anomalies.push(format!("stop marker: {e}"));
        }

        let forced = match ticket.worker {
            Some(mut worker) => self.terminate(stream_id, worker.as_mut(), &mut anomalies).await,
            None => false,
        };

        if let Err(e) = remove_dir_if_exists(&ticket.paths.output_dir).await {
            warn!(stream_id = %stream_id, "Failed to remove output directory: {}", e);
            anomalies.push(format!("output cleanup: {e}"));
        }
        remove_file_if_exists(&ticket.paths.stop_marker).await.ok();

        self.registry.remove(stream_id);
        info!(stream_id = %stream_id, forced, "Stream stopped");
        self.notifier.notify(stream_id, StreamStatus::Stopped);

        Ok(StopSummary {
            stream_id: stream_id.to_string(),
            previous_status: ticket.status,
            status: StreamStatus::Stopped,
            forced,
            anomalies,
        })
    }

    /// Grace window, then kill. Returns whether the worker had to be killed.
    async fn terminate(
        &self,
        stream_id: &str,
        worker: &mut dyn WorkerHandle,
        anomalies: &mut Vec<String>,
    ) -> bool {
        if worker.wait_exit(self.config.stop_grace).await {
            debug!(stream_id = %stream_id, "Worker honored stop marker");
            return false;
        }

        warn!(
            stream_id = %stream_id,
            pid = ?worker.pid(),
            "Worker still alive after {:?}, killing",
            self.config.stop_grace
        );
        match tokio::time::timeout(self.config.kill_timeout, worker.kill()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(stream_id = %stream_id, "Failed to kill worker: {}", e);
                anomalies.push(format!("kill: {e}"));
            }
            Err(_) => {
                warn!(
                    stream_id = %stream_id,
                    "Worker did not exit within {:?} of kill",
                    self.config.kill_timeout
                );
                anomalies.push("kill: timed out".to_string());
            }
        }
        true
    }

    pub fn get(&self, stream_id: &str) -> StreamResult<StreamSnapshot> {
        self.registry
            .get(stream_id)
            .ok_or_else(|| StreamError::NotFound(stream_id.to_string()))
    }

    pub fn list(&self) -> Vec<StreamSnapshot> {
        self.registry.list()
    }

    pub fn detail(&self, stream_id: &str) -> StreamResult<StreamDetail> {
        let snapshot = self.get(stream_id)?;
        Ok(StreamDetail {
            mode: MODE,
            srt_url: self.config.srt_publish_url(stream_id, snapshot.srt_port),
            hls_url: self.config.public_hls_url(stream_id),
            hls_api: self.config.hls_api_url(stream_id),
            stream_duration: live_duration(snapshot.stream_start, Utc::now()),
            snapshot,
        })
    }

    pub fn health(&self) -> HealthSummary {
        HealthSummary {
            total_streams: self.registry.len(),
            running_streams: self.registry.count_with_status(StreamStatus::Running),
            timestamp: Utc::now(),
            hls_path: self.config.hls_root.clone(),
        }
    }

    /// Playlist text and segment names from the output directory.
    pub async fn playlist_debug(&self, stream_id: &str) -> StreamResult<PlaylistDebug> {
        let snapshot = self.get(stream_id)?;
        let dir = &snapshot.hls_path;

        let (playlist, playlist_error) = match tokio::fs::read_to_string(dir.join(PLAYLIST_NAME)).await {
            Ok(text) => (Some(text), None),
            Err(e) => (None, Some(format!("Error reading {PLAYLIST_NAME}: {e}"))),
        };
        let segments = list_segments(dir, &self.config.liveness.artifact_extension)
            .await
            .unwrap_or_default();

        Ok(PlaylistDebug {
            stream_id: snapshot.stream_id.clone(),
            status: snapshot.status,
            mode: MODE,
            hls_path: snapshot.hls_path.clone(),
            playlist,
            playlist_error,
            segments,
            start_time: snapshot.start_time,
            stream_start: snapshot.stream_start,
            stream_duration: live_duration(snapshot.stream_start, Utc::now()),
        })
    }

    /// Cancel every liveness monitor and kill the remaining workers.
    ///
    /// Nothing is reported to the system of record, so the streams are
    /// replayed by recovery on the next start.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let ids: Vec<String> = self.registry.list().into_iter().map(|s| s.stream_id).collect();
        for stream_id in ids {
            let Ok(ticket) = self.registry.begin_stop(&stream_id) else {
                continue;
            };
            if let Some(mut worker) = ticket.worker {
                if let Ok(Err(e)) = tokio::time::timeout(self.config.kill_timeout, worker.kill()).await {
                    warn!(stream_id = %stream_id, "Failed to kill worker on shutdown: {}", e);
                }
            }
            self.registry.remove(&stream_id);
        }
        info!("Stream manager shut down");
    }
}

/// IDs become a single directory name under the output root.
fn validate_stream_id(stream_id: &str) -> StreamResult<()> {
    if stream_id.trim().is_empty() {
        return Err(StreamError::Validation("stream_id is required".to_string()));
    }
    let mut components = Path::new(stream_id).components();
    let single_name = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(name)), None) if name == stream_id
    );
    if !single_name || stream_id.contains(['\\', '\0']) {
        return Err(StreamError::Validation(format!(
            "stream_id '{stream_id}' contains path characters"
        )));
    }
    Ok(())
}

async fn prepare_paths(paths: &StreamPaths) -> StreamResult<()> {
    let resource = |what: &str, path: &Path, e: io::Error| {
        StreamError::Resource(format!("{what} {}: {e}", path.display()))
    };

    tokio::fs::create_dir_all(&paths.output_dir)
        .await
        .map_err(|e| resource("create output directory", &paths.output_dir, e))?;
    if let Some(parent) = paths.log_file.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| resource("create log directory", parent, e))?;
    }
    tokio::fs::File::create(&paths.log_file)
        .await
        .map_err(|e| resource("create log file", &paths.log_file, e))?;

    // a marker left by a previous run would stop the new worker immediately
    remove_file_if_exists(&paths.stop_marker)
        .await
        .map_err(|e| resource("remove stale stop marker", &paths.stop_marker, e))?;
    Ok(())
}

async fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

async fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

async fn list_segments(dir: &Path, extension: &str) -> io::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut segments = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                segments.push(name.to_string());
            }
        }
    }
    segments.sort();
    Ok(segments)
}

/// Human-readable time since `live_since`, whole seconds.
fn live_duration(live_since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<String> {
    let elapsed = (now - live_since?).to_std().unwrap_or_default();
    Some(humantime::format_duration(Duration::from_secs(elapsed.as_secs())).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ManagerConfig {
        ManagerConfig::from_config(&Config::default(), "10.0.0.5".to_string())
    }

    #[test]
    fn test_validate_stream_id() {
        assert!(validate_stream_id("cam-1").is_ok());
        assert!(validate_stream_id("a1b2c3d4-0000").is_ok());
        for bad in ["", "  ", "../etc", "a/b", "a\\b", "..", ".", "./a", "a/.", "/cam"] {
            assert!(
                matches!(validate_stream_id(bad), Err(StreamError::Validation(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_urls_without_cdn() {
        let config = config();
        assert_eq!(config.srt_url("cam", 10003), "srt://10.0.0.5:10003?streamid=cam");
        assert_eq!(
            config.srt_publish_url("cam", 10003),
            "srt://10.0.0.5:10003?mode=caller&transtype=live&streamid=cam"
        );
        assert_eq!(
            config.public_hls_url("cam"),
            "http://10.0.0.5:8081/hls/cam/playlist.m3u8"
        );
        assert_eq!(config.hls_api_url("cam"), "http://10.0.0.5:8081/api/hls/cam");
        assert_eq!(config.public_host(), "10.0.0.5");
    }

    #[test]
    fn test_urls_with_cdn() {
        let mut app = Config::default();
        app.server.cdn_domain = Some(" cdn.example.com ".to_string());
        let config = ManagerConfig::from_config(&app, "10.0.0.5".to_string());

        assert_eq!(
            config.public_hls_url("cam"),
            "https://cdn.example.com/hls/cam/playlist.m3u8"
        );
        // the start summary always points at this service
        assert_eq!(
            config.local_hls_url("cam"),
            "http://10.0.0.5:8081/hls/cam/playlist.m3u8"
        );
        assert_eq!(config.public_host(), "cdn.example.com");
    }

    #[test]
    fn test_blank_cdn_is_ignored() {
        let mut app = Config::default();
        app.server.cdn_domain = Some("   ".to_string());
        assert!(ManagerConfig::from_config(&app, "h".to_string()).cdn_domain.is_none());
    }

    #[test]
    fn test_live_duration() {
        let now = Utc::now();
        assert_eq!(live_duration(None, now), None);
        let since = now - chrono::Duration::seconds(125);
        assert_eq!(live_duration(Some(since), now).as_deref(), Some("2m 5s"));
    }

    #[tokio::test]
    async fn test_list_segments_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["segment_002.ts", "segment_000.ts", "playlist.m3u8", "segment_001.ts"] {
            tokio::fs::write(dir.path().join(name), b"x").await.unwrap();
        }
        let segments = list_segments(dir.path(), "ts").await.unwrap();
        assert_eq!(
            segments,
            vec!["segment_000.ts", "segment_001.ts", "segment_002.ts"]
        );
    }

    #[tokio::test]
    async fn test_remove_helpers_ignore_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(remove_dir_if_exists(&dir.path().join("nope")).await.is_ok());
        assert!(remove_file_if_exists(&dir.path().join("nope")).await.is_ok());
    }
}
