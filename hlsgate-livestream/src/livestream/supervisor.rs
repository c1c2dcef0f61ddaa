// Worker process supervisor
//
// One external worker per stream. The worker is launched detached; the only
// control we keep is the child handle (liveness check, wait, kill) and the
// cooperative stop marker it polls for.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use hlsgate_core::config::WorkerConfig;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::error::{StreamError, StreamResult};

/// Launch parameters for one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    pub stream_id: String,
    pub port: u16,
    pub output_dir: PathBuf,
    pub log_file: PathBuf,
    pub stop_marker: PathBuf,
}

impl WorkerSpec {
    /// Substitute `{stream_id}`, `{port}`, `{output_dir}`, `{stop_marker}` and `{log_file}`.
    #[must_use]
    pub fn render(&self, template: &str) -> String {
        template
            .replace("{stream_id}", &self.stream_id)
            .replace("{port}", &self.port.to_string())
            .replace("{output_dir}", &self.output_dir.to_string_lossy())
            .replace("{stop_marker}", &self.stop_marker.to_string_lossy())
            .replace("{log_file}", &self.log_file.to_string_lossy())
    }

    fn env(&self) -> [(&'static str, String); 5] {
        [
            ("STREAM_ID", self.stream_id.clone()),
            ("SRT_PORT", self.port.to_string()),
            ("HLS_PATH", self.output_dir.to_string_lossy().into_owned()),
            ("STOP_MARKER", self.stop_marker.to_string_lossy().into_owned()),
            ("LOG_FILE", self.log_file.to_string_lossy().into_owned()),
        ]
    }
}

/// Exclusive handle to a launched worker.
#[async_trait]
pub trait WorkerHandle: Send + Sync {
    fn pid(&self) -> Option<u32>;

    /// Wait up to `timeout` for the worker to exit on its own.
    /// Returns true once it has exited.
    async fn wait_exit(&mut self, timeout: Duration) -> bool;

    /// Forcefully terminate and reap the worker.
    async fn kill(&mut self) -> std::io::Result<()>;
}

/// Starts workers. Swapped for a fake in tests.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, spec: &WorkerSpec) -> StreamResult<Box<dyn WorkerHandle>>;
}

/// Launches the configured program as a child process.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: String,
    args: Vec<String>,
}

impl ProcessLauncher {
    #[must_use]
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
        }
    }

    fn command(&self, spec: &WorkerSpec) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args.iter().map(|arg| spec.render(arg)))
            .envs(spec.env())
            .stdin(Stdio::null())
            .kill_on_drop(false);
        cmd
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, spec: &WorkerSpec) -> StreamResult<Box<dyn WorkerHandle>> {
        let log = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&spec.log_file)
            .await
            .map_err(|e| {
                StreamError::Resource(format!(
                    "open worker log {}: {e}",
                    spec.log_file.display()
                ))
            })?
            .into_std()
            .await;
        let log_err = log
            .try_clone()
            .map_err(|e| StreamError::Resource(format!("duplicate worker log handle: {e}")))?;

        let mut cmd = self.command(spec);
        cmd.stdout(Stdio::from(log)).stderr(Stdio::from(log_err));

        let child = cmd.spawn().map_err(|e| {
            StreamError::DownstreamUnavailable(format!(
                "failed to launch worker '{}' for {}: {e}",
                self.program, spec.stream_id
            ))
        })?;

        info!(
            stream_id = %spec.stream_id,
            port = spec.port,
            pid = ?child.id(),
            "Worker launched"
        );
        Ok(Box::new(ChildHandle::new(child)))
    }
}

/// [`WorkerHandle`] over a tokio child process.
#[derive(Debug)]
pub struct ChildHandle {
    child: Child,
}

impl ChildHandle {
    #[must_use]
    pub const fn new(child: Child) -> Self {
        Self { child }
    }
}

#[async_trait]
impl WorkerHandle for ChildHandle {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait_exit(&mut self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(?status, "Worker exited");
                true
            }
            Ok(Err(e)) => {
                debug!("Waiting on worker failed: {}", e);
                false
            }
            Err(_) => false,
        }
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn spec(dir: &std::path::Path) -> WorkerSpec {
        WorkerSpec {
            stream_id: "cam-1".to_string(),
            port: 10007,
            output_dir: dir.join("hls/cam-1"),
            log_file: dir.join("cam-1.log"),
            stop_marker: dir.join("stop_cam-1"),
        }
    }

    #[test]
    fn test_render_placeholders() {
        let spec = spec(std::path::Path::new("/data"));
        assert_eq!(
            spec.render("srt://0.0.0.0:{port}?streamid={stream_id}"),
            "srt://0.0.0.0:10007?streamid=cam-1"
        );
        assert_eq!(spec.render("{output_dir}/x"), "/data/hls/cam-1/x");
        assert_eq!(spec.render("{stop_marker}"), "/data/stop_cam-1");
        assert_eq!(spec.render("plain"), "plain");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_launcher_redirects_output() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec(dir.path());
        let launcher = ProcessLauncher::new(&WorkerConfig {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "echo \"$STREAM_ID on {port}\"".to_string(),
            ],
        });

        let mut handle = launcher.launch(&spec).await.unwrap();
        assert!(handle.wait_exit(Duration::from_secs(5)).await);
        let log = tokio::fs::read_to_string(&spec.log_file).await.unwrap();
        assert_eq!(log.trim(), "cam-1 on 10007");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_long_running_worker() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ProcessLauncher::new(&WorkerConfig {
            program: "sleep".to_string(),
            args: vec!["30".to_string()],
        });

        let mut handle = launcher.launch(&spec(dir.path())).await.unwrap();
        assert!(handle.pid().is_some());
        assert!(!handle.wait_exit(Duration::from_millis(50)).await);

        handle.kill().await.unwrap();
        // reaped by kill, so waiting returns at once
        assert!(handle.wait_exit(Duration::from_millis(100)).await);
    }

    #[tokio::test]
    async fn test_missing_program_is_downstream_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ProcessLauncher::new(&WorkerConfig {
            program: "/nonexistent/hls-worker".to_string(),
            args: vec![],
        });

        let err = launcher.launch(&spec(dir.path())).await.err().unwrap();
        assert!(matches!(err, StreamError::DownstreamUnavailable(_)));
    }
}
