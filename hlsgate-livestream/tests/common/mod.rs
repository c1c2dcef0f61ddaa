// Shared fixtures for orchestration tests: an in-memory worker launcher and
// a manager wired to temp directories with short timings.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hlsgate_core::resilience::{RecordingDelay, RetryPolicy};
use hlsgate_core::{Config, StreamStatus};
use hlsgate_livestream::livestream::{
    LivenessSettings, ManagerConfig, StreamManager, WorkerHandle, WorkerLauncher, WorkerSpec,
};
use hlsgate_livestream::record::{MockSystemOfRecord, Notifier};
use hlsgate_livestream::{StreamError, StreamResult};
use parking_lot::Mutex;

/// Observable state of one fake worker.
#[derive(Debug)]
pub struct FakeWorkerState {
    pub alive: AtomicBool,
    pub killed: AtomicBool,
    pub honors_marker: bool,
    pub stop_marker: std::path::PathBuf,
}

pub struct FakeWorker(Arc<FakeWorkerState>);

#[async_trait]
impl WorkerHandle for FakeWorker {
    fn pid(&self) -> Option<u32> {
        Some(1000)
    }

    async fn wait_exit(&mut self, timeout: Duration) -> bool {
        if self.0.honors_marker && self.0.stop_marker.exists() {
            self.0.alive.store(false, Ordering::SeqCst);
            return true;
        }
        tokio::time::sleep(timeout).await;
        !self.0.alive.load(Ordering::SeqCst)
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        self.0.killed.store(true, Ordering::SeqCst);
        self.0.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeLauncher {
    pub attempts: Mutex<Vec<WorkerSpec>>,
    pub workers: Mutex<HashMap<String, Arc<FakeWorkerState>>>,
    failing: Mutex<HashSet<String>>,
    stubborn: AtomicBool,
    launch_delay: Mutex<Duration>,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_for(&self, stream_id: &str) {
        self.failing.lock().insert(stream_id.to_string());
    }

    /// Workers launched from now on ignore the stop marker.
    pub fn make_stubborn(&self) {
        self.stubborn.store(true, Ordering::SeqCst);
    }

    pub fn set_launch_delay(&self, delay: Duration) {
        *self.launch_delay.lock() = delay;
    }

    pub fn attempted(&self) -> Vec<String> {
        self.attempts.lock().iter().map(|s| s.stream_id.clone()).collect()
    }

    pub fn worker(&self, stream_id: &str) -> Arc<FakeWorkerState> {
        self.workers.lock()[stream_id].clone()
    }
}

#[async_trait]
impl WorkerLauncher for FakeLauncher {
    async fn launch(&self, spec: &WorkerSpec) -> StreamResult<Box<dyn WorkerHandle>> {
        self.attempts.lock().push(spec.clone());

        let delay = *self.launch_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().contains(&spec.stream_id) {
            return Err(StreamError::DownstreamUnavailable(format!(
                "cannot launch {}",
                spec.stream_id
            )));
        }

        let state = Arc::new(FakeWorkerState {
            alive: AtomicBool::new(true),
            killed: AtomicBool::new(false),
            honors_marker: !self.stubborn.load(Ordering::SeqCst),
            stop_marker: spec.stop_marker.clone(),
        });
        self.workers
            .lock()
            .insert(spec.stream_id.clone(), state.clone());
        Ok(Box::new(FakeWorker(state)))
    }
}

pub struct Harness {
    pub manager: Arc<StreamManager>,
    pub launcher: Arc<FakeLauncher>,
    pub record: Arc<MockSystemOfRecord>,
}

pub fn manager_config(root: &Path) -> ManagerConfig {
    let mut config = ManagerConfig::from_config(&Config::default(), "127.0.0.1".to_string());
    config.hls_root = root.join("hls");
    config.logs_dir = root.join("logs");
    config.marker_dir = root.join("markers");
    config.stop_grace = Duration::from_millis(50);
    config.kill_timeout = Duration::from_millis(200);
    config.liveness = LivenessSettings {
        poll_interval: Duration::from_millis(20),
        idle_threshold: Duration::from_millis(60),
        max_inactive_checks: 3,
        artifact_extension: "ts".to_string(),
    };
    config
}

pub fn harness(root: &Path) -> Harness {
    harness_with(root, Arc::new(MockSystemOfRecord::new()))
}

pub fn harness_with(root: &Path, record: Arc<MockSystemOfRecord>) -> Harness {
    std::fs::create_dir_all(root.join("markers")).unwrap();
    let launcher = FakeLauncher::new();
    let notifier = Notifier::new(record.clone(), RetryPolicy::linear(3, Duration::from_secs(2)))
        .with_delay(RecordingDelay::new());
    let manager = Arc::new(StreamManager::new(
        manager_config(root),
        launcher.clone(),
        notifier,
    ));
    Harness {
        manager,
        launcher,
        record,
    }
}

/// Poll until the stream reaches `status`.
pub async fn wait_for_status(manager: &StreamManager, stream_id: &str, status: StreamStatus) {
    for _ in 0..300 {
        if manager.get(stream_id).map(|s| s.status).ok() == Some(status) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{stream_id} never reached {status}");
}

/// Poll until the system of record has seen `expected` for the stream.
pub async fn wait_for_updates(
    record: &MockSystemOfRecord,
    stream_id: &str,
    expected: &[StreamStatus],
) {
    for _ in 0..300 {
        if record.updates_for(stream_id) == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "updates for {stream_id}: expected {expected:?}, got {:?}",
        record.updates_for(stream_id)
    );
}
