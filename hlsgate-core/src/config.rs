use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub streaming: StreamingConfig,
    pub liveness: LivenessConfig,
    pub notifier: NotifierConfig,
    pub recovery: RecoveryConfig,
    pub token: TokenConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
    /// Address advertised in SRT/HLS URLs. Detected from the default route when unset.
    pub server_ip: Option<String>,
    /// Public HLS host (CDN or reverse proxy). Falls back to `server_ip`.
    pub cdn_domain: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8081,
            server_ip: None,
            cdn_domain: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json", "pretty" or "compact"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Worker launch template.
///
/// Every argument may contain the placeholders `{stream_id}`, `{port}`,
/// `{output_dir}`, `{stop_marker}` and `{log_file}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: "bash".to_string(),
            args: vec![
                "scripts/hls-worker.sh".to_string(),
                "{stream_id}".to_string(),
                "{port}".to_string(),
                "{output_dir}".to_string(),
                "{stop_marker}".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub hls_root: PathBuf,
    pub logs_dir: PathBuf,
    pub marker_dir: PathBuf,
    pub base_port: u16,
    /// Time given to the worker to honor the stop marker
    pub stop_grace_ms: u64,
    /// Time to wait for the worker to exit after a forceful kill
    pub kill_timeout_ms: u64,
    pub worker: WorkerConfig,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            hls_root: PathBuf::from("/app/hls"),
            logs_dir: PathBuf::from("/app/logs"),
            marker_dir: std::env::temp_dir(),
            base_port: 10000,
            stop_grace_ms: 2_000,
            kill_timeout_ms: 5_000,
            worker: WorkerConfig::default(),
        }
    }
}

impl StreamingConfig {
    #[must_use]
    pub const fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    #[must_use]
    pub const fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    pub poll_interval_ms: u64,
    /// Newest artifact younger than this counts as quiet-but-alive
    pub idle_threshold_ms: u64,
    /// Consecutive inactive ticks before a running stream falls back to starting
    pub max_inactive_checks: u32,
    pub artifact_extension: String,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            idle_threshold_ms: 10_000,
            max_inactive_checks: 5,
            artifact_extension: "ts".to_string(),
        }
    }
}

impl LivenessConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub const fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_threshold_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Base URL of the system of record
    pub system_of_record_url: String,
    pub max_attempts: u32,
    pub backoff_unit_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            system_of_record_url: "http://go-app:8080".to_string(),
            max_attempts: 3,
            backoff_unit_ms: 2_000,
            request_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub enabled: bool,
    /// Wait before querying the system of record
    pub settle_delay_ms: u64,
    /// Pause between two recovered starts
    pub stagger_ms: u64,
    pub query_attempts: u32,
    pub query_backoff_unit_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            settle_delay_ms: 5_000,
            stagger_ms: 1_000,
            query_attempts: 5,
            query_backoff_unit_ms: 2_000,
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub secret: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: "default-secret-change-in-production".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // HLSGATE_SERVER__HTTP_PORT, HLSGATE_NOTIFIER__SYSTEM_OF_RECORD_URL, ...
        builder = builder.add_source(
            Environment::with_prefix("HLSGATE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }

    /// Collect every configuration problem instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.http_port == 0 {
            errors.push("server.http_port must be non-zero".to_string());
        }
        if self.streaming.base_port == 0 {
            errors.push("streaming.base_port must be non-zero".to_string());
        }
        if self.streaming.worker.program.trim().is_empty() {
            errors.push("streaming.worker.program must not be empty".to_string());
        }
        if self.liveness.poll_interval_ms == 0 {
            errors.push("liveness.poll_interval_ms must be non-zero".to_string());
        }
        if self.liveness.max_inactive_checks == 0 {
            errors.push("liveness.max_inactive_checks must be at least 1".to_string());
        }
        if self.liveness.artifact_extension.trim().is_empty() {
            errors.push("liveness.artifact_extension must not be empty".to_string());
        }
        if self.notifier.max_attempts == 0 {
            errors.push("notifier.max_attempts must be at least 1".to_string());
        }
        if !self.notifier.system_of_record_url.starts_with("http://")
            && !self.notifier.system_of_record_url.starts_with("https://")
        {
            errors.push(format!(
                "notifier.system_of_record_url must be an http(s) URL, got '{}'",
                self.notifier.system_of_record_url
            ));
        }
        if self.recovery.query_attempts == 0 {
            errors.push("recovery.query_attempts must be at least 1".to_string());
        }
        if self.token.secret.is_empty() {
            errors.push("token.secret must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
