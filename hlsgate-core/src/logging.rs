//! Tracing subscriber setup for the gateway
//!
//! Per-stream work runs inside `liveness` and `notify` spans carrying the
//! `stream_id`, so the JSON output keeps the current span on every event.

use std::str::FromStr;

use anyhow::Context;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;

/// Dependencies that are chatty at debug level: every poll of the system of
/// record and every static segment request would otherwise be logged.
const QUIET_TARGETS: &[&str] = &["hyper=info", "hyper_util=info", "reqwest=info", "h2=info"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" | "text" => Ok(Self::Compact),
            other => Err(anyhow::anyhow!("Invalid log format: {other}")),
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level. Output goes to stdout unless
/// `file_path` is set, in which case the file is appended to.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let format: LogFormat = config.format.parse()?;
    let filter = build_filter(config)?;
    let writer = make_writer(config.file_path.as_deref())?;

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(writer),
            )
            .try_init()?,
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_file(false).with_writer(writer))
            .try_init()?,
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(false).with_writer(writer))
            .try_init()?,
    }
    Ok(())
}

fn build_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let level = parse_log_level(&config.level)?;
    let mut directives = vec![level.as_str().to_ascii_lowercase()];
    if level >= Level::DEBUG {
        directives.extend(QUIET_TARGETS.iter().map(ToString::to_string));
    }
    EnvFilter::try_new(directives.join(",")).context("Invalid log filter")
}

fn make_writer(file_path: Option<&str>) -> anyhow::Result<BoxMakeWriter> {
    let Some(path) = file_path else {
        return Ok(BoxMakeWriter::new(std::io::stdout));
    };
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Cannot open log file {path}"))?;
    Ok(BoxMakeWriter::new(std::sync::Arc::new(file)))
}

fn parse_log_level(level: &str) -> anyhow::Result<Level> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(anyhow::anyhow!("Invalid log level: {level}")),
    }
}
