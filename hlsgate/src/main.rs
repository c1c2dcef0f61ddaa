mod server;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use hlsgate_core::{bootstrap::load_config, logging, net::resolve_server_ip};
use hlsgate_livestream::livestream::{ManagerConfig, ProcessLauncher, StreamManager};
use hlsgate_livestream::record::{Recovery, RecoverySettings};
use hlsgate_livestream::{HttpSystemOfRecord, Notifier};

use server::HlsGateServer;

#[derive(Parser, Debug)]
#[command(name = "hlsgate")]
#[command(about = "SRT ingest to HLS stream orchestrator", long_about = None)]
struct Args {
    /// Path to a YAML/TOML config file
    #[arg(long, env = "HLSGATE_CONFIG_PATH")]
    config: Option<String>,

    /// Override server.http_port
    #[arg(long)]
    http_port: Option<u16>,

    /// Skip startup recovery regardless of configuration
    #[arg(long)]
    no_recovery: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let mut config = load_config(args.config.as_deref())?;
    if let Some(port) = args.http_port {
        config.server.http_port = port;
    }
    if args.no_recovery {
        config.recovery.enabled = false;
    }

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("hlsgate starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Output directories
    for dir in [
        &config.streaming.hls_root,
        &config.streaming.logs_dir,
        &config.streaming.marker_dir,
    ] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", dir.display()))?;
    }

    let server_ip = resolve_server_ip(config.server.server_ip.as_deref());
    info!("Advertising streams on {}", server_ip);

    // 4. System of record and status notifier
    let record = Arc::new(
        HttpSystemOfRecord::new(config.notifier.system_of_record_url.clone())?.with_timeouts(
            Duration::from_millis(config.notifier.request_timeout_ms),
            Duration::from_millis(config.recovery.request_timeout_ms),
        ),
    );
    info!("System of record: {}", record.base_url());
    let notifier = Notifier::from_config(record.clone(), &config.notifier);

    // 5. Stream manager
    let launcher = Arc::new(ProcessLauncher::new(&config.streaming.worker));
    let manager = Arc::new(StreamManager::new(
        ManagerConfig::from_config(&config, server_ip),
        launcher,
        notifier,
    ));

    // 6. Replay streams the system of record still considers active
    if config.recovery.enabled {
        let report = Recovery::new(
            record,
            manager.clone(),
            RecoverySettings::from_config(&config.recovery),
        )
        .run()
        .await;
        if !report.failed.is_empty() {
            warn!(
                "{} stream(s) could not be recovered: {:?}",
                report.failed.len(),
                report.failed
            );
        }
    } else {
        info!("Startup recovery disabled");
    }

    // 7. Serve until a shutdown signal
    HlsGateServer::new(config, manager).start().await
}
