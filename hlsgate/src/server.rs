//! HTTP server lifecycle
//!
//! Serves the API until SIGTERM or Ctrl+C, then tears the stream manager down.

use std::sync::Arc;

use hlsgate_api::{create_router, AppState};
use hlsgate_core::Config;
use hlsgate_livestream::StreamManager;
use tracing::{error, info};

pub struct HlsGateServer {
    config: Config,
    manager: Arc<StreamManager>,
}

impl HlsGateServer {
    pub const fn new(config: Config, manager: Arc<StreamManager>) -> Self {
        Self { config, manager }
    }

    /// Bind, serve and wait for a shutdown signal
    pub async fn start(self) -> anyhow::Result<()> {
        let http_addr: std::net::SocketAddr = self
            .config
            .http_address()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid HTTP address '{}': {e}", self.config.http_address()))?;

        let listener = tokio::net::TcpListener::bind(http_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind HTTP address {http_addr}: {e}"))?;
        info!("HTTP server listening on {}", http_addr);

        let router = create_router(AppState::new(
            self.manager.clone(),
            &self.config.token.secret,
        ));

        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
        {
            error!("HTTP server error: {}", e);
        }
        info!("HTTP server shut down gracefully");

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&self) {
        info!("Shutting down hlsgate...");
        // Records stay active in the system of record; recovery picks them up on restart.
        self.manager.shutdown().await;
        info!("hlsgate shutdown complete");
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
