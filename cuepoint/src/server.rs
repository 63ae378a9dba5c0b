//! Server lifecycle management
//!
//! Runs the HTTP server and the session reaper, and stops both on
//! SIGTERM or Ctrl+C.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use cuepoint_core::{bootstrap::Services, Config};

/// Cuepoint server - owns the HTTP listener and background tasks
pub struct CuepointServer {
    config: Config,
    services: Services,
}

impl CuepointServer {
    pub const fn new(config: Config, services: Services) -> Self {
        Self { config, services }
    }

    /// Start all components and wait for a shutdown signal
    pub async fn start(self) -> anyhow::Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let reaper = self.services.playback.start_reaper();
        match &reaper {
            Some(_) => info!(
                interval_secs = self.config.session.reap_interval_secs,
                "Session reaper started"
            ),
            None => info!("Session reaper disabled"),
        }

        let mut http_handle = self.start_http_server(shutdown_rx).await?;
        info!("All servers started successfully");

        let http_stopped = tokio::select! {
            _ = &mut http_handle => {
                error!("HTTP server stopped unexpectedly");
                true
            }
            () = shutdown_signal() => {
                info!("Shutdown signal received, starting graceful shutdown...");
                false
            }
        };

        // Signal all components to shut down
        let _ = shutdown_tx.send(true);

        if let Some(reaper) = reaper {
            reaper.abort();
        }
        if !http_stopped {
            if let Err(e) = http_handle.await {
                error!("HTTP server task failed: {}", e);
            }
        }

        info!(
            sessions = self.services.playback.session_count(),
            playlists = self.services.playlists.len(),
            "Cuepoint server stopped"
        );
        Ok(())
    }

    async fn start_http_server(
        &self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> anyhow::Result<JoinHandle<()>> {
        let http_addr: std::net::SocketAddr = self
            .config
            .http_address()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid HTTP address '{}': {e}", self.config.http_address()))?;

        // Bind before spawning so port conflicts fail startup
        let listener = tokio::net::TcpListener::bind(http_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind HTTP address {http_addr}: {e}"))?;
        info!("HTTP server listening on {}", http_addr);

        let http_router = cuepoint_api::create_router(self.services.clone().into());

        let handle = tokio::spawn(async move {
            let mut rx = shutdown_rx;
            let graceful = async move {
                let _ = rx.changed().await;
            };

            if let Err(e) = axum::serve(listener, http_router)
                .with_graceful_shutdown(graceful)
                .await
            {
                error!("HTTP server error: {}", e);
            }

            info!("HTTP server shut down gracefully");
        });

        Ok(handle)
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C signal");
            }
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
