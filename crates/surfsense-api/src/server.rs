//! HTTP API Server
//!
//! Axum-based HTTP server run in the foreground of the supervisor process.

use std::net::SocketAddr;

use surfsense_core::ServerConfig;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::ApiError;
use crate::routes::create_router;
use crate::state::AppState;

/// HTTP API server bound to its listening socket
pub struct HttpServer {
    listener: TcpListener,
    state: AppState,
}

impl HttpServer {
    /// Bind the listener without serving yet
    pub async fn bind(config: &ServerConfig, state: AppState) -> Result<Self, ApiError> {
        let address = config.address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ApiError::Bind {
                address: address.clone(),
                source,
            })?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ApiError> {
        self.listener.local_addr().map_err(ApiError::Serve)
    }

    /// Serve requests until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ApiError> {
        let app = create_router(self.state);

        if let Ok(addr) = self.listener.local_addr() {
            info!("HTTP API server listening on http://{}", addr);
        }

        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                info!("HTTP server shutting down");
            })
            .await
            .map_err(ApiError::Serve)?;

        Ok(())
    }
}
