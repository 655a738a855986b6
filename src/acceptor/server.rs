//! Acceptor server

use crate::acceptor::http::{create_router, AcceptorState};
use crate::acceptor::store::MemoryAcceptor;
use crate::common::{AcceptorConfig, Result};
use std::sync::Arc;

pub struct AcceptorServer {
    config: AcceptorConfig,
}

impl AcceptorServer {
    pub fn new(config: AcceptorConfig) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting acceptor {} (minicas {})", self.config.acceptor_id, crate::VERSION);
        tracing::info!("  HTTP API: {}", self.config.bind_addr);

        let store = Arc::new(MemoryAcceptor::new(self.config.acceptor_id.clone()));
        let router = create_router(AcceptorState {
            store,
            acceptor_id: self.config.acceptor_id.clone(),
        });

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("✓ Acceptor ready");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Acceptor stopped");
        Ok(())
    }
}

/// Resolves on Ctrl-C
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
