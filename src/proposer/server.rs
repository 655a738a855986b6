//! Proposer server

use crate::acceptor::server::shutdown_signal;
use crate::common::{ProposerConfig, Result};
use crate::proposer::acceptor_client::{http_client, AcceptorClient, Endpoint};
use crate::proposer::http::{create_router, ProposerState};
use crate::protocol::acceptor::Acceptor;
use crate::protocol::membership::ReplicaSet;
use crate::protocol::proposer::Proposer;
use std::sync::Arc;

pub struct ProposerServer {
    config: ProposerConfig,
}

impl ProposerServer {
    pub fn new(config: ProposerConfig) -> Self {
        Self { config }
    }

    /// Build the proposer and its initial replica sets from config.
    pub fn build(&self) -> Result<ProposerState> {
        let id = self.config.proposer_id.unwrap_or_else(rand::random);
        let http = http_client(self.config.replica_timeout())?;

        let preparers = replica_set(&self.config.preparers, &http)?;
        let accepters = replica_set(&self.config.accepters, &http)?;
        if preparers.is_empty() || accepters.is_empty() {
            tracing::warn!("proposer starts without preparers or accepters; rounds will fail until some are added");
        }

        let proposer = Proposer::with_config(id, &self.config).with_replicas(preparers, accepters);
        Ok(ProposerState {
            proposer: Arc::new(proposer),
            http,
        })
    }

    pub async fn serve(self) -> Result<()> {
        let state = self.build()?;
        let proposer = state.proposer.clone();

        tracing::info!("Starting proposer {} (minicas {})", proposer.id(), crate::VERSION);
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  Preparers: {:?}", proposer.membership().preparers().addresses());
        tracing::info!("  Accepters: {:?}", proposer.membership().accepters().addresses());

        let router = create_router(state);
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("✓ Proposer ready");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Proposer stopped");
        Ok(())
    }
}

fn replica_set(endpoints: &[String], http: &reqwest::Client) -> Result<ReplicaSet> {
    endpoints
        .iter()
        .map(|e| {
            let endpoint = Endpoint::parse(e)?;
            Ok(Arc::new(AcceptorClient::new(endpoint, http.clone())) as Arc<dyn Acceptor>)
        })
        .collect()
}
