//! Configuration for minicas components

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Environment prefix, e.g. `MINICAS__PROPOSER__ROUND_TIMEOUT_MS=500`
pub const ENV_PREFIX: &str = "MINICAS";

/// Global configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Proposer-specific config
    #[serde(default)]
    pub proposer: ProposerConfig,

    /// Acceptor-specific config
    #[serde(default)]
    pub acceptor: AcceptorConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load from an optional TOML file, then apply `MINICAS__*` overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("proposer.preparers")
                    .with_list_parse_key("proposer.accepters")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.proposer.validate()
    }
}

/// Proposer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposerConfig {
    /// Bind address for the HTTP API
    pub bind_addr: SocketAddr,

    /// Ballot tie-breaker; random at startup when unset
    pub proposer_id: Option<u64>,

    /// Initial preparer endpoints
    pub preparers: Vec<String>,

    /// Initial accepter endpoints
    pub accepters: Vec<String>,

    /// Deadline for one phase of a round
    pub round_timeout_ms: u64,

    /// Timeout of a single replica RPC
    pub replica_timeout_ms: u64,

    /// Upper bound of the random pause between internal retries
    pub retry_backoff_ms: u64,

    /// Conflict retries of a full identity read
    pub read_retries: usize,
}

impl Default for ProposerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            proposer_id: None,
            preparers: Vec::new(),
            accepters: Vec::new(),
            round_timeout_ms: 2000,
            replica_timeout_ms: 1000,
            retry_backoff_ms: 10,
            read_retries: 8,
        }
    }
}

impl ProposerConfig {
    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.round_timeout_ms)
    }

    pub fn replica_timeout(&self) -> Duration {
        Duration::from_millis(self.replica_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.round_timeout_ms == 0 {
            return Err(Error::InvalidConfig("round_timeout_ms must be > 0".into()));
        }
        if self.replica_timeout_ms == 0 {
            return Err(Error::InvalidConfig("replica_timeout_ms must be > 0".into()));
        }
        Ok(())
    }
}

/// Acceptor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceptorConfig {
    /// Bind address for the HTTP API
    pub bind_addr: SocketAddr,

    /// Name reported by the health endpoint
    pub acceptor_id: String,
}

impl Default for AcceptorConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            acceptor_id: "acceptor-1".to_string(),
        }
    }
}
