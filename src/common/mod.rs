//! Common utilities and types shared across minicas

pub mod config;
pub mod error;
pub mod headers;
pub mod metrics;
pub mod tracing_middleware;
pub mod utils;

pub use config::{AcceptorConfig, Config, ProposerConfig};
pub use error::{Error, Phase, Result};
pub use metrics::METRICS;
pub use utils::{encode_key, jitter, parse_duration, validate_key};
