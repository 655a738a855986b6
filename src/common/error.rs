//! Error types for minicas

use crate::protocol::ballot::Ballot;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Protocol phase a quorum failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prepare,
    Accept,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Prepare => write!(f, "prepare"),
            Phase::Accept => write!(f, "accept"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Protocol Errors ===
    /// Lost to a higher ballot. Retry the whole round with a ballot above `ballot`.
    #[error("conflict: ballot {ballot} is higher")]
    Conflict { ballot: Ballot },

    #[error("{phase} quorum not reached: needed {needed}, got {received}")]
    Quorum {
        phase: Phase,
        needed: usize,
        received: usize,
    },

    #[error("ballot counter exhausted")]
    BallotExhausted,

    #[error("Invalid ballot: {0}")]
    InvalidBallot(String),

    // === Membership Errors ===
    #[error("Invalid replica endpoint: {0}")]
    InvalidEndpoint(String),

    // === Application Errors ===
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    // === Network Errors ===
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Conflict { .. } | Error::Timeout(_) | Error::ConnectionFailed(_)
        )
    }

    /// Higher ballot carried by a conflict, if any
    pub fn conflicting_ballot(&self) -> Option<Ballot> {
        match self {
            Error::Conflict { ballot } => Some(*ballot),
            _ => None,
        }
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::Conflict { .. } | Error::PreconditionFailed(_) => {
                StatusCode::PRECONDITION_FAILED
            }
            Error::InvalidEndpoint(_)
            | Error::InvalidBallot(_)
            | Error::InvalidConfig(_)
            | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else if e.is_connect() {
            Error::ConnectionFailed(e.to_string())
        } else {
            Error::Http(e.to_string())
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
