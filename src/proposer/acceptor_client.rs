//! Remote acceptor reached over HTTP

use crate::common::headers::{get_ballot, BALLOT_HEADER, FOUND_HEADER};
use crate::common::{encode_key, Error, Result};
use crate::protocol::acceptor::{AcceptReply, Acceptor, PrepareReply};
use crate::protocol::ballot::Ballot;
use crate::protocol::update::State;
use futures_util::future::{BoxFuture, FutureExt};
use reqwest::{StatusCode, Url};
use std::fmt;
use std::time::Duration;

/// Validated replica endpoint descriptor, e.g. `http://10.0.0.5:8081`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    address: String,
}

impl Endpoint {
    pub fn parse(descriptor: &str) -> Result<Self> {
        let descriptor = descriptor.trim();
        let url = Url::parse(descriptor)
            .map_err(|e| Error::InvalidEndpoint(format!("{:?}: {}", descriptor, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidEndpoint(format!(
                "{:?}: scheme must be http or https",
                descriptor
            )));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(Error::InvalidEndpoint(format!("{:?}: missing host", descriptor)));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(Error::InvalidEndpoint(format!(
                "{:?}: query and fragment are not allowed",
                descriptor
            )));
        }
        let address = url.as_str().trim_end_matches('/').to_string();
        Ok(Self { address })
    }

    /// Normalized form used as the membership identity
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// Shared HTTP client for replica RPCs
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Internal(format!("failed to build HTTP client: {}", e)))
}

#[derive(Clone)]
pub struct AcceptorClient {
    endpoint: Endpoint,
    client: reqwest::Client,
}

impl AcceptorClient {
    pub fn new(endpoint: Endpoint, client: reqwest::Client) -> Self {
        Self { endpoint, client }
    }

    fn url(&self, op: &str, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint.address(), op, encode_key(key))
    }

    async fn send_prepare(&self, key: &str, ballot: Ballot) -> Result<PrepareReply> {
        let resp = self
            .client
            .post(self.url("prepare", key))
            .header(BALLOT_HEADER, ballot.to_string())
            .send()
            .await?;

        if resp.status() != StatusCode::OK {
            return Err(Error::Http(format!(
                "prepare on {}: {}",
                self.endpoint,
                resp.status()
            )));
        }

        let held = get_ballot(resp.headers(), BALLOT_HEADER)?
            .ok_or_else(|| Error::Http(format!("prepare on {}: no ballot", self.endpoint)))?;
        let found = resp
            .headers()
            .get(FOUND_HEADER)
            .map_or(false, |v| v.as_bytes() == b"true");
        let body = resp.bytes().await?;

        Ok(PrepareReply {
            ballot: held,
            state: found.then_some(body),
        })
    }

    async fn send_accept(&self, key: &str, ballot: Ballot, state: State) -> Result<AcceptReply> {
        let resp = self
            .client
            .post(self.url("accept", key))
            .header(BALLOT_HEADER, ballot.to_string())
            .body(state)
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(AcceptReply::Accepted),
            StatusCode::CONFLICT => {
                let higher = get_ballot(resp.headers(), BALLOT_HEADER)?.ok_or_else(|| {
                    Error::Http(format!("accept on {}: rejection without ballot", self.endpoint))
                })?;
                Ok(AcceptReply::Rejected(higher))
            }
            status => Err(Error::Http(format!(
                "accept on {}: {}",
                self.endpoint, status
            ))),
        }
    }
}

impl fmt::Debug for AcceptorClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcceptorClient")
            .field("endpoint", &self.endpoint.address())
            .finish()
    }
}

impl Acceptor for AcceptorClient {
    fn address(&self) -> &str {
        self.endpoint.address()
    }

    fn prepare<'a>(&'a self, key: &'a str, ballot: Ballot) -> BoxFuture<'a, Result<PrepareReply>> {
        self.send_prepare(key, ballot).boxed()
    }

    fn accept<'a>(
        &'a self,
        key: &'a str,
        ballot: Ballot,
        state: State,
    ) -> BoxFuture<'a, Result<AcceptReply>> {
        self.send_accept(key, ballot, state).boxed()
    }
}
