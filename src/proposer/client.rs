//! Client for a proposer's HTTP API

use crate::common::headers::{get_ballot, set_ballot, AGE_HEADER, BALLOT_HEADER};
use crate::common::{encode_key, Error, Result};
use crate::proposer::http::{Members, CAS_SEPARATOR};
use crate::protocol::ballot::{Age, Ballot};
use crate::protocol::update::State;
use bytes::{BufMut, BytesMut};
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};

/// Value returned by a committed round and the ballot it landed at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub value: State,
    pub ballot: Ballot,
}

#[derive(Debug, Clone)]
pub struct ProposerClient {
    base: String,
    client: reqwest::Client,
}

impl ProposerClient {
    pub fn new(base: impl Into<String>) -> Self {
        Self::with_client(base, reqwest::Client::new())
    }

    pub fn with_client(base: impl Into<String>, client: reqwest::Client) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self { base, client }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn key_url(&self, op: &str, key: &str) -> String {
        format!("{}/{}/{}", self.base, op, encode_key(key))
    }

    async fn post(&self, url: String, body: impl Into<reqwest::Body>) -> Result<Response> {
        let resp = self.client.post(url).body(body).send().await?;
        check(resp).await
    }

    /// Identity round: current value without changing it
    pub async fn get(&self, key: &str) -> Result<Versioned> {
        let resp = self.post(self.key_url("get", key), State::new()).await?;
        versioned(resp).await
    }

    /// Install `set` if the current value equals `expect`.
    ///
    /// On a mismatch the round still commits and the unchanged value comes back.
    pub async fn cas(&self, key: &str, expect: &[u8], set: &[u8]) -> Result<Versioned> {
        let mut body = BytesMut::with_capacity(expect.len() + CAS_SEPARATOR.len() + set.len());
        body.put_slice(expect);
        body.put_slice(CAS_SEPARATOR);
        body.put_slice(set);
        let resp = self.post(self.key_url("cas", key), body.freeze()).await?;
        versioned(resp).await
    }

    /// Delete if the current value equals `expect`; 412 otherwise.
    pub async fn delete(&self, key: &str, expect: &[u8]) -> Result<Versioned> {
        let resp = self
            .post(self.key_url("del", key), State::copy_from_slice(expect))
            .await?;
        versioned(resp).await
    }

    pub async fn full_identity_read(&self, key: &str) -> Result<State> {
        let resp = self
            .post(self.key_url("full-identity-read", key), State::new())
            .await?;
        Ok(resp.bytes().await?)
    }

    pub async fn fast_forward_increment(&self, key: &str, tombstone: Ballot) -> Result<Age> {
        let mut headers = HeaderMap::new();
        set_ballot(&mut headers, BALLOT_HEADER, tombstone);
        let resp = self
            .client
            .post(self.key_url("fast-forward-increment", key))
            .headers(headers)
            .send()
            .await?;
        let resp = check(resp).await?;
        get_ballot(resp.headers(), AGE_HEADER)?
            .ok_or_else(|| Error::Http(format!("response without {} header", AGE_HEADER)))
    }

    pub async fn add_preparer(&self, endpoint: &str) -> Result<()> {
        self.membership("add-preparer", endpoint).await
    }

    pub async fn add_accepter(&self, endpoint: &str) -> Result<()> {
        self.membership("add-accepter", endpoint).await
    }

    pub async fn remove_preparer(&self, endpoint: &str) -> Result<()> {
        self.membership("remove-preparer", endpoint).await
    }

    pub async fn remove_accepter(&self, endpoint: &str) -> Result<()> {
        self.membership("remove-accepter", endpoint).await
    }

    async fn membership(&self, op: &str, endpoint: &str) -> Result<()> {
        self.post(format!("{}/{}", self.base, op), endpoint.to_string())
            .await?;
        Ok(())
    }

    pub async fn members(&self) -> Result<Members> {
        let resp = self
            .client
            .get(format!("{}/members", self.base))
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }
}

/// Map a non-2xx response to an error carrying the server's message.
///
/// A 412 with `X-Ballot` is a lost round, without it a failed precondition.
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let conflict = get_ballot(resp.headers(), BALLOT_HEADER)?;
    let message = resp.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::PRECONDITION_FAILED => match conflict {
            Some(ballot) => Error::Conflict { ballot },
            None => Error::PreconditionFailed(message),
        },
        StatusCode::BAD_REQUEST => Error::BadRequest(message),
        _ => Error::Http(format!("{}: {}", status, message)),
    })
}

async fn versioned(resp: Response) -> Result<Versioned> {
    let ballot = get_ballot(resp.headers(), BALLOT_HEADER)?
        .ok_or_else(|| Error::Http(format!("response without {} header", BALLOT_HEADER)))?;
    let value = resp.bytes().await?;
    Ok(Versioned { value, ballot })
}
