//! HTTP API of a proposer
//!
//! | Route | Operation |
//! |---|---|
//! | `POST /get/:key` | propose identity, value in body, ballot in `X-Ballot` |
//! | `POST /cas/:key` | compare-and-set, body is `expect\n\nset` |
//! | `POST /del/:key` | delete, body is the expected value |
//! | `POST /add-preparer`, `/add-accepter` | membership, body is an endpoint URL |
//! | `POST /remove-preparer`, `/remove-accepter` | membership, body is an endpoint URL |
//! | `POST /full-identity-read/:key` | prepare-only read |
//! | `POST /fast-forward-increment/:key` | tombstone in `X-Ballot`, age in `X-Age` |
//! | `GET /members` | current preparers and accepters |
//!
//! A compare-and-set whose expectation does not match still completes a
//! round and answers 200 with the unchanged value. A delete whose
//! expectation does not match answers 412. A round lost to a higher ballot
//! also answers 412, with that ballot in `X-Ballot`.

use crate::common::headers::{get_ballot, set_ballot, AGE_HEADER, BALLOT_HEADER};
use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::utils::MAX_BODY_BYTES;
use crate::common::{validate_key, Error, Result, METRICS};
use crate::proposer::acceptor_client::{AcceptorClient, Endpoint};
use crate::protocol::ballot::Ballot;
use crate::protocol::membership::Role;
use crate::protocol::proposer::Proposer;
use crate::protocol::update::{State, Update};
use axum::{
    body::Bytes,
    extract::{Path, State as AxumState},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

/// Separator between expected and new value in a CAS body
pub const CAS_SEPARATOR: &[u8] = b"\n\n";

#[derive(Clone)]
pub struct ProposerState {
    pub proposer: Arc<Proposer>,
    /// Client handed to acceptors added at runtime
    pub http: reqwest::Client,
}

/// Membership listing returned by `GET /members`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Members {
    pub proposer_id: u64,
    pub preparers: Vec<String>,
    pub accepters: Vec<String>,
}

pub fn create_router(state: ProposerState) -> Router {
    Router::new()
        .route("/get/:key", post(handle_get))
        .route("/cas/:key", post(handle_cas))
        .route("/del/:key", post(handle_del))
        .route("/add-preparer", post(handle_add_preparer))
        .route("/add-accepter", post(handle_add_accepter))
        .route("/remove-preparer", post(handle_remove_preparer))
        .route("/remove-accepter", post(handle_remove_accepter))
        .route("/full-identity-read/:key", post(handle_full_identity_read))
        .route(
            "/fast-forward-increment/:key",
            post(handle_fast_forward_increment),
        )
        .route("/members", get(members))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(middleware::from_fn(request_tracing_middleware))
        .with_state(state)
}

/// Conflicts carry the higher ballot so callers can tell them from failed
/// preconditions.
fn error_response(e: Error) -> Response {
    let mut headers = HeaderMap::new();
    if let Some(ballot) = e.conflicting_ballot() {
        set_ballot(&mut headers, BALLOT_HEADER, ballot);
    }
    (e.to_http_status(), headers, e.to_string()).into_response()
}

fn versioned(state: State, ballot: Ballot) -> Response {
    let mut headers = HeaderMap::new();
    set_ballot(&mut headers, BALLOT_HEADER, ballot);
    (StatusCode::OK, headers, state).into_response()
}

/// Split `expect\n\nset` at the first separator.
pub fn split_cas_body(body: &Bytes) -> Result<(State, State)> {
    let at = body
        .windows(CAS_SEPARATOR.len())
        .position(|w| w == CAS_SEPARATOR)
        .ok_or_else(|| Error::BadRequest("CAS body must be <expect>\\n\\n<set>".into()))?;
    Ok((
        body.slice(..at),
        body.slice(at + CAS_SEPARATOR.len()..),
    ))
}

async fn handle_get(AxumState(state): AxumState<ProposerState>, Path(key): Path<String>) -> Response {
    if let Err(e) = validate_key(&key) {
        return error_response(e);
    }
    match state.proposer.propose(&key, &Update::Identity).await {
        Ok((value, ballot)) => versioned(value, ballot),
        Err(e) => error_response(e),
    }
}

async fn handle_cas(
    AxumState(state): AxumState<ProposerState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Response {
    let update = match validate_key(&key).and_then(|_| split_cas_body(&body)) {
        Ok((expect, set)) => Update::CompareAndSet { expect, set },
        Err(e) => return error_response(e),
    };
    match state.proposer.propose(&key, &update).await {
        Ok((value, ballot)) => versioned(value, ballot),
        Err(e) => error_response(e),
    }
}

async fn handle_del(
    AxumState(state): AxumState<ProposerState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Response {
    if let Err(e) = validate_key(&key) {
        return error_response(e);
    }
    match state.proposer.propose(&key, &Update::Delete { expect: body }).await {
        Ok((value, _)) if !value.is_empty() => error_response(Error::PreconditionFailed(
            "current value does not match".into(),
        )),
        Ok((value, ballot)) => versioned(value, ballot),
        Err(e) => error_response(e),
    }
}

fn parse_endpoint(body: &Bytes) -> Result<Endpoint> {
    let text = std::str::from_utf8(body)
        .map_err(|_| Error::InvalidEndpoint("endpoint is not UTF-8".into()))?;
    Endpoint::parse(text)
}

async fn add_member(state: &ProposerState, role: Role, body: &Bytes) -> Response {
    let endpoint = match parse_endpoint(body) {
        Ok(e) => e,
        Err(e) => return error_response(e),
    };
    let client = Arc::new(AcceptorClient::new(endpoint, state.http.clone()));
    let result = match role {
        Role::Preparer => state.proposer.add_preparer(client),
        Role::Accepter => state.proposer.add_accepter(client),
    };
    match result {
        Ok(()) => (StatusCode::OK, "OK\n").into_response(),
        Err(e) => error_response(e),
    }
}

async fn remove_member(state: &ProposerState, role: Role, body: &Bytes) -> Response {
    let endpoint = match parse_endpoint(body) {
        Ok(e) => e,
        Err(e) => return error_response(e),
    };
    let result = match role {
        Role::Preparer => state.proposer.remove_preparer(endpoint.address()),
        Role::Accepter => state.proposer.remove_accepter(endpoint.address()),
    };
    match result {
        Ok(()) => (StatusCode::OK, "OK\n").into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_add_preparer(AxumState(state): AxumState<ProposerState>, body: Bytes) -> Response {
    add_member(&state, Role::Preparer, &body).await
}

async fn handle_add_accepter(AxumState(state): AxumState<ProposerState>, body: Bytes) -> Response {
    add_member(&state, Role::Accepter, &body).await
}

async fn handle_remove_preparer(
    AxumState(state): AxumState<ProposerState>,
    body: Bytes,
) -> Response {
    remove_member(&state, Role::Preparer, &body).await
}

async fn handle_remove_accepter(
    AxumState(state): AxumState<ProposerState>,
    body: Bytes,
) -> Response {
    remove_member(&state, Role::Accepter, &body).await
}

async fn handle_full_identity_read(
    AxumState(state): AxumState<ProposerState>,
    Path(key): Path<String>,
) -> Response {
    if let Err(e) = validate_key(&key) {
        return error_response(e);
    }
    match state.proposer.full_identity_read(&key).await {
        Ok(value) => (StatusCode::OK, value).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_fast_forward_increment(
    AxumState(state): AxumState<ProposerState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(e) = validate_key(&key) {
        return error_response(e);
    }
    let tombstone = match get_ballot(&headers, BALLOT_HEADER) {
        Ok(b) => b.unwrap_or(Ballot::ZERO),
        Err(e) => return error_response(e),
    };
    match state.proposer.fast_forward_increment(&key, tombstone).await {
        Ok(age) => {
            let mut out = HeaderMap::new();
            set_ballot(&mut out, AGE_HEADER, age);
            (StatusCode::OK, out, "OK\n").into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn members(AxumState(state): AxumState<ProposerState>) -> Json<Members> {
    let membership = state.proposer.membership();
    Json(Members {
        proposer_id: state.proposer.id(),
        preparers: membership.preparers().addresses(),
        accepters: membership.accepters().addresses(),
    })
}

async fn health(AxumState(state): AxumState<ProposerState>) -> impl IntoResponse {
    let membership = state.proposer.membership();
    let ready = !membership.preparers().is_empty() && !membership.accepters().is_empty();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if ready { "ok" } else { "no replicas" },
            "proposer_id": state.proposer.id(),
            "preparers": membership.preparers().len(),
            "accepters": membership.accepters().len(),
        })),
    )
}

async fn metrics() -> impl IntoResponse {
    (StatusCode::OK, METRICS.to_prometheus())
}
