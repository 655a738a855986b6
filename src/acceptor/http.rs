//! HTTP API of an acceptor
//!
//! - `POST /prepare/:key` with `X-Ballot`: replies 200 with the held ballot
//!   in `X-Ballot`, `X-Found`, and the accepted value as body
//! - `POST /accept/:key` with `X-Ballot` and the value as body: 200 when
//!   accepted, 409 with the higher ballot in `X-Ballot` when rejected

use crate::acceptor::store::MemoryAcceptor;
use crate::common::headers::{get_ballot, set_ballot, BALLOT_HEADER, FOUND_HEADER};
use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::utils::MAX_BODY_BYTES;
use crate::common::{Error, Result, METRICS};
use crate::protocol::acceptor::AcceptReply;
use crate::protocol::ballot::Ballot;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

#[derive(Clone)]
pub struct AcceptorState {
    pub store: Arc<MemoryAcceptor>,
    pub acceptor_id: String,
}

pub fn create_router(state: AcceptorState) -> Router {
    Router::new()
        .route("/prepare/:key", post(prepare))
        .route("/accept/:key", post(accept))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(middleware::from_fn(request_tracing_middleware))
        .with_state(state)
}

fn error_response(e: Error) -> Response {
    (e.to_http_status(), e.to_string()).into_response()
}

fn required_ballot(headers: &HeaderMap) -> Result<Ballot> {
    get_ballot(headers, BALLOT_HEADER)?
        .ok_or_else(|| Error::InvalidBallot(format!("missing {} header", BALLOT_HEADER)))
}

async fn prepare(
    State(state): State<AcceptorState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ballot = match required_ballot(&headers) {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    let reply = state.store.handle_prepare(&key, ballot);

    let mut out = HeaderMap::new();
    set_ballot(&mut out, BALLOT_HEADER, reply.ballot);
    out.insert(
        FOUND_HEADER,
        HeaderValue::from_static(if reply.found() { "true" } else { "false" }),
    );
    (StatusCode::OK, out, reply.state.unwrap_or_default()).into_response()
}

async fn accept(
    State(state): State<AcceptorState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ballot = match required_ballot(&headers) {
        Ok(b) => b,
        Err(e) => return error_response(e),
    };

    match state.store.handle_accept(&key, ballot, body) {
        AcceptReply::Accepted => (StatusCode::OK, "OK").into_response(),
        AcceptReply::Rejected(higher) => {
            let mut out = HeaderMap::new();
            set_ballot(&mut out, BALLOT_HEADER, higher);
            (StatusCode::CONFLICT, out, "rejected").into_response()
        }
    }
}

async fn health(State(state): State<AcceptorState>) -> impl IntoResponse {
    axum::Json(json!({
        "status": "ok",
        "acceptor_id": state.acceptor_id,
        "keys": state.store.len(),
    }))
}

async fn metrics() -> impl IntoResponse {
    (StatusCode::OK, METRICS.to_prometheus())
}
