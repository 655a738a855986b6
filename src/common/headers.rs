//! Ballot headers shared by the HTTP bindings
//!
//! Ballots and ages travel as `counter/id` header values.

use crate::common::{Error, Result};
use crate::protocol::ballot::Ballot;
use axum::http::{HeaderMap, HeaderValue};

pub const BALLOT_HEADER: &str = "X-Ballot";
pub const AGE_HEADER: &str = "X-Age";
pub const FOUND_HEADER: &str = "X-Found";

/// Read a ballot header; `Ok(None)` when absent.
pub fn get_ballot(headers: &HeaderMap, name: &str) -> Result<Option<Ballot>> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => {
            let text = value
                .to_str()
                .map_err(|_| Error::InvalidBallot(format!("non-ASCII {} header", name)))?;
            text.parse().map(Some)
        }
    }
}

pub fn set_ballot(headers: &mut HeaderMap, name: &'static str, ballot: Ballot) {
    if let Ok(value) = HeaderValue::from_str(&ballot.to_string()) {
        headers.insert(name, value);
    }
}
