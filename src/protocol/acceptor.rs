//! Replica capability set consumed by the proposer

use crate::common::Result;
use crate::protocol::ballot::Ballot;
use crate::protocol::update::State;
use futures_util::future::BoxFuture;
use std::fmt;

/// Reply to `prepare(key, ballot)`.
///
/// `ballot` is the highest ballot the replica holds for the key. When it is
/// at least the requested ballot the reply is a rejection and `state` is
/// meaningless. Otherwise it is the accepted ballot and `state` the accepted
/// value, `None` if nothing was ever accepted for the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareReply {
    pub ballot: Ballot,
    pub state: Option<State>,
}

impl PrepareReply {
    pub fn found(&self) -> bool {
        self.state.is_some()
    }
}

/// Reply to `accept(key, ballot, state)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptReply {
    Accepted,
    /// Replica holds this higher ballot
    Rejected(Ballot),
}

/// A replica as seen from a proposer.
///
/// `address` identifies the replica inside a membership set; two acceptors
/// with the same address are the same member.
pub trait Acceptor: Send + Sync + fmt::Debug {
    fn address(&self) -> &str;

    fn prepare<'a>(&'a self, key: &'a str, ballot: Ballot) -> BoxFuture<'a, Result<PrepareReply>>;

    fn accept<'a>(
        &'a self,
        key: &'a str,
        ballot: Ballot,
        state: State,
    ) -> BoxFuture<'a, Result<AcceptReply>>;
}
