//! In-memory register store
//!
//! Holds, per key, the highest promised ballot, the accepted ballot and the
//! accepted value. This is the passive half of the protocol: it only
//! compares ballots and never decides anything by itself.

use crate::common::Result;
use crate::protocol::acceptor::{AcceptReply, Acceptor, PrepareReply};
use crate::protocol::ballot::Ballot;
use crate::protocol::update::State;
use futures_util::future::{self, BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Per-key acceptor record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Register {
    pub promise: Ballot,
    pub accepted: Ballot,
    pub value: Option<State>,
}

impl Register {
    fn highest(&self) -> Ballot {
        self.promise.max(self.accepted)
    }
}

/// Acceptor keeping its registers in a map.
#[derive(Debug)]
pub struct MemoryAcceptor {
    address: String,
    registers: Mutex<HashMap<String, Register>>,
}

impl MemoryAcceptor {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            registers: Mutex::new(HashMap::new()),
        }
    }

    /// Promise `ballot` for `key` unless a ballot at least as high is held.
    pub fn handle_prepare(&self, key: &str, ballot: Ballot) -> PrepareReply {
        let mut registers = self.registers.lock().unwrap_or_else(PoisonError::into_inner);
        let register = registers.entry(key.to_string()).or_default();

        if ballot <= register.highest() {
            tracing::debug!(key, %ballot, held = %register.highest(), "prepare rejected");
            return PrepareReply {
                ballot: register.highest(),
                state: None,
            };
        }

        register.promise = ballot;
        PrepareReply {
            ballot: register.accepted,
            state: register.value.clone(),
        }
    }

    /// Install `state` at `ballot` if nothing higher has been promised.
    pub fn handle_accept(&self, key: &str, ballot: Ballot, state: State) -> AcceptReply {
        let mut registers = self.registers.lock().unwrap_or_else(PoisonError::into_inner);
        let register = registers.entry(key.to_string()).or_default();

        if ballot < register.promise || ballot <= register.accepted {
            tracing::debug!(key, %ballot, held = %register.highest(), "accept rejected");
            return AcceptReply::Rejected(register.highest());
        }

        register.promise = ballot;
        register.accepted = ballot;
        register.value = Some(state);
        AcceptReply::Accepted
    }

    /// Current record for `key`, if any request ever touched it
    pub fn register(&self, key: &str) -> Option<Register> {
        self.registers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.registers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Acceptor for MemoryAcceptor {
    fn address(&self) -> &str {
        &self.address
    }

    fn prepare<'a>(&'a self, key: &'a str, ballot: Ballot) -> BoxFuture<'a, Result<PrepareReply>> {
        future::ready(Ok(self.handle_prepare(key, ballot))).boxed()
    }

    fn accept<'a>(
        &'a self,
        key: &'a str,
        ballot: Ballot,
        state: State,
    ) -> BoxFuture<'a, Result<AcceptReply>> {
        future::ready(Ok(self.handle_accept(key, ballot, state))).boxed()
    }
}
