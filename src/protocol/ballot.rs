//! Ballots and the per-proposer ballot clock
//!
//! A [`Ballot`] is a `(counter, proposer id)` pair. Ballots are ordered by
//! counter first and proposer id second, so two proposers with distinct ids
//! can never produce equal ballots.

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Proposal attempt identifier, totally ordered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Ballot {
    /// Compared first
    pub counter: u64,
    /// Breaks ties between proposers
    pub id: u64,
}

/// Ballot installed for a key, as reported by fast-forward.
pub type Age = Ballot;

impl Ballot {
    /// Below every ballot a proposer can issue
    pub const ZERO: Self = Self { counter: 0, id: 0 };

    pub const fn new(counter: u64, id: u64) -> Self {
        Self { counter, id }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl std::fmt::Display for Ballot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.counter, self.id)
    }
}

impl FromStr for Ballot {
    type Err = Error;

    /// Parse the `counter/id` encoding used in headers
    fn from_str(s: &str) -> Result<Self> {
        let (counter, id) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::InvalidBallot(format!("expected counter/id, got {:?}", s)))?;
        let counter = counter
            .parse()
            .map_err(|_| Error::InvalidBallot(format!("bad counter in {:?}", s)))?;
        let id = id
            .parse()
            .map_err(|_| Error::InvalidBallot(format!("bad id in {:?}", s)))?;
        Ok(Self { counter, id })
    }
}

/// Issues strictly increasing ballots for one proposer instance.
///
/// A single counter is shared by every key, which keeps ballots unique per
/// proposer id and strictly increasing per key. [`BallotClock::observe`]
/// moves the counter past ballots seen from other proposers so the next
/// attempt can win.
#[derive(Debug)]
pub struct BallotClock {
    id: u64,
    counter: AtomicU64,
}

impl BallotClock {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            counter: AtomicU64::new(0),
        }
    }

    /// Proposer id stamped on every ballot
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Last counter value handed out or observed
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Allocate the next ballot.
    pub fn next(&self) -> Result<Ballot> {
        let prev = self
            .counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| c.checked_add(1))
            .map_err(|_| Error::BallotExhausted)?;
        Ok(Ballot::new(prev + 1, self.id))
    }

    /// Record a ballot seen on the wire; later ballots from this clock will
    /// exceed it.
    pub fn observe(&self, seen: Ballot) {
        self.counter.fetch_max(seen.counter, Ordering::SeqCst);
    }
}
