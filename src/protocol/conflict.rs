//! Classification of phase replies
//!
//! A round ends in one of three ways: a majority granted the request, a
//! majority answered but too many rejected with a higher ballot (a
//! retryable conflict), or too few replicas answered at all (a quorum
//! failure). Transport errors count as silence; explicit rejections count
//! as answers.

use crate::common::{Error, Phase};
use crate::protocol::ballot::Ballot;

/// Running count of replies for one phase.
#[derive(Debug, Clone)]
pub struct Tally<T> {
    phase: Phase,
    size: usize,
    majority: usize,
    granted: Vec<T>,
    rejected: usize,
    failed: usize,
    highest_rejection: Ballot,
}

/// What a finished tally means for the round.
#[derive(Debug)]
pub enum Verdict<T> {
    Granted(Vec<T>),
    Failed(Error),
}

impl<T> Tally<T> {
    /// `majority` is the snapshot's, see `ReplicaSet::majority`.
    pub fn new(phase: Phase, size: usize, majority: usize) -> Self {
        Self {
            phase,
            size,
            majority,
            granted: Vec::with_capacity(size),
            rejected: 0,
            failed: 0,
            highest_rejection: Ballot::ZERO,
        }
    }

    pub fn grant(&mut self, reply: T) {
        self.granted.push(reply);
    }

    pub fn reject(&mut self, ballot: Ballot) {
        self.rejected += 1;
        self.highest_rejection = self.highest_rejection.max(ballot);
    }

    pub fn fail(&mut self) {
        self.failed += 1;
    }

    /// Replicas that answered, grant or reject
    pub fn responses(&self) -> usize {
        self.granted.len() + self.rejected
    }

    fn outstanding(&self) -> usize {
        self.size - self.responses() - self.failed
    }

    /// Verdict as soon as the outcome can no longer change.
    pub fn decided(&mut self) -> Option<Verdict<T>> {
        if self.granted.len() >= self.majority {
            return Some(Verdict::Granted(std::mem::take(&mut self.granted)));
        }
        let grant_reachable = self.granted.len() + self.outstanding() >= self.majority;
        if grant_reachable {
            return None;
        }
        let answers_reachable = self.responses() + self.outstanding() >= self.majority;
        if self.responses() >= self.majority || !answers_reachable {
            return Some(Verdict::Failed(self.failure()));
        }
        None
    }

    /// Verdict when no more replies will come (deadline or all in).
    pub fn finish(mut self) -> Verdict<T> {
        match self.decided() {
            Some(verdict) => verdict,
            None => Verdict::Failed(self.failure()),
        }
    }

    fn failure(&self) -> Error {
        if self.responses() >= self.majority && self.rejected > 0 {
            Error::Conflict {
                ballot: self.highest_rejection,
            }
        } else {
            Error::Quorum {
                phase: self.phase,
                needed: self.majority,
                received: self.responses(),
            }
        }
    }
}
