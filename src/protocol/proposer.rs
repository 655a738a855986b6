//! CASPaxos proposer
//!
//! Every update is one round of two phases over independent snapshots of
//! the preparer and accepter sets:
//!
//! 1. **Prepare**: a fresh ballot is sent to every preparer. A majority of
//!    promises yields the value with the highest accepted ballot, or the
//!    empty state if none was ever accepted.
//! 2. **Accept**: the update is applied once to that value and the result is
//!    sent with the same ballot to every accepter. A majority of
//!    acceptances commits it.
//!
//! A phase lost to a higher ballot surfaces as [`Error::Conflict`]; the
//! clock has already been moved past the conflicting ballot, so a retry of
//! [`Proposer::propose`] starts above it. [`Proposer::propose`] never
//! retries by itself.

use crate::common::config::ProposerConfig;
use crate::common::metrics::METRICS;
use crate::common::utils::jitter;
use crate::common::{Error, Phase, Result};
use crate::protocol::acceptor::Acceptor;
use crate::protocol::ballot::{Age, Ballot, BallotClock};
use crate::protocol::membership::{Membership, ReplicaSet, Role};
use crate::protocol::quorum::{highest_promise, QuorumRound};
use crate::protocol::update::{State, Update};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct Proposer {
    clock: BallotClock,
    membership: Membership,
    round_timeout: Duration,
    retry_backoff: Duration,
    read_retries: usize,
}

impl Proposer {
    /// Proposer with default timeouts and no replicas.
    pub fn new(id: u64) -> Self {
        Self::with_config(id, &ProposerConfig::default())
    }

    pub fn with_config(id: u64, config: &ProposerConfig) -> Self {
        Self {
            clock: BallotClock::new(id),
            membership: Membership::default(),
            round_timeout: config.round_timeout(),
            retry_backoff: config.retry_backoff(),
            read_retries: config.read_retries,
        }
    }

    /// Replace both replica sets wholesale.
    pub fn with_replicas(mut self, preparers: ReplicaSet, accepters: ReplicaSet) -> Self {
        METRICS.preparers.set(preparers.len() as u64);
        METRICS.accepters.set(accepters.len() as u64);
        self.membership = Membership::new(preparers, accepters);
        self
    }

    pub fn with_round_timeout(mut self, timeout: Duration) -> Self {
        self.round_timeout = timeout;
        self
    }

    pub fn id(&self) -> u64 {
        self.clock.id()
    }

    pub fn clock(&self) -> &BallotClock {
        &self.clock
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    /// Apply `update` to the current value of `key`.
    ///
    /// Returns the installed state and the ballot it was installed at.
    pub async fn propose(&self, key: &str, update: &Update) -> Result<(State, Ballot)> {
        METRICS.rounds_started.inc();
        let started = Instant::now();

        let ballot = self.clock.next()?;
        let base = self.prepare(key, ballot).await?;
        let next = update.apply(&base);
        self.accept(key, ballot, next.clone()).await?;

        METRICS.record_round(started.elapsed());
        tracing::debug!(key, %ballot, update = update.kind(), "round committed");
        Ok((next, ballot))
    }

    /// Linearizable read through the prepare phase only.
    ///
    /// Nothing is accepted, so the stored value and accepted ballot are left
    /// as they were. A lost prepare is retried a bounded number of times.
    pub async fn full_identity_read(&self, key: &str) -> Result<State> {
        METRICS.identity_reads.inc();
        let mut attempts = 0;
        loop {
            let ballot = self.clock.next()?;
            match self.prepare(key, ballot).await {
                Ok(state) => return Ok(state),
                Err(Error::Conflict { ballot: higher }) if attempts < self.read_retries => {
                    attempts += 1;
                    tracing::debug!(key, %higher, attempts, "identity read lost prepare, retrying");
                    tokio::time::sleep(jitter(self.retry_backoff)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Re-install the current value of `key` at a ballot above `tombstone`.
    ///
    /// Keeps retrying with higher ballots until a round wins, so conflicts
    /// are never returned. Quorum failures are.
    pub async fn fast_forward_increment(&self, key: &str, tombstone: Ballot) -> Result<Age> {
        let mut attempts = 0u64;
        loop {
            self.clock.observe(tombstone);
            let ballot = self.clock.next()?;

            let round = async {
                let base = self.prepare(key, ballot).await?;
                self.accept(key, ballot, base).await
            };

            match round.await {
                Ok(()) => {
                    METRICS.fast_forwards.inc();
                    tracing::info!(key, %tombstone, age = %ballot, attempts, "fast-forwarded");
                    return Ok(ballot);
                }
                Err(Error::Conflict { ballot: higher }) => {
                    attempts += 1;
                    tracing::debug!(key, %higher, attempts, "fast-forward contended, retrying");
                    tokio::time::sleep(jitter(self.retry_backoff)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn add_preparer(&self, acceptor: Arc<dyn Acceptor>) -> Result<()> {
        self.add_member(Role::Preparer, acceptor)
    }

    pub fn add_accepter(&self, acceptor: Arc<dyn Acceptor>) -> Result<()> {
        self.add_member(Role::Accepter, acceptor)
    }

    pub fn remove_preparer(&self, address: &str) -> Result<()> {
        self.remove_member(Role::Preparer, address)
    }

    pub fn remove_accepter(&self, address: &str) -> Result<()> {
        self.remove_member(Role::Accepter, address)
    }

    fn add_member(&self, role: Role, acceptor: Arc<dyn Acceptor>) -> Result<()> {
        let address = acceptor.address().to_string();
        if self.membership.add(role, acceptor)? {
            tracing::info!(%role, replica = %address, "replica added");
        } else {
            tracing::debug!(%role, replica = %address, "replica already present");
        }
        self.publish_gauges();
        Ok(())
    }

    fn remove_member(&self, role: Role, address: &str) -> Result<()> {
        if self.membership.remove(role, address)? {
            tracing::info!(%role, replica = %address, "replica removed");
        } else {
            tracing::debug!(%role, replica = %address, "replica not present");
        }
        self.publish_gauges();
        Ok(())
    }

    fn publish_gauges(&self) {
        METRICS.preparers.set(self.membership.preparers().len() as u64);
        METRICS.accepters.set(self.membership.accepters().len() as u64);
    }

    async fn prepare(&self, key: &str, ballot: Ballot) -> Result<State> {
        let round = QuorumRound::new(
            Phase::Prepare,
            self.membership.preparers(),
            self.round_timeout,
        );
        let promises = round
            .prepare(key, ballot)
            .await
            .map_err(|e| self.absorb(key, Phase::Prepare, e))?;

        Ok(highest_promise(&promises)
            .and_then(|p| p.state.clone())
            .unwrap_or_default())
    }

    async fn accept(&self, key: &str, ballot: Ballot, state: State) -> Result<()> {
        let round = QuorumRound::new(
            Phase::Accept,
            self.membership.accepters(),
            self.round_timeout,
        );
        round
            .accept(key, ballot, state)
            .await
            .map_err(|e| self.absorb(key, Phase::Accept, e))
    }

    /// Learn from a failed phase before handing the error back.
    fn absorb(&self, key: &str, phase: Phase, e: Error) -> Error {
        match &e {
            Error::Conflict { ballot } => {
                self.clock.observe(*ballot);
                match phase {
                    Phase::Prepare => METRICS.prepare_conflicts.inc(),
                    Phase::Accept => METRICS.accept_conflicts.inc(),
                }
                tracing::debug!(key, %phase, higher = %ballot, "phase lost to higher ballot");
            }
            Error::Quorum { .. } => {
                METRICS.quorum_failures.inc();
                tracing::warn!(key, %phase, error = %e, "quorum not reached");
            }
            _ => {}
        }
        e
    }
}

impl std::fmt::Debug for Proposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proposer")
            .field("id", &self.clock.id())
            .field("preparers", &self.membership.preparers().addresses())
            .field("accepters", &self.membership.accepters().addresses())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acceptor::store::MemoryAcceptor;

    fn cluster(n: usize) -> (Proposer, Vec<Arc<MemoryAcceptor>>) {
        let replicas: Vec<Arc<MemoryAcceptor>> = (0..n)
            .map(|i| Arc::new(MemoryAcceptor::new(format!("mem-{}", i))))
            .collect();
        let set: ReplicaSet = replicas
            .iter()
            .map(|r| r.clone() as Arc<dyn Acceptor>)
            .collect();
        let proposer = Proposer::new(1).with_replicas(set.clone(), set);
        (proposer, replicas)
    }

    #[tokio::test]
    async fn test_identity_on_fresh_key() {
        let (proposer, _) = cluster(3);
        let (state, ballot) = proposer.propose("foo", &Update::Identity).await.unwrap();
        assert!(state.is_empty());
        assert_eq!(ballot, Ballot::new(1, 1));
    }

    #[tokio::test]
    async fn test_cas_installs_on_majority() {
        let (proposer, replicas) = cluster(3);
        let (state, ballot) = proposer
            .propose("foo", &Update::compare_and_set("", "bar"))
            .await
            .unwrap();
        assert_eq!(state, State::from_static(b"bar"));

        let installed = replicas
            .iter()
            .filter_map(|r| r.register("foo"))
            .filter(|r| r.accepted == ballot)
            .count();
        assert!(installed >= 2);
    }

    #[tokio::test]
    async fn test_conflict_moves_clock() {
        let (proposer, replicas) = cluster(3);
        for r in &replicas {
            r.handle_prepare("foo", Ballot::new(50, 9));
        }

        let err = proposer
            .propose("foo", &Update::Identity)
            .await
            .unwrap_err();
        assert_eq!(err.conflicting_ballot(), Some(Ballot::new(50, 9)));

        let (_, ballot) = proposer.propose("foo", &Update::Identity).await.unwrap();
        assert!(ballot > Ballot::new(50, 9));
    }

    #[tokio::test]
    async fn test_identity_read_leaves_value() {
        let (proposer, replicas) = cluster(3);
        let (_, ballot) = proposer
            .propose("foo", &Update::compare_and_set("", "bar"))
            .await
            .unwrap();

        let first = proposer.full_identity_read("foo").await.unwrap();
        let second = proposer.full_identity_read("foo").await.unwrap();
        assert_eq!(first, State::from_static(b"bar"));
        assert_eq!(first, second);
        let installed = replicas
            .iter()
            .filter_map(|r| r.register("foo"))
            .filter(|r| r.accepted == ballot && r.value == Some(State::from_static(b"bar")))
            .count();
        assert!(installed >= 2);
    }

    #[tokio::test]
    async fn test_fast_forward_above_tombstone() {
        let (proposer, _) = cluster(3);
        proposer
            .propose("foo", &Update::compare_and_set("", "bar"))
            .await
            .unwrap();

        let tombstone = Ballot::new(100, 77);
        let age = proposer.fast_forward_increment("foo", tombstone).await.unwrap();
        assert!(age > tombstone);
        assert_eq!(age.counter, 101);

        let (state, ballot) = proposer.propose("foo", &Update::Identity).await.unwrap();
        assert_eq!(state, State::from_static(b"bar"));
        assert!(ballot > age);
    }

    #[tokio::test]
    async fn test_no_replicas_is_quorum_error() {
        let proposer = Proposer::new(1);
        let err = proposer
            .propose("foo", &Update::Identity)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Quorum {
                phase: Phase::Prepare,
                ..
            }
        ));
    }
}
