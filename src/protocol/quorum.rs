//! Majority fan-out over a replica snapshot
//!
//! Every replica of the snapshot gets its own tokio task. Replies are
//! tallied as they arrive and the round returns as soon as the outcome is
//! settled; the `JoinSet` is dropped on return, which aborts the
//! stragglers. The deadline bounds the whole round, and dropping the round
//! future (caller cancellation) aborts every task as well.

use crate::common::{Phase, Result};
use crate::protocol::acceptor::{AcceptReply, Acceptor, PrepareReply};
use crate::protocol::ballot::Ballot;
use crate::protocol::conflict::{Tally, Verdict};
use crate::protocol::membership::ReplicaSet;
use crate::protocol::update::State;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Answer of one replica, as the tally sees it
#[derive(Debug)]
pub enum Vote<T> {
    Granted(T),
    Rejected(Ballot),
}

/// One phase of one round against a fixed snapshot.
#[derive(Debug)]
pub struct QuorumRound {
    phase: Phase,
    replicas: Arc<ReplicaSet>,
    timeout: Duration,
}

impl QuorumRound {
    pub fn new(phase: Phase, replicas: Arc<ReplicaSet>, timeout: Duration) -> Self {
        Self {
            phase,
            replicas,
            timeout,
        }
    }

    /// Send `call` to every replica and wait for a decided outcome.
    pub async fn run<T, F, Fut>(&self, call: F) -> Result<Vec<T>>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn Acceptor>) -> Fut,
        Fut: Future<Output = Result<Vote<T>>> + Send + 'static,
    {
        let mut tally = Tally::new(self.phase, self.replicas.len(), self.replicas.majority());
        if let Some(verdict) = tally.decided() {
            return settle(verdict);
        }

        let mut tasks = JoinSet::new();
        for replica in self.replicas.iter() {
            let address = replica.address().to_string();
            let fut = call(replica.clone());
            tasks.spawn(async move { (address, fut.await) });
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            let joined = match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(joined)) => joined,
                // Every task reported without a decision
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        phase = %self.phase,
                        outstanding = tasks.len(),
                        "round deadline elapsed"
                    );
                    break;
                }
            };

            match joined {
                Ok((_, Ok(Vote::Granted(reply)))) => tally.grant(reply),
                Ok((_, Ok(Vote::Rejected(ballot)))) => tally.reject(ballot),
                Ok((address, Err(e))) => {
                    tracing::debug!(phase = %self.phase, replica = %address, error = %e, "replica failed");
                    tally.fail();
                }
                Err(e) => {
                    tracing::debug!(phase = %self.phase, error = %e, "replica task aborted");
                    tally.fail();
                }
            }

            if let Some(verdict) = tally.decided() {
                return settle(verdict);
            }
        }

        settle(tally.finish())
    }

    /// Prepare phase: returns the promises of a majority.
    pub async fn prepare(&self, key: &str, ballot: Ballot) -> Result<Vec<PrepareReply>> {
        let key: Arc<str> = Arc::from(key);
        self.run(move |replica| {
            let key = key.clone();
            async move {
                let reply = replica.prepare(&key, ballot).await?;
                if reply.ballot >= ballot {
                    Ok(Vote::Rejected(reply.ballot))
                } else {
                    Ok(Vote::Granted(reply))
                }
            }
        })
        .await
    }

    /// Accept phase: succeeds once a majority installed `state` at `ballot`.
    pub async fn accept(&self, key: &str, ballot: Ballot, state: State) -> Result<()> {
        let key: Arc<str> = Arc::from(key);
        self.run(move |replica| {
            let key = key.clone();
            let state = state.clone();
            async move {
                match replica.accept(&key, ballot, state).await? {
                    AcceptReply::Accepted => Ok(Vote::Granted(())),
                    AcceptReply::Rejected(higher) => Ok(Vote::Rejected(higher)),
                }
            }
        })
        .await
        .map(|_| ())
    }
}

fn settle<T>(verdict: Verdict<T>) -> Result<Vec<T>> {
    match verdict {
        Verdict::Granted(replies) => Ok(replies),
        Verdict::Failed(e) => Err(e),
    }
}

/// Highest-ballot promise among `replies`, the base value of a round.
pub fn highest_promise(replies: &[PrepareReply]) -> Option<&PrepareReply> {
    replies.iter().max_by_key(|r| r.ballot)
}
