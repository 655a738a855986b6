//! Protocol-level tests for minicas: proposers over in-memory acceptors

use futures_util::future::{self, BoxFuture, FutureExt};
use minicas::common::{Error, Phase, Result};
use minicas::protocol::{AcceptReply, Acceptor, PrepareReply, ReplicaSet};
use minicas::{Ballot, MemoryAcceptor, Proposer, State, Update};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Replica that is unreachable
#[derive(Debug)]
struct Down(String);

impl Acceptor for Down {
    fn address(&self) -> &str {
        &self.0
    }

    fn prepare<'a>(&'a self, _: &'a str, _: Ballot) -> BoxFuture<'a, Result<PrepareReply>> {
        future::ready(Err(Error::ConnectionFailed(self.0.clone()))).boxed()
    }

    fn accept<'a>(&'a self, _: &'a str, _: Ballot, _: State) -> BoxFuture<'a, Result<AcceptReply>> {
        future::ready(Err(Error::ConnectionFailed(self.0.clone()))).boxed()
    }
}

/// Replica whose accepts wait until the test opens the gate
#[derive(Debug)]
struct Gated {
    inner: Arc<MemoryAcceptor>,
    gate: Arc<Semaphore>,
}

impl Acceptor for Gated {
    fn address(&self) -> &str {
        self.inner.address()
    }

    fn prepare<'a>(&'a self, key: &'a str, ballot: Ballot) -> BoxFuture<'a, Result<PrepareReply>> {
        self.inner.prepare(key, ballot)
    }

    fn accept<'a>(
        &'a self,
        key: &'a str,
        ballot: Ballot,
        state: State,
    ) -> BoxFuture<'a, Result<AcceptReply>> {
        async move {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| Error::Internal(e.to_string()))?;
            self.inner.accept(key, ballot, state).await
        }
        .boxed()
    }
}

fn down(name: &str) -> Arc<dyn Acceptor> {
    Arc::new(Down(name.to_string()))
}

fn memory(n: usize) -> Vec<Arc<MemoryAcceptor>> {
    (0..n)
        .map(|i| Arc::new(MemoryAcceptor::new(format!("mem-{}", i))))
        .collect()
}

fn set_of(replicas: &[Arc<MemoryAcceptor>]) -> ReplicaSet {
    replicas
        .iter()
        .map(|r| r.clone() as Arc<dyn Acceptor>)
        .collect()
}

fn proposer(id: u64, replicas: &[Arc<MemoryAcceptor>]) -> Proposer {
    Proposer::new(id).with_replicas(set_of(replicas), set_of(replicas))
}

#[tokio::test]
async fn test_register_lifecycle() {
    let replicas = memory(3);
    let p = proposer(1, &replicas);

    // Never proposed: empty state
    let (state, b1) = p.propose("foo", &Update::Identity).await.unwrap();
    assert!(state.is_empty());

    let (state, b2) = p
        .propose("foo", &Update::compare_and_set("", "bar"))
        .await
        .unwrap();
    assert_eq!(state, State::from_static(b"bar"));
    assert!(b2 > b1);

    // Mismatch still commits a round with the unchanged value
    let (state, b3) = p
        .propose("foo", &Update::compare_and_set("wrong", "baz"))
        .await
        .unwrap();
    assert_eq!(state, State::from_static(b"bar"));
    assert!(b3 > b2);

    // Stale delete leaves the value; the caller sees it is not empty
    let (state, b4) = p.propose("foo", &Update::delete("stale")).await.unwrap();
    assert_eq!(state, State::from_static(b"bar"));
    assert!(b4 > b3);

    let (state, b5) = p.propose("foo", &Update::delete("bar")).await.unwrap();
    assert!(state.is_empty());
    assert!(b5 > b4);

    let tombstone = Ballot::new(100, 99);
    let age = p.fast_forward_increment("foo", tombstone).await.unwrap();
    assert_eq!(age, Ballot::new(101, 1));

    let (state, b6) = p.propose("foo", &Update::Identity).await.unwrap();
    assert!(state.is_empty());
    assert!(b6 > age);
}

#[tokio::test]
async fn test_ballots_strictly_increase_per_key() {
    let replicas = memory(5);
    let p = proposer(3, &replicas);

    let mut last = Ballot::ZERO;
    for i in 0..20 {
        let key = if i % 2 == 0 { "even" } else { "odd" };
        let (_, ballot) = p.propose(key, &Update::Identity).await.unwrap();
        assert!(ballot > last);
        last = ballot;
    }
}

#[tokio::test]
async fn test_update_applies_to_highest_prepared_value() {
    let replicas = memory(3);
    // mem-0 holds an older value, mem-1 and mem-2 the newer one
    for (r, ballot, value) in [
        (&replicas[0], Ballot::new(3, 9), "old"),
        (&replicas[1], Ballot::new(5, 9), "new"),
        (&replicas[2], Ballot::new(5, 9), "new"),
    ] {
        r.handle_prepare("k", ballot);
        assert_eq!(
            r.handle_accept("k", ballot, State::from(value)),
            AcceptReply::Accepted
        );
    }

    let p = proposer(1, &replicas);
    p.clock().observe(Ballot::new(5, 9));
    let append = Update::custom(|s: &State| {
        let mut v = s.to_vec();
        v.push(b'!');
        State::from(v)
    });

    let (state, ballot) = p.propose("k", &append).await.unwrap();
    assert_eq!(state, State::from_static(b"new!"));
    assert_eq!(ballot, Ballot::new(6, 1));
}

#[tokio::test]
async fn test_minority_failure_tolerated() {
    let replicas = memory(3);
    let mut members: Vec<Arc<dyn Acceptor>> = replicas
        .iter()
        .take(2)
        .map(|r| r.clone() as Arc<dyn Acceptor>)
        .collect();
    members.push(down("down-0"));
    let set: ReplicaSet = members.into_iter().collect();

    let p = Proposer::new(1).with_replicas(set.clone(), set);
    let (state, _) = p
        .propose("foo", &Update::compare_and_set("", "bar"))
        .await
        .unwrap();
    assert_eq!(state, State::from_static(b"bar"));
    assert_eq!(p.full_identity_read("foo").await.unwrap(), state);
}

#[tokio::test]
async fn test_majority_down_is_quorum_error() {
    let replicas = memory(1);
    let set: ReplicaSet = vec![
        replicas[0].clone() as Arc<dyn Acceptor>,
        down("down-0"),
        down("down-1"),
    ]
    .into_iter()
    .collect();

    let p = Proposer::new(1).with_replicas(set.clone(), set);
    let err = p.propose("foo", &Update::Identity).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Quorum {
            phase: Phase::Prepare,
            needed: 2,
            ..
        }
    ));
    assert!(!err.is_retryable());

    // Same for reads and fast-forward
    assert!(matches!(
        p.full_identity_read("foo").await,
        Err(Error::Quorum { .. })
    ));
    assert!(matches!(
        p.fast_forward_increment("foo", Ballot::ZERO).await,
        Err(Error::Quorum { .. })
    ));
}

#[tokio::test]
async fn test_accept_quorum_uses_accepter_set() {
    let replicas = memory(3);
    let accepters: ReplicaSet = vec![
        replicas[0].clone() as Arc<dyn Acceptor>,
        down("down-0"),
        down("down-1"),
    ]
    .into_iter()
    .collect();

    let p = Proposer::new(1).with_replicas(set_of(&replicas), accepters);
    let err = p.propose("foo", &Update::Identity).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Quorum {
            phase: Phase::Accept,
            ..
        }
    ));
}

#[tokio::test]
async fn test_loser_sees_winners_ballot() {
    let replicas = memory(3);
    let p1 = proposer(1, &replicas);
    let p2 = proposer(2, &replicas);

    p2.clock().observe(Ballot::new(10, 0));
    let (_, winner) = p2
        .propose("foo", &Update::compare_and_set("", "p2"))
        .await
        .unwrap();

    let err = p1
        .propose("foo", &Update::compare_and_set("", "p1"))
        .await
        .unwrap_err();
    let seen = err.conflicting_ballot().unwrap();
    assert!(seen >= winner);

    // The retry starts above the conflict and sees the winner's value
    let (state, ballot) = p1
        .propose("foo", &Update::compare_and_set("", "p1"))
        .await
        .unwrap();
    assert_eq!(state, State::from_static(b"p2"));
    assert!(ballot > seen);
}

#[tokio::test]
async fn test_concurrent_proposers_serialize_increments() {
    let replicas = memory(3);
    let proposers: Vec<Arc<Proposer>> = (1..=4).map(|id| Arc::new(proposer(id, &replicas))).collect();
    let per_proposer = 10;

    let increment = Update::custom(|s: &State| {
        let n: u64 = std::str::from_utf8(s)
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(0);
        State::from((n + 1).to_string())
    });

    let mut handles = Vec::new();
    for p in &proposers {
        let p = p.clone();
        let increment = increment.clone();
        handles.push(tokio::spawn(async move {
            let mut done = 0;
            let mut conflicts = 0;
            while done < per_proposer {
                match p.propose("counter", &increment).await {
                    Ok(_) => done += 1,
                    Err(e) if e.is_retryable() => conflicts += 1,
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }
            conflicts
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let value = proposers[0].full_identity_read("counter").await.unwrap();
    assert_eq!(value, State::from((4 * per_proposer).to_string()));
}

#[tokio::test]
async fn test_full_identity_read_changes_nothing() {
    let replicas = memory(3);
    let p = proposer(1, &replicas);
    let (_, ballot) = p
        .propose("foo", &Update::compare_and_set("", "bar"))
        .await
        .unwrap();
    let snapshot = || -> Vec<_> {
        replicas
            .iter()
            .map(|r| {
                let reg = r.register("foo").unwrap_or_default();
                (reg.accepted, reg.value)
            })
            .collect()
    };
    let before = snapshot();
    assert!(before.iter().filter(|(accepted, _)| *accepted == ballot).count() >= 2);

    let first = p.full_identity_read("foo").await.unwrap();
    let second = p.full_identity_read("foo").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first, State::from_static(b"bar"));
    assert_eq!(snapshot(), before);
}

#[tokio::test]
async fn test_fast_forward_wins_past_contention() {
    let replicas = memory(3);
    let p = proposer(1, &replicas);
    p.propose("foo", &Update::compare_and_set("", "bar"))
        .await
        .unwrap();

    // A rogue round promised a far higher ballot on every replica
    let rogue = Ballot::new(5_000, 42);
    for r in &replicas {
        r.handle_prepare("foo", rogue);
    }
    let err = p.propose("foo", &Update::Identity).await.unwrap_err();
    assert_eq!(err.conflicting_ballot(), Some(rogue));

    let tombstone = Ballot::new(100, 7);
    let age = p.fast_forward_increment("foo", tombstone).await.unwrap();
    assert!(age > rogue);
    assert!(age > tombstone);

    let (state, ballot) = p.propose("foo", &Update::Identity).await.unwrap();
    assert_eq!(state, State::from_static(b"bar"));
    assert!(ballot > age);
}

#[tokio::test]
async fn test_removal_mid_round_keeps_majority() {
    let replicas = memory(3);
    let gate = Arc::new(Semaphore::new(0));
    let gated = Arc::new(Gated {
        inner: replicas[0].clone(),
        gate: gate.clone(),
    });
    let accepters: ReplicaSet = vec![
        gated as Arc<dyn Acceptor>,
        replicas[1].clone() as Arc<dyn Acceptor>,
        down("down-0"),
    ]
    .into_iter()
    .collect();

    let p = Arc::new(
        Proposer::new(1)
            .with_replicas(set_of(&replicas), accepters)
            .with_round_timeout(Duration::from_secs(5)),
    );

    let mut round = {
        let p = p.clone();
        tokio::spawn(async move { p.propose("foo", &Update::compare_and_set("", "bar")).await })
    };

    // Shrink the accepter set to a single member while the accept phase waits
    tokio::time::sleep(Duration::from_millis(50)).await;
    p.remove_accepter("mem-0").unwrap();
    p.remove_accepter("down-0").unwrap();
    assert_eq!(p.membership().accepters().len(), 1);

    // One acceptance is a majority of the new set but not of the round's snapshot
    assert!(tokio::time::timeout(Duration::from_millis(100), &mut round)
        .await
        .is_err());

    gate.add_permits(1);
    let (state, _) = round.await.unwrap().unwrap();
    assert_eq!(state, State::from_static(b"bar"));
}

#[tokio::test]
async fn test_membership_changes_apply_to_next_round() {
    let replicas = memory(3);
    let p = Proposer::new(1);
    for r in &replicas {
        p.add_preparer(r.clone()).unwrap();
        p.add_accepter(r.clone()).unwrap();
    }
    // Adding twice is a no-op
    p.add_accepter(replicas[0].clone()).unwrap();
    assert_eq!(p.membership().accepters().len(), 3);

    p.propose("foo", &Update::compare_and_set("", "bar"))
        .await
        .unwrap();

    let extra = Arc::new(MemoryAcceptor::new("mem-3"));
    p.add_accepter(extra.clone()).unwrap();
    p.propose("foo", &Update::Identity).await.unwrap();
    assert!(p.membership().accepters().contains("mem-3"));

    p.remove_preparer("mem-0").unwrap();
    p.remove_preparer("not-a-member").unwrap();
    assert_eq!(p.membership().preparers().len(), 2);
    assert_eq!(
        p.full_identity_read("foo").await.unwrap(),
        State::from_static(b"bar")
    );

    assert!(matches!(p.remove_accepter(""), Err(Error::InvalidEndpoint(_))));
    assert_eq!(p.membership().accepters().len(), 4);
}
