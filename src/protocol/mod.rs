//! CASPaxos core
//!
//! - Ballots and the per-proposer ballot clock
//! - Update functions applied to register values
//! - Copy-on-write preparer / accepter membership
//! - Majority fan-out with straggler abandonment
//! - The proposer driving prepare and accept rounds

pub mod acceptor;
pub mod ballot;
pub mod conflict;
pub mod membership;
pub mod proposer;
pub mod quorum;
pub mod update;

pub use acceptor::{AcceptReply, Acceptor, PrepareReply};
pub use ballot::{Age, Ballot, BallotClock};
pub use membership::{Membership, ReplicaSet, Role};
pub use proposer::Proposer;
pub use quorum::QuorumRound;
pub use update::{State, Update};
