//! Proposer node
//!
//! Serves the client API over HTTP and drives CASPaxos rounds against
//! remote acceptors.

pub mod acceptor_client;
pub mod client;
pub mod http;
pub mod server;

pub use acceptor_client::{AcceptorClient, Endpoint};
pub use client::{ProposerClient, Versioned};
pub use server::ProposerServer;
