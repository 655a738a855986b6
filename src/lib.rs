//! # minicas
//!
//! A CASPaxos replicated register store:
//! - Leaderless, single-key linearizable updates
//! - Any number of stateless proposers
//! - Independent preparer and accepter sets, changeable at runtime
//! - HTTP between clients, proposers and acceptors
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//!   clients ── HTTP ──┐
//!                     │
//!        ┌────────────▼────────────┐
//!        │       Proposers         │
//!        │  ballot clock + rounds  │
//!        └──┬──────────┬───────────┤
//!   prepare │          │ accept    │
//!   ┌───────▼──┐  ┌────▼─────┐  ┌──▼───────┐
//!   │Acceptor 1│  │Acceptor 2│  │Acceptor 3│
//!   │ registers│  │ registers│  │ registers│
//!   └──────────┘  └──────────┘  └──────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start acceptors
//! ```bash
//! minicas-acceptor serve --id acc-1 --bind 0.0.0.0:8081
//! ```
//!
//! ### Start a proposer
//! ```bash
//! minicas-proposer serve \
//!   --bind 0.0.0.0:8080 \
//!   --preparers http://acc-1:8081,http://acc-2:8081,http://acc-3:8081 \
//!   --accepters http://acc-1:8081,http://acc-2:8081,http://acc-3:8081
//! ```
//!
//! ### Use the CLI
//! ```bash
//! minicas cas my-key --expect "" --set hello
//! minicas get my-key
//! minicas del my-key --expect hello
//! minicas add-accepter http://acc-4:8081
//! ```

pub mod acceptor;
pub mod common;
pub mod proposer;
pub mod protocol;

// Re-export commonly used types
pub use acceptor::{AcceptorServer, MemoryAcceptor};
pub use common::{Config, Error, Result};
pub use proposer::{ProposerClient, ProposerServer};
pub use protocol::{Ballot, Proposer, State, Update};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
