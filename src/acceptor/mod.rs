//! Acceptor node
//!
//! A passive register store exposing prepare and accept over HTTP. Values
//! live in memory only.

pub mod http;
pub mod server;
pub mod store;

pub use server::AcceptorServer;
pub use store::MemoryAcceptor;
