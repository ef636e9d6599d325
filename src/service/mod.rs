//! # Connection Service
//!
//! Peer bookkeeping and the server that drives connections.
//!
//! ## Components
//! - **Peer** / **PeerTable**: per-connection protocol state and the live registry
//! - **EventHandler**: boot/open/traffic/tick/close state machine
//! - **WorkerPool**: bounded dispatch off the connection tasks
//! - **Server**: listener, dialer, ticker and graceful shutdown

pub mod handler;
pub mod peer;
pub mod peer_table;
pub mod server;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;
