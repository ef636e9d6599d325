//! # P2P Transport
//!
//! Peer-to-peer transport for a blockchain node: an encrypted, signed packet
//! codec, a registry of connected peers, and a TCP server that authenticates
//! peers through an announcement exchange.
//!
//! ## Layers
//! - [`core`]: wire format and codec
//! - [`protocol`]: commands, announcement payload, dispatcher
//! - [`transport`]: write/close capability over a connection
//! - [`service`]: peers, event handler, worker pool, server
//! - [`node`]: node descriptors and the local identity
//!
//! ## Example
//! ```no_run
//! use p2p_transport::config::NetworkConfig;
//! use p2p_transport::node::Identity;
//! use p2p_transport::service::server::Server;
//!
//! # async fn run() -> p2p_transport::error::Result<()> {
//! let config = NetworkConfig::from_file("p2p.toml")?;
//! let identity = Identity::from_hex(&config.node.private_key)?
//!     .with_chain(config.node.chain_height, config.node.chain_version);
//! let server = Server::bind(&config, identity).await?;
//! server.run().await
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod node;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use error::{ProtocolError, Result};
