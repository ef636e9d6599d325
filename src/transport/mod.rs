//! # Transport Layer
//!
//! The capability a connection exposes to the rest of the node: queue bytes
//! for writing, close, report the remote address.
//!
//! Inbound bytes never pass through this trait. Each connection task owns its
//! receive buffer and hands it to the codec directly, which is where peeking
//! and discarding happen.
//!
//! ## Implementations
//! - **TCP**: [`tcp::TcpTransport`], a write queue drained by a dedicated task

pub mod tcp;

use crate::error::Result;
use bytes::Bytes;
use std::fmt::Debug;
use std::net::SocketAddr;

/// Write/close handle for one connection.
pub trait Transport: Send + Sync + Debug {
    fn remote_addr(&self) -> SocketAddr;

    /// Queue a frame for writing. Never blocks.
    ///
    /// # Errors
    /// `ConnectionClosed` once the transport is closed, `TransportError` when
    /// the outbound queue is full.
    fn write(&self, frame: Bytes) -> Result<()>;

    /// Close the connection. Frames queued before the call are still flushed.
    /// Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;
}
