//! # Error Types
//!
//! Error handling for the peer-to-peer transport.
//!
//! Errors fall into four families, and the connection boundary treats each
//! one differently:
//!
//! - **Incomplete input**: fewer bytes buffered than a minimal frame. Not a
//!   failure; the connection waits for more bytes.
//! - **Protocol violations**: bad magic number, oversized declared payload,
//!   unrecoverable signature. Fatal to the connection.
//! - **Encoding failures**: signing errors while building a reply. Fatal to
//!   that reply only.
//! - **Resource inconsistencies**: traffic for a connection the peer table
//!   does not know. The connection is closed.
//!
//! Only boot-time failures (binding the listener, loading keys, reading the
//! configuration) ever escape to the process.
//!
//! ## Example Usage
//! ```rust
//! use p2p_transport::error::{ProtocolError, Result};
//!
//! fn parse_port(raw: &str) -> Result<u16> {
//!     raw.parse::<u16>()
//!         .map_err(|e| ProtocolError::ConfigError(format!("invalid port '{raw}': {e}")))
//! }
//!
//! assert!(parse_port("9000").is_ok());
//! assert!(parse_port("nine").is_err());
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Codec errors
    pub const ERR_INVALID_RECOVERY_HEADER: &str = "Invalid recoverable signature header byte";
    pub const ERR_PAYLOAD_TRUNCATED: &str = "Declared payload length exceeds frame body";
    pub const ERR_DIGEST_REJECTED: &str = "Digest rejected by signer";

    /// Key material errors
    pub const ERR_PRIVATE_KEY_HEX: &str = "Private key is not valid hex";
    pub const ERR_PRIVATE_KEY_RANGE: &str = "Private key is not a valid secp256k1 scalar";
    pub const ERR_PUBLIC_KEY_HEX: &str = "Public key is not valid hex";
    pub const ERR_PUBLIC_KEY_POINT: &str = "Public key is not a valid secp256k1 point";

    /// Connection errors
    pub const ERR_OUTBOUND_QUEUE_FULL: &str = "Outbound queue is full";
    pub const ERR_DISPATCH_QUEUE_CLOSED: &str = "Dispatch queue is closed";
}

/// Primary error type for all transport operations.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Not enough bytes buffered to hold a frame. Wait and retry.
    #[error("Incomplete packet")]
    IncompletePacket,

    #[error("Invalid magic number: 0x{0:04X}")]
    InvalidMagic(u16),

    #[error("Payload too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Signature recovery failed: {0}")]
    SignatureRecovery(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(u8),

    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProtocolError {
    /// True when the error only means "not enough bytes yet".
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ProtocolError::IncompletePacket)
    }

    /// True for errors that prove the remote end broke the wire protocol.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidMagic(_)
                | ProtocolError::OversizedPacket(_)
                | ProtocolError::MalformedPacket(_)
                | ProtocolError::SignatureRecovery(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
