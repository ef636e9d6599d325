use crate::error::Result;
use crate::node::NodeId;
use crate::protocol::command::Command;
use crate::service::peer::Peer;
use secp256k1::PublicKey;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Protocol version written by this implementation
pub const PROTOCOL_VERSION: u8 = 0;

/// Magic number opening every frame
pub const MAGIC_NUMBER: u16 = 0x2424;

pub const MAGIC_NUMBER_SIZE: usize = 2;
pub const NONCE_SIZE: usize = 4;
pub const PROTOCOL_VERSION_SIZE: usize = 1;
pub const COMMAND_SIZE: usize = 1;
pub const SEQUENCE_SIZE: usize = 4;
pub const PAYLOAD_LENGTH_SIZE: usize = 2;
pub const SIGNATURE_SIZE: usize = 65;

pub const MAGIC_NUMBER_OFFSET: usize = 0;
pub const NONCE_OFFSET: usize = MAGIC_NUMBER_OFFSET + MAGIC_NUMBER_SIZE;
pub const PROTOCOL_VERSION_OFFSET: usize = NONCE_OFFSET + NONCE_SIZE;
pub const COMMAND_OFFSET: usize = PROTOCOL_VERSION_OFFSET + PROTOCOL_VERSION_SIZE;
pub const SEQUENCE_OFFSET: usize = COMMAND_OFFSET + COMMAND_SIZE;
pub const PAYLOAD_LENGTH_OFFSET: usize = SEQUENCE_OFFSET + SEQUENCE_SIZE;
pub const PAYLOAD_OFFSET: usize = PAYLOAD_LENGTH_OFFSET + PAYLOAD_LENGTH_SIZE;

/// Smallest possible frame: header plus signature, no payload, no padding
pub const PACKET_LENGTH_MIN: usize = PAYLOAD_OFFSET + SIGNATURE_SIZE;

/// Max allowed payload size
pub const MAX_PAYLOAD_SIZE: usize = 1030;

/// Exclusive upper bound on the random padding length
pub const MAX_PADDING: usize = 19;

/// Largest frame this implementation emits
pub const PACKET_LENGTH_MAX: usize = PACKET_LENGTH_MIN + MAX_PAYLOAD_SIZE + MAX_PADDING - 1;

/// Decrypted message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketBody {
    pub protocol: u8,
    pub command: u8,
    pub sequence: u32,
    pub payload: Vec<u8>,
}

impl PacketBody {
    pub fn new(command: Command, sequence: u32, payload: Vec<u8>) -> Self {
        Self {
            protocol: PROTOCOL_VERSION,
            command: command.into(),
            sequence,
            payload,
        }
    }

    /// Typed view of the command byte.
    pub fn command(&self) -> Result<Command> {
        Command::try_from(self.command)
    }
}

impl fmt::Display for PacketBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Protocol: {}, Command: {}, Sequence: {}, Payload: {}",
            self.protocol,
            self.command,
            self.sequence,
            hex::encode(&self.payload)
        )
    }
}

/// Result of decoding one frame: the body and the sender recovered from its signature.
#[derive(Debug, Clone)]
pub struct DecodedPacket {
    pub body: PacketBody,
    pub public_key: PublicKey,
    pub node_id: NodeId,
    /// Bytes consumed from the input buffer
    pub frame_len: usize,
}

/// A decoded packet bound to the connection it arrived on.
#[derive(Debug, Clone)]
pub struct IncomingPacket {
    pub body: PacketBody,
    pub public_key: PublicKey,
    pub node_id: NodeId,
    /// Back-reference to the connection; dead once the peer is closed and dropped
    pub peer: Weak<Peer>,
    pub received_at: Instant,
}

impl IncomingPacket {
    pub fn new(decoded: DecodedPacket, peer: &Arc<Peer>, received_at: Instant) -> Self {
        Self {
            body: decoded.body,
            public_key: decoded.public_key,
            node_id: decoded.node_id,
            peer: Arc::downgrade(peer),
            received_at,
        }
    }
}
