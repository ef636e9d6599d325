//! Announcement payload: the fixed 20-byte introduction a node sends to a peer.
//!
//! ```text
//! Offset  Size  Field
//! 0       1     Feature bitmask (bit 0 validator, bit 1 indexer)
//! 1       2     Advertised port, 0 if unknown
//! 3       8     Chain version
//! 11      8     Chain height
//! 19      1     Reserved
//! ```

use crate::core::packet::PacketBody;
use crate::error::{ProtocolError, Result};
use crate::node::{Node, FEATURE_INDEXER, FEATURE_VALIDATOR};
use crate::protocol::command::Command;
use bytes::{Buf, BufMut};
use secp256k1::PublicKey;

/// Size of an encoded announcement payload
pub const ANNOUNCEMENT_PAYLOAD_SIZE: usize = 20;

/// Bytes a decoder needs; the trailing reserved byte is optional
pub const ANNOUNCEMENT_PAYLOAD_MIN: usize = 19;

/// Sequence number used when a node introduces itself
pub const ANNOUNCEMENT_SEQUENCE: u32 = 1;

/// Sequence number used when echoing an announcement back
pub const ANNOUNCEMENT_REPLY_SEQUENCE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnouncementPayload {
    pub features: u8,
    pub port: u16,
    pub chain_version: u64,
    pub chain_height: u64,
}

impl AnnouncementPayload {
    pub fn from_node(node: &Node) -> Self {
        Self {
            features: node.features(),
            port: node.port,
            chain_version: node.chain_version,
            chain_height: node.chain_height,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(ANNOUNCEMENT_PAYLOAD_SIZE);
        payload.put_u8(self.features);
        payload.put_u16(self.port);
        payload.put_u64(self.chain_version);
        payload.put_u64(self.chain_height);
        payload.put_u8(0);
        payload
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < ANNOUNCEMENT_PAYLOAD_MIN {
            return Err(ProtocolError::InvalidPayload(format!(
                "announcement needs {ANNOUNCEMENT_PAYLOAD_MIN} bytes, got {}",
                payload.len()
            )));
        }

        let mut cursor = payload;
        Ok(Self {
            features: cursor.get_u8(),
            port: cursor.get_u16(),
            chain_version: cursor.get_u64(),
            chain_height: cursor.get_u64(),
        })
    }

    pub fn is_validator(&self) -> bool {
        self.features & (1 << FEATURE_VALIDATOR) != 0
    }

    pub fn is_indexer(&self) -> bool {
        self.features & (1 << FEATURE_INDEXER) != 0
    }

    /// Descriptor of the remote node that sent this announcement.
    pub fn into_node(self, public_key: PublicKey) -> Node {
        Node {
            port: self.port,
            is_validator: self.is_validator(),
            is_indexer: self.is_indexer(),
            chain_height: self.chain_height,
            chain_version: self.chain_version,
            ..Node::new(public_key, self.port)
        }
    }
}

/// Build the announcement body for `node`.
pub fn encode_announcement(node: &Node, sequence: u32) -> PacketBody {
    PacketBody::new(
        Command::Announcement,
        sequence,
        AnnouncementPayload::from_node(node).encode(),
    )
}
