//! # Node Identity
//!
//! Identity types shared by the codec, the dispatcher and the server.
//!
//! - [`NodeId`]: BLAKE3-256 of a node's compressed public key. Used for both the
//!   local node and every remote sender recovered from a signature.
//! - [`Node`]: transient descriptor of a participant, built from the local
//!   identity at boot or from an announcement at runtime.
//! - [`Identity`]: the local key pair plus the chain state advertised to peers.

use crate::error::Result;
use crate::utils::crypto::{self, DIGEST_SIZE};
use secp256k1::{PublicKey, SecretKey};
use std::fmt;

/// Feature bit: sender is a validator
pub const FEATURE_VALIDATOR: u8 = 0;

/// Feature bit: sender is an indexer
pub const FEATURE_INDEXER: u8 = 1;

/// 32-byte node identifier derived from a public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId([u8; DIGEST_SIZE]);

impl NodeId {
    /// Derive the identifier for `public_key`.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Self(crypto::hash_data(&public_key.serialize()))
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({self})")
    }
}

/// Descriptor of a local or remote participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub public_key: PublicKey,
    /// Advertised listening port, 0 if unknown
    pub port: u16,
    pub is_validator: bool,
    pub is_indexer: bool,
    pub chain_height: u64,
    pub chain_version: u64,
}

impl Node {
    /// Bare descriptor for `public_key` with no features or chain state.
    pub fn new(public_key: PublicKey, port: u16) -> Self {
        Self {
            id: NodeId::from_public_key(&public_key),
            public_key,
            port,
            is_validator: false,
            is_indexer: false,
            chain_height: 0,
            chain_version: 0,
        }
    }

    /// Feature bitmask as sent in announcements.
    pub fn features(&self) -> u8 {
        let mut features = 0u8;
        if self.is_validator {
            features |= 1 << FEATURE_VALIDATOR;
        }
        if self.is_indexer {
            features |= 1 << FEATURE_INDEXER;
        }
        features
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ID= {}, Port= {}, IsValidator= {}, IsIndexer= {}, ChainHeight= {}, ChainVersion= {}",
            self.id,
            self.port,
            self.is_validator,
            self.is_indexer,
            self.chain_height,
            self.chain_version
        )
    }
}

/// Local node identity: key pair plus the chain state it advertises.
///
/// Keys are supplied by the caller; nothing here generates or persists them.
#[derive(Clone)]
pub struct Identity {
    secret_key: SecretKey,
    public_key: PublicKey,
    node_id: NodeId,
    pub chain_height: u64,
    pub chain_version: u64,
    pub is_validator: bool,
    pub is_indexer: bool,
}

impl Identity {
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = crypto::public_key_of(&secret_key);
        Self {
            secret_key,
            public_key,
            node_id: NodeId::from_public_key(&public_key),
            chain_height: 0,
            chain_version: 0,
            is_validator: false,
            is_indexer: false,
        }
    }

    /// Load an identity from a hex-encoded private key.
    pub fn from_hex(private_key: &str) -> Result<Self> {
        crypto::parse_secret_key(private_key).map(Self::from_secret_key)
    }

    /// Set the chain state surfaced by the blockchain collaborator.
    pub fn with_chain(mut self, height: u64, version: u64) -> Self {
        self.chain_height = height;
        self.chain_version = version;
        self
    }

    pub fn with_features(mut self, validator: bool, indexer: bool) -> Self {
        self.is_validator = validator;
        self.is_indexer = indexer;
        self
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Descriptor announced to peers when listening on `port`.
    pub fn local_node(&self, port: u16) -> Node {
        Node {
            id: self.node_id,
            public_key: self.public_key,
            port,
            is_validator: self.is_validator,
            is_indexer: self.is_indexer,
            chain_height: self.chain_height,
            chain_version: self.chain_version,
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("node_id", &self.node_id)
            .field("chain_height", &self.chain_height)
            .field("chain_version", &self.chain_version)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const KEY: &str = "1E99423A4ED27608A15A2616A2B0E9E52CED330AC530EDCC32C8FFC6A526AEDD";

    #[test]
    fn test_node_id_is_deterministic() {
        let identity = Identity::from_hex(KEY).unwrap();
        let again = Identity::from_hex(KEY).unwrap();
        assert_eq!(identity.node_id(), again.node_id());
        assert_eq!(
            identity.node_id(),
            NodeId::from_public_key(identity.public_key())
        );
        assert_eq!(identity.node_id().to_string().len(), 64);
    }

    #[test]
    fn test_features_bitmask() {
        let identity = Identity::from_hex(KEY).unwrap();
        let mut node = identity.local_node(9000);
        assert_eq!(node.features(), 0);

        node.is_validator = true;
        assert_eq!(node.features(), 0b01);

        node.is_indexer = true;
        assert_eq!(node.features(), 0b11);

        node.is_validator = false;
        assert_eq!(node.features(), 0b10);
    }

    #[test]
    fn test_local_node_carries_chain_state() {
        let identity = Identity::from_hex(KEY)
            .unwrap()
            .with_chain(233, 1)
            .with_features(false, true);
        let node = identity.local_node(123);

        assert_eq!(node.port, 123);
        assert_eq!(node.chain_height, 233);
        assert_eq!(node.chain_version, 1);
        assert!(node.is_indexer);
        assert!(!node.is_validator);
        assert_eq!(node.id, identity.node_id());
    }

    #[test]
    fn test_debug_hides_secret() {
        let identity = Identity::from_hex(KEY).unwrap();
        let rendered = format!("{identity:?}");
        assert!(!rendered.to_lowercase().contains(&KEY.to_lowercase()));
    }
}
