use crate::service::peer::Peer;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Registry of live peers keyed by remote address.
///
/// Every access goes through one lock. Iteration hands out a snapshot so no
/// caller holds the lock while doing network I/O.
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: RwLock<HashMap<String, Arc<Peer>>>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `peer`. A peer already stored under the same address is
    /// replaced and returned.
    pub fn add(&self, peer: Arc<Peer>) -> Option<Arc<Peer>> {
        let key = peer.key();
        let previous = self
            .peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), peer);
        debug!(peer = %key, replaced = previous.is_some(), "Peer added");
        previous
    }

    /// Remove `peer` if it is still the entry registered under its address.
    ///
    /// Removing a peer that is already gone, or that has been replaced by a
    /// newer connection from the same address, is a no-op.
    pub fn remove(&self, peer: &Arc<Peer>) -> bool {
        let key = peer.key();
        let mut peers = self.peers.write().unwrap_or_else(PoisonError::into_inner);
        match peers.get(&key) {
            Some(current) if Arc::ptr_eq(current, peer) => {
                peers.remove(&key);
                debug!(peer = %key, "Peer removed");
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, addr: &str) -> Option<Arc<Peer>> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(addr)
            .cloned()
    }

    /// Point-in-time number of registered peers.
    pub fn size(&self) -> usize {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Copy of the current peers; the lock is released on return.
    pub fn snapshot(&self) -> Vec<Arc<Peer>> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn authenticated_count(&self) -> usize {
        self.snapshot()
            .iter()
            .filter(|peer| peer.is_authenticated())
            .count()
    }
}
