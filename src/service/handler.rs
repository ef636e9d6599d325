//! Connection event state machine.
//!
//! The server's I/O loops report lifecycle and traffic events here:
//!
//! ```text
//! boot -> listening
//! open -> (traffic)* -> close            per connection
//! tick                                   periodic, all peers
//! ```
//!
//! Handlers never block on another connection. Decoded packets are handed to
//! the dispatch workers; the only wait is for room in the bounded work queue.

use crate::core::codec::PacketCodec;
use crate::core::packet::IncomingPacket;
use crate::error::{constants, ProtocolError};
use crate::node::{Identity, Node};
use crate::protocol::command::Command;
use crate::service::peer::{Direction, Peer};
use crate::service::peer_table::PeerTable;
use crate::transport::Transport;
use crate::utils::metrics::Metrics;
use bytes::{Bytes, BytesMut};
use secp256k1::PublicKey;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;
use tracing::{debug, info, instrument, warn};

/// Notice sent to a peer evicted for not authenticating in time
pub const TIMEOUT_NOTICE: &[u8] = b"Timeout";

/// What the I/O loop should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Close,
}

pub struct EventHandler {
    identity: Arc<Identity>,
    local_node: Node,
    peers: Arc<PeerTable>,
    work: mpsc::Sender<IncomingPacket>,
    metrics: Arc<Metrics>,
    auth_timeout: Duration,
}

impl EventHandler {
    pub fn new(
        identity: Arc<Identity>,
        local_node: Node,
        peers: Arc<PeerTable>,
        work: mpsc::Sender<IncomingPacket>,
        metrics: Arc<Metrics>,
        auth_timeout: Duration,
    ) -> Self {
        Self {
            identity,
            local_node,
            peers,
            work,
            metrics,
            auth_timeout,
        }
    }

    pub fn on_boot(&self, listen_addr: SocketAddr, multicore: bool) {
        info!(
            public_key = %hex::encode_upper(self.local_node.public_key.serialize()),
            node_id = %self.local_node.id,
            "Local node identity"
        );
        info!(%listen_addr, multicore, "P2P server listening");
    }

    /// Register a new connection and create its decode context.
    ///
    /// `remote_key` pins the sender of every packet on a dialed connection.
    #[instrument(skip(self, transport, remote_key), fields(peer = %transport.remote_addr()))]
    pub fn on_open(
        &self,
        transport: Arc<dyn Transport>,
        direction: Direction,
        remote_key: Option<PublicKey>,
    ) -> (Arc<Peer>, PacketCodec) {
        let mut peer = Peer::new(transport, direction);
        if let Some(key) = remote_key {
            peer = peer.expecting(key);
        }
        let peer = Arc::new(peer);
        if let Some(previous) = self.peers.add(peer.clone()) {
            debug!("Replaced stale peer with the same address");
            previous.close();
        }
        self.metrics.connection_established();
        debug!(?direction, connected = self.peers.size(), "Connection opened");

        (peer, PacketCodec::new(&self.identity))
    }

    /// Attempt one decode of the bytes buffered for `addr`.
    ///
    /// Safe to call repeatedly while a frame is still arriving: an incomplete
    /// buffer is left untouched.
    pub async fn on_traffic(
        &self,
        addr: SocketAddr,
        codec: &mut PacketCodec,
        buffer: &mut BytesMut,
    ) -> Action {
        let key = addr.to_string();
        let Some(peer) = self.peers.get(&key) else {
            let e = ProtocolError::PeerNotFound(key);
            warn!(error = %e, "Traffic from unregistered connection, closing");
            return Action::Close;
        };

        let decoded = match codec.decode(buffer) {
            Ok(Some(decoded)) => decoded,
            Ok(None) => {
                debug!(peer = %addr, buffered = buffer.len(), "Waiting for more bytes");
                return Action::None;
            }
            Err(e) => {
                self.metrics.protocol_error();
                warn!(peer = %addr, error = %e, "Invalid packet, closing");
                return Action::Close;
            }
        };

        if peer.remote_key().is_some_and(|key| *key != decoded.public_key) {
            self.metrics.protocol_error();
            warn!(
                peer = %addr,
                node = %decoded.node_id,
                "Packet signed by a node we did not dial, closing"
            );
            return Action::Close;
        }

        peer.touch();
        self.metrics.packet_received(decoded.frame_len as u64);
        debug!(peer = %addr, body = %decoded.body, node = %decoded.node_id, "Packet decoded");

        if decoded.body.command == u8::from(Command::Announcement) && peer.authenticate() {
            self.metrics.peer_authenticated();
            info!(peer = %addr, node = %decoded.node_id, "Peer authenticated");
        }

        let packet = IncomingPacket::new(decoded, &peer, Instant::now());
        if self.work.send(packet).await.is_err() {
            warn!(peer = %addr, "{}, packet dropped", constants::ERR_DISPATCH_QUEUE_CLOSED);
        }
        Action::None
    }

    /// Evict peers that failed to authenticate in time. Returns how many were
    /// evicted.
    pub fn on_tick(&self) -> usize {
        let mut evicted = 0;

        for peer in self.peers.snapshot() {
            if peer.auth_expired(self.auth_timeout) {
                if let Err(e) = peer.write(Bytes::from_static(TIMEOUT_NOTICE)) {
                    debug!(peer = %peer, error = %e, "Could not send timeout notice");
                }
            }
            if !peer.should_maintain(self.auth_timeout) {
                info!(peer = %peer, "Closing connection for authentication timeout");
                peer.close();
                self.metrics.peer_evicted();
                evicted += 1;
            }
        }

        evicted
    }

    pub fn on_close(&self, peer: &Arc<Peer>, error: Option<&ProtocolError>) {
        match error {
            Some(e) => debug!(peer = %peer, error = %e, "Connection closed with error"),
            None => debug!(peer = %peer, "Connection closed"),
        }
        if self.peers.remove(peer) {
            self.metrics.connection_closed();
        }
        debug!(connected = self.peers.size(), "Peer count");
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn local_node(&self) -> &Node {
        &self.local_node
    }

    pub fn peers(&self) -> &Arc<PeerTable> {
        &self.peers
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}
