use crate::core::codec;
use crate::core::packet::IncomingPacket;
use crate::error::Result;
use crate::node::{Identity, Node};
use crate::protocol::announcement::{
    encode_announcement, AnnouncementPayload, ANNOUNCEMENT_REPLY_SEQUENCE,
};
use crate::protocol::command::Command;
use crate::service::peer::Direction;
use crate::utils::metrics::Metrics;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// What the dispatcher did with a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Announcement answered with our own; `bytes` is the reply frame size
    Replied { remote: Node, bytes: usize },
    /// Announcement accepted without reply (answer to our own announcement)
    Accepted { remote: Node },
    /// Reserved command with no handler on this node
    Unhandled(Command),
    /// The connection closed before the packet was processed
    PeerGone,
}

/// Routes decoded packets by command and writes replies back to the sender.
pub struct Dispatcher {
    identity: Arc<Identity>,
    local_node: Node,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(identity: Arc<Identity>, local_node: Node, metrics: Arc<Metrics>) -> Self {
        Self {
            identity,
            local_node,
            metrics,
        }
    }

    pub fn local_node(&self) -> &Node {
        &self.local_node
    }

    #[instrument(skip(self, packet), fields(node = %packet.node_id, seq = packet.body.sequence))]
    pub fn dispatch(&self, packet: &IncomingPacket) -> Result<Outcome> {
        let command = packet.body.command()?;

        match command {
            Command::Announcement => self.on_announcement(packet),
            Command::Response | Command::Ping | Command::Pong | Command::GetBlock => {
                debug!(%command, "No handler for command");
                Ok(Outcome::Unhandled(command))
            }
        }
    }

    fn on_announcement(&self, packet: &IncomingPacket) -> Result<Outcome> {
        let remote = AnnouncementPayload::decode(&packet.body.payload)?.into_node(packet.public_key);
        info!(remote = %remote, "Announcement received");

        let Some(peer) = packet.peer.upgrade() else {
            debug!("Peer closed before announcement was processed");
            return Ok(Outcome::PeerGone);
        };

        // We announced first on connections we dialed; this is the answer.
        if peer.direction() == Direction::Outbound {
            return Ok(Outcome::Accepted { remote });
        }

        let reply = encode_announcement(&self.local_node, ANNOUNCEMENT_REPLY_SEQUENCE);
        let frame = codec::encode(self.identity.secret_key(), &packet.public_key, &reply)
            .inspect_err(|e| {
                self.metrics.encode_failure();
                error!(error = %e, remote = %remote.id, "Failed to encode announcement reply");
            })?;

        let bytes = frame.len();
        peer.write(frame)?;
        self.metrics.packet_sent(bytes as u64);
        debug!(peer = %peer, bytes, "Announcement reply queued");

        Ok(Outcome::Replied { remote, bytes })
    }
}
