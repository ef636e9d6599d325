use crate::error::Result;
use crate::transport::Transport;
use bytes::Bytes;
use secp256k1::PublicKey;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Which side opened the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Accepted by our listener
    Inbound,
    /// Dialed by us
    Outbound,
}

/// Protocol state layered over one transport connection.
#[derive(Debug)]
pub struct Peer {
    transport: Arc<dyn Transport>,
    direction: Direction,
    connection_time: Instant,
    last_seen: Mutex<Instant>,
    authenticated: AtomicBool,
    remote_key: Option<PublicKey>,
}

impl Peer {
    pub fn new(transport: Arc<dyn Transport>, direction: Direction) -> Self {
        Self::with_connection_time(transport, direction, Instant::now())
    }

    pub fn with_connection_time(
        transport: Arc<dyn Transport>,
        direction: Direction,
        connection_time: Instant,
    ) -> Self {
        Self {
            transport,
            direction,
            connection_time,
            last_seen: Mutex::new(connection_time),
            authenticated: AtomicBool::new(false),
            remote_key: None,
        }
    }

    /// Only accept traffic signed by `remote_key`. Set on dialed peers.
    pub fn expecting(mut self, remote_key: PublicKey) -> Self {
        self.remote_key = Some(remote_key);
        self
    }

    /// Key of the node we dialed, if any.
    pub fn remote_key(&self) -> Option<&PublicKey> {
        self.remote_key.as_ref()
    }

    /// Table key for this peer.
    pub fn key(&self) -> String {
        self.remote_addr().to_string()
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.transport.remote_addr()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn connection_time(&self) -> Instant {
        self.connection_time
    }

    pub fn last_seen(&self) -> Instant {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record activity on the connection.
    pub fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    /// Mark the peer authenticated. Returns true only on the first call.
    pub fn authenticate(&self) -> bool {
        !self.authenticated.swap(true, Ordering::AcqRel)
    }

    /// True when the peer is still unauthenticated after `auth_timeout`.
    pub fn auth_expired(&self, auth_timeout: Duration) -> bool {
        !self.is_authenticated() && self.connection_time.elapsed() > auth_timeout
    }

    /// Eviction policy: closes the connection and returns false once the peer
    /// has stayed unauthenticated for longer than `auth_timeout`.
    pub fn should_maintain(&self, auth_timeout: Duration) -> bool {
        if self.auth_expired(auth_timeout) {
            debug!(peer = %self, "Authentication window elapsed");
            self.transport.close();
            return false;
        }
        true
    }

    pub fn write(&self, frame: Bytes) -> Result<()> {
        self.transport.write(frame)
    }

    pub fn close(&self) {
        self.transport.close();
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.remote_addr())
    }
}
