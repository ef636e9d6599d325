//! In-memory transport for unit tests.

use crate::error::{ProtocolError, Result};
use crate::transport::Transport;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub struct MockTransport {
    addr: SocketAddr,
    written: Mutex<Vec<Bytes>>,
    closed: AtomicBool,
}

impl MockTransport {
    #[allow(clippy::expect_used)]
    pub fn new(addr: &str) -> Arc<Self> {
        Arc::new(Self {
            addr: addr.parse().expect("test address"),
            written: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    #[allow(clippy::unwrap_used)]
    pub fn written(&self) -> Vec<Bytes> {
        self.written.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    fn remote_addr(&self) -> SocketAddr {
        self.addr
    }

    #[allow(clippy::unwrap_used)]
    fn write(&self, frame: Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }
        self.written.lock().unwrap().push(frame);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
