//! TCP transport.
//!
//! A [`TcpStream`] is split in two: the read half goes back to the caller's
//! connection loop, the write half is owned by a writer task fed through a
//! bounded queue. Closing cancels the writer, which flushes what is already
//! queued and shuts the socket down.

use crate::error::{constants, ProtocolError, Result};
use crate::transport::Transport;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Default number of frames that may wait in a connection's outbound queue
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

#[derive(Debug)]
pub struct TcpTransport {
    remote_addr: SocketAddr,
    outbound: mpsc::Sender<Bytes>,
    closed: CancellationToken,
}

impl TcpTransport {
    /// Split `stream` and start its writer task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        stream: TcpStream,
        queue_capacity: usize,
    ) -> Result<(Arc<Self>, OwnedReadHalf)> {
        let remote_addr = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();

        let (outbound, queue) = mpsc::channel(queue_capacity.max(1));
        let closed = CancellationToken::new();
        tokio::spawn(write_loop(writer, queue, closed.clone(), remote_addr));

        Ok((
            Arc::new(Self {
                remote_addr,
                outbound,
                closed,
            }),
            reader,
        ))
    }

    /// Resolves once the transport has been closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

impl Transport for TcpTransport {
    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    fn write(&self, frame: Bytes) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(ProtocolError::ConnectionClosed);
        }
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                ProtocolError::TransportError(constants::ERR_OUTBOUND_QUEUE_FULL.into())
            }
            mpsc::error::TrySendError::Closed(_) => ProtocolError::ConnectionClosed,
        })
    }

    fn close(&self) {
        self.closed.cancel();
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[instrument(skip(writer, queue, closed), fields(peer = %remote_addr))]
async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut queue: mpsc::Receiver<Bytes>,
    closed: CancellationToken,
    remote_addr: SocketAddr,
) {
    loop {
        tokio::select! {
            biased;

            frame = queue.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = writer.write_all(&frame).await {
                        debug!(error = %e, "Write failed, closing transport");
                        closed.cancel();
                        return;
                    }
                }
                None => break,
            },

            _ = closed.cancelled() => {
                while let Ok(frame) = queue.try_recv() {
                    if writer.write_all(&frame).await.is_err() {
                        break;
                    }
                }
                break;
            }
        }
    }

    closed.cancel();
    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "Socket shutdown failed");
    }
}
