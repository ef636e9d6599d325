//! P2P connection server.
//!
//! Owns the listener, the peer table, the dispatch workers and the metrics
//! for one node. Each accepted or dialed connection gets a reader task that
//! feeds [`EventHandler::on_traffic`]; writes go through the connection's
//! [`TcpTransport`] queue. A ticker drives [`EventHandler::on_tick`].

use crate::config::{NetworkConfig, SeedConfig, ServerConfig};
use crate::core::codec::{self, PacketCodec};
use crate::core::packet::PACKET_LENGTH_MAX;
use crate::error::{ProtocolError, Result};
use crate::node::{Identity, Node};
use crate::protocol::announcement::{encode_announcement, ANNOUNCEMENT_SEQUENCE};
use crate::protocol::dispatcher::Dispatcher;
use crate::service::handler::{Action, EventHandler};
use crate::service::peer::{Direction, Peer};
use crate::service::peer_table::PeerTable;
use crate::service::worker::WorkerPool;
use crate::transport::tcp::{TcpTransport, OUTBOUND_QUEUE_CAPACITY};
use crate::transport::Transport;
use crate::utils::crypto;
use crate::utils::metrics::Metrics;
use crate::utils::timeout::{with_timeout_error, CONNECT_TIMEOUT};
use bytes::BytesMut;
use secp256k1::PublicKey;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
    seeds: Vec<SeedConfig>,
    handler: Arc<EventHandler>,
    workers: WorkerPool,
}

impl Server {
    /// Bind the listener and start the dispatch workers.
    ///
    /// The port advertised to peers is the one actually bound, so binding to
    /// port 0 works.
    pub async fn bind(config: &NetworkConfig, identity: Identity) -> Result<Self> {
        let listener = TcpListener::bind(&config.server.address).await?;
        let local_addr = listener.local_addr()?;

        let identity = Arc::new(identity);
        let local_node = identity.local_node(local_addr.port());
        let metrics = Arc::new(Metrics::new());
        let peers = Arc::new(PeerTable::new());

        let dispatcher = Arc::new(Dispatcher::new(
            identity.clone(),
            local_node.clone(),
            metrics.clone(),
        ));
        let workers = WorkerPool::spawn(
            config.server.dispatch_workers,
            config.server.dispatch_queue,
            dispatcher,
        );

        let handler = Arc::new(EventHandler::new(
            identity,
            local_node,
            peers,
            workers.submitter(),
            metrics,
            config.server.auth_timeout,
        ));

        Ok(Self {
            listener,
            local_addr,
            config: config.server.clone(),
            seeds: config.node.seeds.clone(),
            handler,
            workers,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn local_node(&self) -> &Node {
        self.handler.local_node()
    }

    pub fn peers(&self) -> &Arc<PeerTable> {
        self.handler.peers()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        self.handler.metrics()
    }

    /// Dial `addr` and announce ourselves to the node holding `remote_key`.
    pub async fn connect(&self, addr: SocketAddr, remote_key: &PublicKey) -> Result<Arc<Peer>> {
        dial(self.handler.clone(), addr, *remote_key).await
    }

    /// Serve until Ctrl-C.
    pub async fn run(&self) -> Result<()> {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    let _ = tx.send(()).await;
                }
                Err(e) => {
                    error!(error = %e, "Cannot listen for Ctrl-C, running until killed");
                    std::future::pending::<()>().await;
                }
            }
        });
        self.run_with_shutdown(rx).await
    }

    /// Serve until a message arrives on `shutdown` or its sender is dropped.
    pub async fn run_with_shutdown(&self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        self.handler.on_boot(self.local_addr, self.config.multicore);
        self.dial_seeds();

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutdown signal received");
                    break;
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.accept(stream, addr),
                    Err(e) => warn!(error = %e, "Accept failed"),
                },

                _ = ticker.tick() => {
                    let evicted = self.handler.on_tick();
                    if evicted > 0 {
                        debug!(evicted, connected = self.peers().size(), "Peer sweep");
                    }
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    fn accept(&self, stream: TcpStream, addr: SocketAddr) {
        if self.peers().size() >= self.config.max_connections {
            self.metrics().connection_refused();
            warn!(peer = %addr, max = self.config.max_connections, "Connection limit reached, refusing");
            return;
        }

        if let Err(e) = spawn_connection(self.handler.clone(), stream, Direction::Inbound, None) {
            warn!(peer = %addr, error = %e, "Failed to set up connection");
        }
    }

    /// Dial every configured seed address in the background.
    fn dial_seeds(&self) {
        for seed in &self.seeds {
            let remote_key = match crypto::parse_public_key(&seed.public_key) {
                Ok(key) => key,
                Err(e) => {
                    warn!(seed = %seed.public_key, error = %e, "Skipping seed with invalid key");
                    continue;
                }
            };

            for addr in &seed.address {
                let Ok(addr) = addr.parse::<SocketAddr>() else {
                    warn!(%addr, "Skipping invalid seed address");
                    continue;
                };
                if addr == self.local_addr {
                    continue;
                }

                let handler = self.handler.clone();
                tokio::spawn(async move {
                    if let Err(e) = dial(handler, addr, remote_key).await {
                        warn!(peer = %addr, error = %e, "Failed to reach seed");
                    }
                });
            }
        }
    }

    async fn shutdown(&self) {
        let peers = self.peers().snapshot();
        info!(connected = peers.len(), "Closing peer connections");
        for peer in peers {
            peer.close();
        }

        self.workers.shutdown(self.config.shutdown_timeout).await;
        self.metrics().log_metrics();
        info!("P2P server stopped");
    }
}

#[instrument(skip(handler, remote_key))]
async fn dial(handler: Arc<EventHandler>, addr: SocketAddr, remote_key: PublicKey) -> Result<Arc<Peer>> {
    let stream = with_timeout_error(
        async { TcpStream::connect(addr).await.map_err(ProtocolError::from) },
        CONNECT_TIMEOUT,
    )
    .await?;
    let peer = spawn_connection(handler.clone(), stream, Direction::Outbound, Some(remote_key))?;

    let announcement = encode_announcement(handler.local_node(), ANNOUNCEMENT_SEQUENCE);
    let frame = codec::encode(handler.identity().secret_key(), &remote_key, &announcement)
        .inspect_err(|_| handler.metrics().encode_failure())?;
    let bytes = frame.len();
    peer.write(frame)?;
    handler.metrics().packet_sent(bytes as u64);

    info!(peer = %peer, "Announcement sent");
    Ok(peer)
}

fn spawn_connection(
    handler: Arc<EventHandler>,
    stream: TcpStream,
    direction: Direction,
    remote_key: Option<PublicKey>,
) -> Result<Arc<Peer>> {
    let (transport, reader) = TcpTransport::spawn(stream, OUTBOUND_QUEUE_CAPACITY)?;
    let (peer, codec) = handler.on_open(transport.clone(), direction, remote_key);
    tokio::spawn(read_loop(handler, peer.clone(), transport, reader, codec));
    Ok(peer)
}

async fn read_loop(
    handler: Arc<EventHandler>,
    peer: Arc<Peer>,
    transport: Arc<TcpTransport>,
    mut reader: OwnedReadHalf,
    mut codec: PacketCodec,
) {
    let addr = transport.remote_addr();
    let mut buffer = BytesMut::with_capacity(PACKET_LENGTH_MAX);

    let error = loop {
        tokio::select! {
            read = reader.read_buf(&mut buffer) => match read {
                Ok(0) => break None,
                Ok(_) => {
                    if handler.on_traffic(addr, &mut codec, &mut buffer).await == Action::Close {
                        break None;
                    }
                }
                Err(e) => break Some(ProtocolError::from(e)),
            },

            _ = transport.closed() => break None,
        }
    };

    peer.close();
    handler.on_close(&peer, error.as_ref());
}
