//! End-to-end scenarios over real TCP sockets

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::BytesMut;
use p2p_transport::config::NetworkConfig;
use p2p_transport::core::codec::{decode, encode};
use p2p_transport::core::packet::{DecodedPacket, PACKET_LENGTH_MIN};
use p2p_transport::node::Identity;
use p2p_transport::protocol::announcement::{
    encode_announcement, AnnouncementPayload, ANNOUNCEMENT_REPLY_SEQUENCE, ANNOUNCEMENT_SEQUENCE,
};
use p2p_transport::protocol::command::Command;
use p2p_transport::service::server::Server;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

const A_KEY: &str = "E9873D79C6D87DC0FB6A5778633389F4453213303DA61F20BD67FC233AA33262";
const B_KEY: &str = "1E99423A4ED27608A15A2616A2B0E9E52CED330AC530EDCC32C8FFC6A526AEDD";

struct Running {
    server: Arc<Server>,
    shutdown: mpsc::Sender<()>,
    handle: JoinHandle<p2p_transport::Result<()>>,
}

impl Running {
    async fn stop(self) {
        self.shutdown.send(()).await.unwrap();
        timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server stops")
            .unwrap()
            .unwrap();
    }
}

async fn start(key: &str, mutate: impl FnOnce(&mut NetworkConfig)) -> Running {
    let mut config = NetworkConfig::default_with_overrides(|c| {
        c.server.address = "127.0.0.1:0".to_string();
        c.node.private_key = key.to_string();
    });
    mutate(&mut config);

    let identity = Identity::from_hex(key)
        .unwrap()
        .with_chain(config.node.chain_height, config.node.chain_version);
    let server = Arc::new(Server::bind(&config, identity).await.unwrap());
    let (shutdown, rx) = mpsc::channel(1);
    let handle = tokio::spawn({
        let server = server.clone();
        async move { server.run_with_shutdown(rx).await }
    });

    Running {
        server,
        shutdown,
        handle,
    }
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Read until the buffered bytes decode as one frame addressed to `receiver`.
async fn read_frame(stream: &mut TcpStream, receiver: &Identity) -> DecodedPacket {
    let mut buffer = BytesMut::new();
    timeout(Duration::from_secs(5), async {
        loop {
            let n = stream.read_buf(&mut buffer).await.unwrap();
            assert!(n > 0, "connection closed before a frame arrived");
            if buffer.len() >= PACKET_LENGTH_MIN {
                if let Ok(packet) = decode(&mut buffer.clone(), receiver.public_key()) {
                    return packet;
                }
            }
        }
    })
    .await
    .expect("frame within timeout")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn announcement_is_answered_with_local_node() {
    let node_b = start(B_KEY, |c| c.node.chain_height = 77).await;
    let a = Identity::from_hex(A_KEY).unwrap().with_chain(233, 1);
    let b = Identity::from_hex(B_KEY).unwrap();

    let mut stream = TcpStream::connect(node_b.server.local_addr()).await.unwrap();
    let body = encode_announcement(&a.local_node(123), ANNOUNCEMENT_SEQUENCE);
    let frame = encode(a.secret_key(), b.public_key(), &body).unwrap();
    stream.write_all(&frame).await.unwrap();

    let reply = read_frame(&mut stream, &a).await;
    assert_eq!(reply.public_key, *b.public_key());
    assert_eq!(reply.node_id, b.node_id());
    assert_eq!(reply.body.command().unwrap(), Command::Announcement);
    assert_eq!(reply.body.sequence, ANNOUNCEMENT_REPLY_SEQUENCE);

    let announced = AnnouncementPayload::decode(&reply.body.payload).unwrap();
    assert_eq!(announced.port, node_b.server.local_addr().port());
    assert_eq!(announced.chain_height, 77);

    let peers = node_b.server.peers().clone();
    assert_eq!(peers.size(), 1);
    assert_eq!(peers.authenticated_count(), 1);

    let metrics = node_b.server.metrics().snapshot();
    assert_eq!(metrics.packets_received, 1);
    assert_eq!(metrics.peers_authenticated, 1);

    drop(stream);
    assert!(eventually(|| peers.is_empty()).await);
    node_b.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn outbound_connect_authenticates_both_sides() {
    let node_a = start(A_KEY, |_| {}).await;
    let node_b = start(B_KEY, |_| {}).await;
    let b = Identity::from_hex(B_KEY).unwrap();

    let peer = node_a
        .server
        .connect(node_b.server.local_addr(), b.public_key())
        .await
        .unwrap();

    assert!(eventually(|| peer.is_authenticated()).await);
    let b_peers = node_b.server.peers();
    assert!(eventually(|| b_peers.authenticated_count() == 1).await);

    // One announcement each way; the outbound side does not echo
    sleep(Duration::from_millis(100)).await;
    assert_eq!(node_a.server.metrics().snapshot().packets_sent, 1);
    assert_eq!(node_b.server.metrics().snapshot().packets_sent, 1);

    node_a.stop().await;
    node_b.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn silent_remote_leaves_peer_unauthenticated() {
    let node_a = start(A_KEY, |_| {}).await;
    let b = Identity::from_hex(B_KEY).unwrap();

    let silent = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let silent_addr = silent.local_addr().unwrap();
    let holder = tokio::spawn(async move {
        let (stream, _) = silent.accept().await.unwrap();
        sleep(Duration::from_secs(2)).await;
        drop(stream);
    });

    let peer = node_a.server.connect(silent_addr, b.public_key()).await.unwrap();
    sleep(Duration::from_millis(300)).await;
    assert!(!peer.is_authenticated());
    assert_eq!(node_a.server.peers().size(), 1);

    holder.abort();
    node_a.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unauthenticated_peer_gets_timeout_notice() {
    let node_b = start(B_KEY, |c| {
        c.server.auth_timeout = Duration::from_millis(200);
        c.server.tick_interval = Duration::from_millis(50);
    })
    .await;

    let mut stream = TcpStream::connect(node_b.server.local_addr()).await.unwrap();
    let mut received = Vec::new();
    timeout(Duration::from_secs(5), stream.read_to_end(&mut received))
        .await
        .expect("connection closed by server")
        .unwrap();

    assert_eq!(received, b"Timeout");
    let server = &node_b.server;
    assert!(
        eventually(|| {
            server.peers().is_empty() && server.metrics().snapshot().peers_evicted == 1
        })
        .await
    );
    node_b.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn garbage_closes_connection() {
    let node_b = start(B_KEY, |_| {}).await;

    let mut stream = TcpStream::connect(node_b.server.local_addr()).await.unwrap();
    stream.write_all(&[0xAB; 128]).await.unwrap();

    let mut received = Vec::new();
    let read = timeout(Duration::from_secs(5), stream.read_to_end(&mut received))
        .await
        .expect("connection closed by server");
    assert!(read.is_err() || received.is_empty());
    assert_eq!(node_b.server.metrics().snapshot().protocol_errors, 1);
    node_b.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn connections_beyond_limit_are_refused() {
    let node_b = start(B_KEY, |c| c.server.max_connections = 1).await;
    let addr = node_b.server.local_addr();

    let _first = TcpStream::connect(addr).await.unwrap();
    let peers = node_b.server.peers().clone();
    assert!(eventually(|| peers.size() == 1).await);

    let mut second = TcpStream::connect(addr).await.unwrap();
    let mut received = Vec::new();
    let read = timeout(Duration::from_secs(5), second.read_to_end(&mut received))
        .await
        .expect("refused connection is closed");
    assert!(read.is_err() || received.is_empty());
    assert_eq!(node_b.server.metrics().snapshot().connections_refused, 1);
    assert_eq!(peers.size(), 1);

    node_b.stop().await;
}
