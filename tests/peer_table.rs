//! Concurrency tests for the peer table

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::Bytes;
use p2p_transport::error::Result;
use p2p_transport::service::peer::{Direction, Peer};
use p2p_transport::service::peer_table::PeerTable;
use p2p_transport::transport::Transport;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

#[derive(Debug)]
struct NullTransport {
    addr: SocketAddr,
    closed: AtomicBool,
}

impl Transport for NullTransport {
    fn remote_addr(&self) -> SocketAddr {
        self.addr
    }

    fn write(&self, _frame: Bytes) -> Result<()> {
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn peer(port: u16) -> Arc<Peer> {
    let transport = Arc::new(NullTransport {
        addr: SocketAddr::from(([10, 0, 0, 1], port)),
        closed: AtomicBool::new(false),
    });
    Arc::new(Peer::new(transport, Direction::Inbound))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_add_remove_keeps_table_consistent() {
    let table = Arc::new(PeerTable::new());
    let mut tasks = JoinSet::new();

    for worker in 0..8u16 {
        let table = table.clone();
        tasks.spawn(async move {
            for i in 0..250u16 {
                let peer = peer(worker * 1000 + i);
                table.add(peer.clone());
                if i % 2 == 0 {
                    assert!(table.remove(&peer));
                }
                let _ = table.size();
                let _ = table.snapshot();
            }
        });
    }

    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }

    assert_eq!(table.size(), 8 * 125);
    assert_eq!(table.snapshot().len(), 8 * 125);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_adds_then_removes_empty_the_table() {
    let table = Arc::new(PeerTable::new());
    let peers: Vec<_> = (0..512).map(peer).collect();

    let mut adds = JoinSet::new();
    for p in peers.iter().cloned() {
        let table = table.clone();
        adds.spawn(async move { table.add(p) });
    }
    while let Some(res) = adds.join_next().await {
        assert!(res.unwrap().is_none());
    }
    assert_eq!(table.size(), peers.len());

    let mut removes = JoinSet::new();
    for p in peers {
        let table = table.clone();
        removes.spawn(async move { table.remove(&p) });
    }
    while let Some(res) = removes.join_next().await {
        assert!(res.unwrap());
    }
    assert_eq!(table.size(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn same_address_churn_stays_consistent() {
    let table = Arc::new(PeerTable::new());
    let mut tasks = JoinSet::new();

    for _ in 0..8 {
        let table = table.clone();
        tasks.spawn(async move {
            for _ in 0..200 {
                let p = peer(7000);
                table.add(p.clone());
                table.remove(&p);
            }
        });
    }
    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }

    assert!(table.size() <= 1);
    assert_eq!(table.size(), table.snapshot().len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sweeping_a_snapshot_while_peers_churn() {
    let table = Arc::new(PeerTable::new());
    for port in 0..100 {
        table.add(peer(port));
    }

    let churn = {
        let table = table.clone();
        tokio::spawn(async move {
            for port in 100..600 {
                table.add(peer(port));
                tokio::task::yield_now().await;
            }
        })
    };

    // Each sweep closes stale unauthenticated peers, the way the tick does
    for _ in 0..20 {
        for peer in table.snapshot() {
            if !peer.should_maintain(Duration::ZERO) {
                table.remove(&peer);
            }
        }
        tokio::task::yield_now().await;
    }

    churn.await.unwrap();
    tokio::time::sleep(Duration::from_millis(2)).await;
    for peer in table.snapshot() {
        if !peer.should_maintain(Duration::ZERO) {
            table.remove(&peer);
        }
    }
    assert!(table.is_empty());
}

#[test]
fn authenticated_count_tracks_flags() {
    let table = PeerTable::new();
    let peers: Vec<_> = (0..10).map(peer).collect();
    for p in &peers {
        table.add(p.clone());
    }
    for p in peers.iter().take(3) {
        p.authenticate();
    }
    assert_eq!(table.authenticated_count(), 3);
}
