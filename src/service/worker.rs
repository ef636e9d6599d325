//! Bounded pool of dispatch workers.
//!
//! Connection tasks submit decoded packets through a bounded queue and return
//! to reading; a fixed number of workers pull packets off the queue and run
//! the dispatcher. A full queue makes the submitting connection wait, which
//! throttles that connection only.

use crate::core::packet::IncomingPacket;
use crate::protocol::dispatcher::Dispatcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

pub struct WorkerPool {
    sender: mpsc::Sender<IncomingPacket>,
    handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Start `workers` tasks sharing a queue of `capacity` packets.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(workers: usize, capacity: usize, dispatcher: Arc<Dispatcher>) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let shutdown = CancellationToken::new();

        let handles = (0..workers.max(1))
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    receiver.clone(),
                    dispatcher.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();

        Self {
            sender,
            handles: std::sync::Mutex::new(handles),
            shutdown,
        }
    }

    /// Handle used by connection tasks to submit work.
    pub fn submitter(&self) -> mpsc::Sender<IncomingPacket> {
        self.sender.clone()
    }

    /// Stop the workers after the queued packets are processed, waiting at
    /// most `timeout` before aborting them.
    pub async fn shutdown(&self, timeout: Duration) {
        self.shutdown.cancel();

        let handles = std::mem::take(
            &mut *self
                .handles
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();

        if tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!("Dispatch workers did not finish in time, aborting");
            aborts.iter().for_each(|handle| handle.abort());
        }
    }
}

#[instrument(skip(receiver, dispatcher, shutdown))]
async fn worker_loop(
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<IncomingPacket>>>,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) {
    loop {
        let packet = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                biased;
                packet = receiver.recv() => packet,
                _ = shutdown.cancelled() => receiver.try_recv().ok(),
            }
        };

        let Some(packet) = packet else {
            debug!("Dispatch worker stopping");
            return;
        };
        process(&dispatcher, &packet);
    }
}

fn process(dispatcher: &Dispatcher, packet: &IncomingPacket) {
    match dispatcher.dispatch(packet) {
        Ok(outcome) => debug!(?outcome, "Packet dispatched"),
        Err(e) => warn!(node = %packet.node_id, error = %e, "Packet dispatch failed"),
    }
}
