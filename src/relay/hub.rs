use axum::extract::ws::Utf8Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, trace};

pub type PeerId = u64;

/// The set of connected viewers, each with a bounded outbound queue.
///
/// Delivery never waits on a peer: a full queue skips the message for that
/// peer only, and a closed queue removes the peer.
pub struct RelayHub {
    peers: Mutex<HashMap<PeerId, mpsc::Sender<Utf8Bytes>>>,
    next_id: AtomicU64,
    queue: usize,
    skipped: AtomicU64,
}

impl RelayHub {
    pub fn new(queue: usize) -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue: queue.max(1),
            skipped: AtomicU64::new(0),
        }
    }

    /// Register a new viewer.
    pub fn join(&self) -> (PeerId, mpsc::Receiver<Utf8Bytes>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue);
        let count = {
            let mut peers = self.peers.lock();
            peers.insert(id, tx);
            peers.len()
        };
        info!("viewer {id} joined ({count} connected)");
        (id, rx)
    }

    pub fn leave(&self, id: PeerId) -> bool {
        let removed = self.peers.lock().remove(&id).is_some();
        if removed {
            info!("viewer {id} left");
        }
        removed
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }

    /// Messages not delivered because a peer's queue was full.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Forward a viewer's message to every other viewer. Never echoes.
    pub fn relay_from(&self, origin: PeerId, text: impl Into<Utf8Bytes>) -> usize {
        self.deliver(Some(origin), text.into())
    }

    /// Send to every viewer.
    pub fn broadcast(&self, text: impl Into<Utf8Bytes>) -> usize {
        self.deliver(None, text.into())
    }

    fn deliver(&self, origin: Option<PeerId>, text: Utf8Bytes) -> usize {
        let mut peers = self.peers.lock();
        let mut closed = Vec::new();
        let mut delivered = 0;
        for (&id, tx) in peers.iter() {
            if Some(id) == origin {
                continue;
            }
            match tx.try_send(text.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    trace!("viewer {id} is behind, skipping message");
                    self.skipped.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Closed(_)) => closed.push(id),
            }
        }
        for id in closed {
            peers.remove(&id);
            debug!("viewer {id} disconnected, removed");
        }
        delivered
    }
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new(8)
    }
}
