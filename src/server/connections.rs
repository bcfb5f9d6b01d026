//! Live client registry and event fan-out.
//!
//! Telemetry ticks and acknowledgements are independent event streams that
//! share this one fan-out path. Delivery to each client is best-effort
//! through its bounded queue: a client that cannot drain its queue is
//! dropped from the set rather than delaying anyone else. Within one
//! client's queue, frames keep the order they were produced in.

use std::collections::HashMap;
use std::sync::Mutex;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique id for one connected client session.
pub type ClientId = Uuid;

/// Tracks connected clients and delivers outbound frames.
pub struct ConnectionManager {
    clients: Mutex<HashMap<ClientId, mpsc::Sender<String>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Add a client. Idempotent: re-registering an id replaces its queue.
    pub fn register(&self, id: ClientId, tx: mpsc::Sender<String>) {
        let mut clients = self.clients.lock().unwrap();
        clients.insert(id, tx);
        info!("client {id} connected ({} total)", clients.len());
    }

    /// Remove a client. Idempotent: unknown ids are a no-op.
    pub fn unregister(&self, id: ClientId) {
        let mut clients = self.clients.lock().unwrap();
        if clients.remove(&id).is_some() {
            info!("client {id} disconnected ({} remaining)", clients.len());
        }
    }

    /// Deliver `frame` to every connected client, best-effort.
    ///
    /// `try_send` never blocks the caller: a client with a full or closed
    /// queue is dropped from the set, and delivery to the others proceeds.
    pub fn broadcast(&self, frame: &str) {
        let mut clients = self.clients.lock().unwrap();
        let mut dropped = Vec::new();

        for (id, tx) in clients.iter() {
            match tx.try_send(frame.to_string()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("client {id}: send queue full, dropping client");
                    dropped.push(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("client {id}: queue closed, dropping client");
                    dropped.push(*id);
                }
            }
        }

        for id in dropped {
            clients.remove(&id);
        }
    }

    /// Deliver `frame` to one client only (error replies to the
    /// originator). Returns whether the client was still registered and
    /// its queue accepted the frame.
    pub fn send_to(&self, id: ClientId, frame: String) -> bool {
        let clients = self.clients.lock().unwrap();
        match clients.get(&id) {
            Some(tx) => tx.try_send(frame).is_ok(),
            None => false,
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_every_client() {
        let conn = ConnectionManager::new();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        conn.register(Uuid::new_v4(), tx_a);
        conn.register(Uuid::new_v4(), tx_b);

        conn.broadcast("tick");
        assert_eq!(rx_a.recv().await.unwrap(), "tick");
        assert_eq!(rx_b.recv().await.unwrap(), "tick");
    }

    #[tokio::test]
    async fn blocked_client_does_not_stall_the_others() {
        let conn = ConnectionManager::new();
        let (tx_slow, _rx_slow_kept_full) = mpsc::channel(1);
        let (tx_ok, mut rx_ok) = mpsc::channel(4);
        let slow = Uuid::new_v4();
        conn.register(slow, tx_slow);
        conn.register(Uuid::new_v4(), tx_ok);

        conn.broadcast("one"); // fills the slow client's queue
        conn.broadcast("two"); // overflows it → slow client dropped

        assert_eq!(rx_ok.recv().await.unwrap(), "one");
        assert_eq!(rx_ok.recv().await.unwrap(), "two");
        assert_eq!(conn.client_count(), 1, "the blocked client is gone");
        assert!(!conn.send_to(slow, "three".into()));
    }

    #[tokio::test]
    async fn frames_arrive_in_production_order() {
        let conn = ConnectionManager::new();
        let (tx, mut rx) = mpsc::channel(8);
        conn.register(Uuid::new_v4(), tx);

        for frame in ["a", "b", "c"] {
            conn.broadcast(frame);
        }
        assert_eq!(rx.recv().await.unwrap(), "a");
        assert_eq!(rx.recv().await.unwrap(), "b");
        assert_eq!(rx.recv().await.unwrap(), "c");
    }

    #[tokio::test]
    async fn register_and_unregister_are_idempotent() {
        let conn = ConnectionManager::new();
        let id = Uuid::new_v4();
        let (tx1, _rx1) = mpsc::channel(1);
        let (tx2, mut rx2) = mpsc::channel(1);

        conn.register(id, tx1);
        conn.register(id, tx2); // replaces the first queue
        assert_eq!(conn.client_count(), 1);

        conn.broadcast("x");
        assert_eq!(rx2.recv().await.unwrap(), "x");

        conn.unregister(id);
        conn.unregister(id);
        assert_eq!(conn.client_count(), 0);
    }

    #[tokio::test]
    async fn send_to_targets_one_client_only() {
        let conn = ConnectionManager::new();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let a = Uuid::new_v4();
        conn.register(a, tx_a);
        conn.register(Uuid::new_v4(), tx_b);

        assert!(conn.send_to(a, "private".into()));
        assert_eq!(rx_a.recv().await.unwrap(), "private");
        assert!(
            rx_b.try_recv().is_err(),
            "other clients must not see originator-only traffic"
        );
    }
}
