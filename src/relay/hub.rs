/*!
 * In-memory fan-out hub.
 *
 * Maps a key (session id or user id) to the outbound queues of every
 * connection registered under it. Delivery is best effort: a queue whose
 * receiver is gone is dropped on the next send, nothing is buffered for
 * connections that join later.
 */

use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Identifies one connection across all keys of a hub
pub type ConnectionId = u64;

/// A connection's membership under one key
#[derive(Debug)]
pub struct Subscription<M> {
    pub connection_id: ConnectionId,
    /// Messages addressed to this connection
    pub receiver: UnboundedReceiver<M>,
}

type Subscribers<M> = HashMap<ConnectionId, UnboundedSender<M>>;

/// Key to connections mapping shared by all handlers
pub struct SessionHub<K, M> {
    subscribers: Arc<Mutex<HashMap<K, Subscribers<M>>>>,
    next_id: Arc<AtomicU64>,
}

impl<K, M> Clone for SessionHub<K, M> {
    fn clone(&self) -> Self {
        Self {
            subscribers: self.subscribers.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<K, M> Default for SessionHub<K, M>
where
    K: Eq + Hash + Clone + Debug,
    M: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, M> SessionHub<K, M>
where
    K: Eq + Hash + Clone + Debug,
    M: Clone,
{
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a new connection under `key`
    pub fn join(&self, key: K) -> Subscription<M> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut map = self.subscribers.lock();
        map.entry(key.clone()).or_default().insert(connection_id, sender);
        debug!(
            "Connection {} joined {:?} ({} subscribers)",
            connection_id,
            key,
            map.get(&key).map_or(0, HashMap::len)
        );

        Subscription {
            connection_id,
            receiver,
        }
    }

    /// Remove a connection; returns false when it was not registered
    pub fn leave(&self, key: &K, connection_id: ConnectionId) -> bool {
        let mut map = self.subscribers.lock();
        let Some(subscribers) = map.get_mut(key) else {
            return false;
        };

        let removed = subscribers.remove(&connection_id).is_some();
        if subscribers.is_empty() {
            map.remove(key);
        }
        if removed {
            debug!("Connection {} left {:?}", connection_id, key);
        }
        removed
    }

    /// Send `message` to every connection under `key` except `except`
    ///
    /// Returns the number of connections the message was queued for.
    pub fn broadcast(&self, key: &K, message: M, except: Option<ConnectionId>) -> usize {
        let mut map = self.subscribers.lock();
        let Some(subscribers) = map.get_mut(key) else {
            return 0;
        };

        let mut delivered = 0;
        subscribers.retain(|id, sender| {
            if Some(*id) == except {
                return true;
            }
            if sender.send(message.clone()).is_ok() {
                delivered += 1;
                true
            } else {
                debug!("Dropping closed connection {} from {:?}", id, key);
                false
            }
        });

        if subscribers.is_empty() {
            map.remove(key);
        }
        delivered
    }

    /// Send `message` to one connection; returns false if it is gone
    pub fn send_to(&self, key: &K, connection_id: ConnectionId, message: M) -> bool {
        let mut map = self.subscribers.lock();
        let Some(subscribers) = map.get_mut(key) else {
            return false;
        };
        let Some(sender) = subscribers.get(&connection_id) else {
            return false;
        };

        if sender.send(message).is_ok() {
            return true;
        }

        debug!("Dropping closed connection {} from {:?}", connection_id, key);
        subscribers.remove(&connection_id);
        if subscribers.is_empty() {
            map.remove(key);
        }
        false
    }

    /// Number of connections under `key`
    pub fn subscriber_count(&self, key: &K) -> usize {
        self.subscribers.lock().get(key).map_or(0, HashMap::len)
    }

    /// Whether any connection is registered under `key`
    pub fn is_connected(&self, key: &K) -> bool {
        self.subscriber_count(key) > 0
    }

    /// Keys with at least one connection
    pub fn active_keys(&self) -> Vec<K> {
        self.subscribers.lock().keys().cloned().collect()
    }

    /// Connections across all keys
    pub fn connection_count(&self) -> usize {
        self.subscribers.lock().values().map(HashMap::len).sum()
    }
}
