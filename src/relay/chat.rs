use log::{debug, warn};

use super::hub::{ConnectionId, SessionHub, Subscription};
use super::protocol::{chat_echo, chat_forward, chat_status};
use crate::database::Repository;

/// Person-to-person chat relay keyed by user id
#[derive(Clone)]
pub struct ChatRelay {
    hub: SessionHub<i64, String>,
    repository: Repository,
}

impl ChatRelay {
    pub fn new(repository: Repository) -> Self {
        Self {
            hub: SessionHub::new(),
            repository,
        }
    }

    /// Register `user_id` and tell `peer_id` the user is online
    pub fn connect(&self, user_id: i64, peer_id: i64) -> Subscription<String> {
        let subscription = self.hub.join(user_id);
        self.hub.broadcast(&peer_id, chat_status(user_id, true), None);
        debug!("User {} opened chat with {}", user_id, peer_id);
        subscription
    }

    /// Store a message, forward it to the peer and echo it to the sender
    ///
    /// Returns how many of the peer's connections received it. A storage
    /// failure is logged and does not stop delivery.
    pub async fn deliver(
        &self,
        user_id: i64,
        peer_id: i64,
        connection_id: ConnectionId,
        text: &str,
    ) -> usize {
        if let Err(e) = self.repository.insert_message(user_id, peer_id, None, text).await {
            warn!("Failed to store chat message {} -> {}: {}", user_id, peer_id, e);
        }

        let delivered = self.hub.broadcast(&peer_id, chat_forward(user_id, text), None);
        self.hub.send_to(&user_id, connection_id, chat_echo(text));
        delivered
    }

    /// Unregister a connection and tell the peer the user went offline
    pub fn disconnect(&self, user_id: i64, peer_id: i64, connection_id: ConnectionId) {
        self.hub.leave(&user_id, connection_id);
        self.hub.broadcast(&peer_id, chat_status(user_id, false), None);
        debug!("User {} closed chat with {}", user_id, peer_id);
    }

    pub fn is_online(&self, user_id: i64) -> bool {
        self.hub.is_connected(&user_id)
    }
}
