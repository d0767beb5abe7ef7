//! State Broadcaster: per-topic subscriber registry.
//!
//! A topic is a waiting-room id or session id. Publishing delivers to
//! every subscribed transport via its actor mailbox; mailbox order
//! preserves mutation order per subscriber, and distinct mutations are
//! never coalesced.

use actix::prelude::*;
use dashmap::DashMap;
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct Outbound(pub ServerMsg);

#[derive(Default)]
pub struct SessionHub {
    topics: DashMap<Uuid, DashMap<Uuid, Recipient<Outbound>>>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
        }
    }

    pub fn subscribe(&self, topic: Uuid, conn_id: Uuid, recipient: Recipient<Outbound>) {
        self.topics
            .entry(topic)
            .or_default()
            .insert(conn_id, recipient);
    }

    pub fn unsubscribe(&self, topic: Uuid, conn_id: Uuid) {
        if let Some(subscribers) = self.topics.get(&topic) {
            subscribers.remove(&conn_id);
        }
    }

    pub fn unsubscribe_all(&self, conn_id: Uuid) {
        for subscribers in self.topics.iter() {
            subscribers.remove(&conn_id);
        }
    }

    pub fn drop_topic(&self, topic: Uuid) {
        self.topics.remove(&topic);
    }

    pub fn subscriber_count(&self, topic: Uuid) -> usize {
        self.topics.get(&topic).map(|s| s.len()).unwrap_or(0)
    }

    /// Publish to every subscriber of the topic.
    pub fn publish(&self, topic: Uuid, msg: ServerMsg) {
        if let Some(subscribers) = self.topics.get(&topic) {
            for recipient in subscribers.iter() {
                recipient.value().do_send(Outbound(msg.clone()));
            }
        }
    }

    /// Deliver to a single subscribed connection (directed chat).
    pub fn send_to(&self, topic: Uuid, conn_id: Uuid, msg: ServerMsg) {
        if let Some(subscribers) = self.topics.get(&topic) {
            if let Some(recipient) = subscribers.get(&conn_id) {
                recipient.value().do_send(Outbound(msg));
            }
        }
    }
}
