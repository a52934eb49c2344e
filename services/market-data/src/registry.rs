//! Subscription registry
//!
//! Bidirectional index between live connections and topics:
//! topic → subscribers and connection → topics. Both sides are sharded
//! concurrent maps, so subscribe, unsubscribe, teardown and fan-out lookups
//! from many tasks proceed without a global lock.
//!
//! Mutations always take the connection entry before the topic entry.
//! `subscribe` holds the connection entry while it inserts under the
//! topic, so a concurrent `unsubscribe_all` either runs first (and the
//! subscribe fails with an unknown connection) or sees the new topic in the
//! connection's set and removes it.
//!
//! The registry stores [`ConnectionHandle`]s, which hold weak senders: it
//! never keeps a connection alive and never closes one.

use std::collections::{HashMap, HashSet};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use types::errors::RegistryError;
use types::ids::ConnectionId;

use crate::backpressure::ConnectionHandle;
use crate::topic::Topic;

struct ConnectionEntry {
    handle: ConnectionHandle,
    topics: HashSet<Topic>,
}

pub struct SubscriptionRegistry {
    topics: DashMap<Topic, HashMap<ConnectionId, ConnectionHandle>>,
    connections: DashMap<ConnectionId, ConnectionEntry>,
    max_per_connection: usize,
}

impl SubscriptionRegistry {
    pub fn new(max_per_connection: usize) -> Self {
        Self {
            topics: DashMap::new(),
            connections: DashMap::new(),
            max_per_connection,
        }
    }

    /// Track a new connection. Re-registering keeps existing subscriptions.
    pub fn register(&self, handle: ConnectionHandle) {
        let id = handle.id();
        self.connections
            .entry(id)
            .and_modify(|entry| entry.handle = handle.clone())
            .or_insert_with(|| ConnectionEntry {
                handle,
                topics: HashSet::new(),
            });
        debug!(connection = %id, "Connection registered");
    }

    /// Add `topic` for a connection. Returns `Ok(false)` if it was already
    /// subscribed.
    pub fn subscribe(&self, id: ConnectionId, topic: Topic) -> Result<bool, RegistryError> {
        let mut conn = self
            .connections
            .get_mut(&id)
            .ok_or_else(|| RegistryError::UnknownConnection {
                connection: id.to_string(),
            })?;

        if conn.topics.contains(&topic) {
            return Ok(false);
        }
        if conn.topics.len() >= self.max_per_connection {
            return Err(RegistryError::SubscriptionLimit {
                limit: self.max_per_connection,
            });
        }

        self.topics
            .entry(topic.clone())
            .or_default()
            .insert(id, conn.handle.clone());
        debug!(connection = %id, topic = %topic, "Subscribed");
        conn.topics.insert(topic);
        Ok(true)
    }

    /// Remove `topic` for a connection. Returns whether anything changed.
    /// An emptied topic is dropped from the index.
    pub fn unsubscribe(&self, id: ConnectionId, topic: &Topic) -> bool {
        let Some(mut conn) = self.connections.get_mut(&id) else {
            return false;
        };
        if !conn.topics.remove(topic) {
            return false;
        }
        self.detach(id, topic);
        debug!(connection = %id, topic = %topic, "Unsubscribed");
        true
    }

    /// Forget a connection and every subscription it holds. Returns the
    /// number of topics it was removed from.
    pub fn unsubscribe_all(&self, id: ConnectionId) -> usize {
        let Some((_, entry)) = self.connections.remove(&id) else {
            return 0;
        };
        for topic in &entry.topics {
            self.detach(id, topic);
        }
        debug!(connection = %id, topics = entry.topics.len(), "Connection unregistered");
        entry.topics.len()
    }

    fn detach(&self, id: ConnectionId, topic: &Topic) {
        if let Entry::Occupied(mut subscribers) = self.topics.entry(topic.clone()) {
            subscribers.get_mut().remove(&id);
            if subscribers.get().is_empty() {
                subscribers.remove();
            }
        }
    }

    /// Point-in-time copy of a topic's subscribers.
    pub fn subscribers(&self, topic: &Topic) -> Vec<ConnectionHandle> {
        self.topics
            .get(topic)
            .map(|subs| subs.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_subscribed(&self, id: ConnectionId, topic: &Topic) -> bool {
        self.connections
            .get(&id)
            .is_some_and(|conn| conn.topics.contains(topic))
    }

    /// Topics a connection is subscribed to, sorted.
    pub fn topics_of(&self, id: ConnectionId) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self
            .connections
            .get(&id)
            .map(|conn| conn.topics.iter().cloned().collect())
            .unwrap_or_default();
        topics.sort();
        topics
    }

    /// Registered connections.
    pub fn total_connections(&self) -> usize {
        self.connections.len()
    }

    /// Topics with at least one subscriber.
    pub fn total_subscriptions(&self) -> usize {
        self.topics.len()
    }

    pub fn max_per_connection(&self) -> usize {
        self.max_per_connection
    }

    /// Check that both directions of the index agree. Intended for tests
    /// and diagnostics while no mutation is in flight.
    pub fn is_consistent(&self) -> bool {
        let forward: Vec<(Topic, Vec<ConnectionId>)> = self
            .topics
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().keys().copied().collect()))
            .collect();

        let forward_ok = forward.iter().all(|(topic, ids)| {
            !ids.is_empty() && ids.iter().all(|id| self.is_subscribed(*id, topic))
        });

        let inverse: Vec<(ConnectionId, Vec<Topic>)> = self
            .connections
            .iter()
            .map(|entry| (*entry.key(), entry.value().topics.iter().cloned().collect()))
            .collect();

        let inverse_ok = inverse.iter().all(|(id, topics)| {
            topics.iter().all(|topic| {
                self.topics
                    .get(topic)
                    .is_some_and(|subs| subs.contains_key(id))
            })
        });

        forward_ok && inverse_ok
    }
}
