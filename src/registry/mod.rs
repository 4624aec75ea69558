//! Connection registry: live sockets, identities, topic memberships.
//!
//! The registry owns every [`Connection`] for its lifetime, from transport
//! accept to disconnect. Lookups are concurrent (`DashMap` indexes by user
//! and by topic); there is no coarse lock around business logic. Broadcasts
//! to users or topics fan out to local sockets and, through the
//! [`FanoutBus`], to peer processes holding the user's other devices.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::domain::{ConnectionId, TopicKey, UserId};
use crate::gateway::ServerMessage;
use crate::port::{BroadcastEnvelope, BroadcastTarget, ClientTransport, DeliveryResult, FanoutBus};

/// One live connection and its registry-side state.
struct Connection {
    transport: Arc<dyn ClientTransport>,
    /// `None` until authenticated.
    identity: Option<(UserId, String)>,
    joined_topics: HashSet<TopicKey>,
    #[allow(dead_code)]
    connected_at: DateTime<Utc>,
}

/// Result of binding an identity to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Identity bound. `first_for_user` is true when this is the user's
    /// only live connection (the moment they came online).
    Authenticated { first_for_user: bool },
    /// The connection already carries an identity; callers must not emit
    /// a second `authenticated` message.
    AlreadyAuthenticated,
    /// The connection is gone (raced with a disconnect).
    UnknownConnection,
}

/// What a disconnect left behind.
#[derive(Debug, Clone, Default)]
pub struct DisconnectOutcome {
    /// Set when the departing connection was the user's last; the caller
    /// emits the presence-offline signal.
    pub last_connection_of: Option<(UserId, String)>,
}

/// Tracks live client connections and resolves broadcast targets.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Connection>,
    by_user: DashMap<UserId, HashSet<ConnectionId>>,
    by_topic: DashMap<TopicKey, HashSet<ConnectionId>>,
    bus: Arc<dyn FanoutBus>,
    /// Identifies this process on the bus so it can skip its own envelopes.
    origin: String,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new(bus: Arc<dyn FanoutBus>, origin: String) -> Self {
        Self {
            connections: DashMap::new(),
            by_user: DashMap::new(),
            by_topic: DashMap::new(),
            bus,
            origin,
        }
    }

    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Add a connection in the pending (unauthenticated) state.
    pub fn register(&self, connection_id: ConnectionId, transport: Arc<dyn ClientTransport>) {
        self.connections.insert(
            connection_id.clone(),
            Connection {
                transport,
                identity: None,
                joined_topics: HashSet::new(),
                connected_at: Utc::now(),
            },
        );
        debug!(connection_id = %connection_id, "Connection registered");
    }

    /// Bind an identity to a connection, exactly once.
    pub fn authenticate(
        &self,
        connection_id: &ConnectionId,
        user_id: UserId,
        username: String,
    ) -> AuthOutcome {
        let Some(mut conn) = self.connections.get_mut(connection_id) else {
            return AuthOutcome::UnknownConnection;
        };
        if conn.identity.is_some() {
            return AuthOutcome::AlreadyAuthenticated;
        }
        conn.identity = Some((user_id.clone(), username));
        drop(conn);

        let mut entry = self.by_user.entry(user_id).or_default();
        let first_for_user = entry.is_empty();
        entry.insert(connection_id.clone());
        AuthOutcome::Authenticated { first_for_user }
    }

    /// Idempotent topic join.
    pub fn join_topic(&self, connection_id: &ConnectionId, topic: TopicKey) {
        let Some(mut conn) = self.connections.get_mut(connection_id) else {
            return;
        };
        if !conn.joined_topics.insert(topic.clone()) {
            return;
        }
        drop(conn);
        self.by_topic
            .entry(topic)
            .or_default()
            .insert(connection_id.clone());
    }

    /// Idempotent topic leave.
    pub fn leave_topic(&self, connection_id: &ConnectionId, topic: &TopicKey) {
        let Some(mut conn) = self.connections.get_mut(connection_id) else {
            return;
        };
        if !conn.joined_topics.remove(topic) {
            return;
        }
        drop(conn);
        if let Some(mut members) = self.by_topic.get_mut(topic) {
            members.remove(connection_id);
        }
    }

    /// Local connections bound to a user.
    #[must_use]
    pub fn resolve_connections(&self, user_id: &UserId) -> HashSet<ConnectionId> {
        self.by_user
            .get(user_id)
            .map(|set| set.clone())
            .unwrap_or_default()
    }

    /// Local connections joined to a topic.
    #[must_use]
    pub fn resolve_topic(&self, topic: &TopicKey) -> HashSet<ConnectionId> {
        self.by_topic
            .get(topic)
            .map(|set| set.clone())
            .unwrap_or_default()
    }

    /// Identity bound to a connection, if any.
    #[must_use]
    pub fn identity(&self, connection_id: &ConnectionId) -> Option<(UserId, String)> {
        self.connections
            .get(connection_id)
            .and_then(|c| c.identity.clone())
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Best-effort push to one connection.
    ///
    /// Failure (socket gone, buffer full) is reported in the result, never
    /// as an error: partial delivery is expected operational behavior.
    pub async fn deliver(
        &self,
        connection_id: &ConnectionId,
        message: &ServerMessage,
    ) -> DeliveryResult {
        // Clone the transport handle out of the map; never hold a shard
        // lock across the send await.
        let Some(transport) = self
            .connections
            .get(connection_id)
            .map(|c| Arc::clone(&c.transport))
        else {
            return DeliveryResult::Failed("connection not registered".into());
        };
        let result = transport.send(message.to_json()).await;
        if let DeliveryResult::Failed(reason) = &result {
            debug!(connection_id = %connection_id, reason = %reason, "Delivery failed");
        }
        result
    }

    /// Deliver to every local connection of a user and publish the envelope
    /// for peer processes. Returns the count of local successful deliveries.
    pub async fn broadcast_user(&self, user_id: &UserId, message: &ServerMessage) -> usize {
        let delivered = self
            .deliver_to_all(self.resolve_connections(user_id), message)
            .await;
        self.publish(
            BroadcastTarget::User {
                user_id: user_id.clone(),
            },
            message,
        )
        .await;
        delivered
    }

    /// Deliver to every local member of a topic and publish for peers.
    pub async fn broadcast_topic(&self, topic: &TopicKey, message: &ServerMessage) -> usize {
        let delivered = self
            .deliver_to_all(self.resolve_topic(topic), message)
            .await;
        self.publish(
            BroadcastTarget::Topic {
                topic: topic.clone(),
            },
            message,
        )
        .await;
        delivered
    }

    /// Apply an envelope received from a peer process: local delivery only,
    /// no re-publish (the bus excludes own-origin envelopes, this guards
    /// against loops all the same).
    pub async fn apply_envelope(&self, envelope: &BroadcastEnvelope) {
        if envelope.origin == self.origin {
            return;
        }
        let targets = match &envelope.target {
            BroadcastTarget::User { user_id } => self.resolve_connections(user_id),
            BroadcastTarget::Topic { topic } => self.resolve_topic(topic),
        };
        for connection_id in targets {
            let Some(transport) = self
                .connections
                .get(&connection_id)
                .map(|c| Arc::clone(&c.transport))
            else {
                continue;
            };
            if let DeliveryResult::Failed(reason) = transport.send(envelope.message.clone()).await {
                debug!(connection_id = %connection_id, reason = %reason, "Peer envelope delivery failed");
            }
        }
    }

    /// Close every live connection and clear the indexes (shutdown path).
    pub async fn close_all(&self) {
        let transports: Vec<Arc<dyn ClientTransport>> = self
            .connections
            .iter()
            .map(|entry| Arc::clone(&entry.transport))
            .collect();
        for transport in transports {
            transport.close().await;
        }
        self.connections.clear();
        self.by_user.clear();
        self.by_topic.clear();
    }

    /// Remove a connection from every index.
    pub fn disconnect(&self, connection_id: &ConnectionId) -> DisconnectOutcome {
        let Some((_, conn)) = self.connections.remove(connection_id) else {
            return DisconnectOutcome::default();
        };

        for topic in &conn.joined_topics {
            if let Some(mut members) = self.by_topic.get_mut(topic) {
                members.remove(connection_id);
            }
        }

        let mut outcome = DisconnectOutcome::default();
        if let Some((user_id, username)) = conn.identity {
            let last = if let Some(mut set) = self.by_user.get_mut(&user_id) {
                set.remove(connection_id);
                set.is_empty()
            } else {
                false
            };
            if last {
                self.by_user.remove(&user_id);
                outcome.last_connection_of = Some((user_id, username));
            }
        }
        debug!(connection_id = %connection_id, "Connection removed");
        outcome
    }

    async fn deliver_to_all(
        &self,
        targets: HashSet<ConnectionId>,
        message: &ServerMessage,
    ) -> usize {
        let mut delivered = 0;
        for connection_id in targets {
            if self.deliver(&connection_id, message).await.is_delivered() {
                delivered += 1;
            }
        }
        delivered
    }

    async fn publish(&self, target: BroadcastTarget, message: &ServerMessage) {
        let envelope = BroadcastEnvelope {
            origin: self.origin.clone(),
            target,
            message: message.to_json(),
        };
        if let Err(e) = self.bus.publish(&envelope).await {
            // Bus outage never fails local delivery.
            warn!(error = %e, "Fan-out publish failed");
        }
    }
}
