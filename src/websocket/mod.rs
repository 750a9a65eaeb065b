use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc::UnboundedSender, RwLock};
use uuid::Uuid;

pub mod message_types;
pub mod presence;
pub mod router;

pub use presence::PresenceTracker;
pub use router::{DeliveryOutcome, MessageRouter};

/// Unique identifier for a live connection
///
/// Each WebSocket connection gets a unique ID when it registers. This allows
/// for precise cleanup when connections close: deregistration removes exactly
/// one connection, never a sibling tab of the same user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Transport-level failure writing to one connection.
///
/// Isolated per connection: the router treats it as an eviction trigger and
/// keeps fanning out to the remaining connections.
#[derive(Debug, Error)]
#[error("connection send failed: peer channel closed")]
pub struct SendFailure;

/// Sending half of one live connection.
///
/// The actual socket I/O happens in the session task that owns the receiving
/// half; pushing a frame here never blocks, so it is safe to call while no
/// registry lock may be held across I/O.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: UnboundedSender<String>,
}

impl ConnectionHandle {
    pub fn new(sender: UnboundedSender<String>) -> Self {
        Self {
            id: ConnectionId::new(),
            sender,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue one JSON frame for this connection.
    pub fn send(&self, frame: String) -> Result<(), SendFailure> {
        self.sender.send(frame).map_err(|_| SendFailure)
    }
}

/// Shared state behind the registry lock.
///
/// Both maps live under the same `RwLock` so that removing a user's last
/// connection and their presence entry is a single atomic step, and so that
/// a delivery decision reads one consistent view of connections + presence.
#[derive(Default)]
pub(crate) struct Inner {
    /// username -> live connections (multiple tabs/devices per user)
    pub(crate) connections: HashMap<String, Vec<ConnectionHandle>>,
    /// username -> conversation partner currently being viewed, if any.
    /// An entry exists iff the user has at least one connection.
    pub(crate) active_chats: HashMap<String, Option<String>>,
}

/// Consistent snapshot used by one `deliver()` call.
///
/// Taken under the lock in a single acquisition; sends happen after the lock
/// is released. Delivery therefore targets the connections registered at the
/// instant delivery begins.
pub(crate) struct DeliverySnapshot {
    pub(crate) sender_conns: Vec<ConnectionHandle>,
    pub(crate) receiver_conns: Vec<ConnectionHandle>,
    pub(crate) receiver_active_chat: Option<String>,
}

/// Connection registry for WebSocket sessions
///
/// Tracks which users currently hold live connections. A username is online
/// iff it has at least one registered connection; the presence entry is
/// created with the first connection and removed with the last one.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Presence view over the same shared state.
    pub fn presence(&self) -> PresenceTracker {
        PresenceTracker::new(Arc::clone(&self.inner))
    }

    /// Add a connection for a user.
    ///
    /// Registering the same (username, connection id) pair twice is a no-op;
    /// the first registration for a username creates its presence entry with
    /// no active chat.
    pub async fn register(&self, username: &str, handle: ConnectionHandle) {
        let mut guard = self.inner.write().await;
        let conns = guard.connections.entry(username.to_string()).or_default();

        if conns.iter().any(|c| c.id == handle.id) {
            tracing::debug!(%username, id = ?handle.id, "connection already registered");
            return;
        }

        conns.push(handle);
        let total = conns.len();
        guard
            .active_chats
            .entry(username.to_string())
            .or_insert(None);

        tracing::debug!(%username, connections = total, "registered connection");
    }

    /// Remove exactly one connection for a user (idempotent if absent).
    ///
    /// When the last connection goes away, the registry entry and the
    /// presence entry are removed together under the same lock.
    pub async fn deregister(&self, username: &str, id: ConnectionId) {
        self.remove(username, id, false).await;
    }

    /// Remove a connection after a failed send.
    ///
    /// Same removal path as `deregister`, logged louder so dead connections
    /// left behind by crashed clients are visible.
    pub async fn evict(&self, username: &str, id: ConnectionId) {
        tracing::warn!(%username, ?id, "evicting connection after send failure");
        self.remove(username, id, true).await;
    }

    async fn remove(&self, username: &str, id: ConnectionId, evicted: bool) {
        let mut guard = self.inner.write().await;

        let now_empty = match guard.connections.get_mut(username) {
            Some(conns) => {
                let before = conns.len();
                conns.retain(|c| c.id != id);
                let after = conns.len();

                if before != after {
                    tracing::debug!(%username, remaining = after, evicted, "removed connection");
                }
                conns.is_empty()
            }
            None => {
                tracing::debug!(%username, ?id, "deregister for unknown user; ignoring");
                return;
            }
        };

        // Registry entry and presence entry go away in the same atomic step.
        if now_empty {
            guard.connections.remove(username);
            guard.active_chats.remove(username);
            tracing::info!(%username, "last connection closed; user offline");
        }
    }

    /// Snapshot of a user's current connections (possibly empty).
    pub async fn connections_for(&self, username: &str) -> Vec<ConnectionHandle> {
        let guard = self.inner.read().await;
        guard.connections.get(username).cloned().unwrap_or_default()
    }

    /// Sorted set of usernames with at least one live connection.
    pub async fn online_users(&self) -> Vec<String> {
        let guard = self.inner.read().await;
        let mut users: Vec<String> = guard.connections.keys().cloned().collect();
        users.sort();
        users
    }

    /// Number of live connections for a user (for logs and tests).
    pub async fn connection_count(&self, username: &str) -> usize {
        let guard = self.inner.read().await;
        guard.connections.get(username).map(|v| v.len()).unwrap_or(0)
    }

    /// Everything one delivery decision needs, read in one lock acquisition.
    pub(crate) async fn delivery_snapshot(&self, sender: &str, receiver: &str) -> DeliverySnapshot {
        let guard = self.inner.read().await;
        DeliverySnapshot {
            sender_conns: guard.connections.get(sender).cloned().unwrap_or_default(),
            receiver_conns: guard.connections.get(receiver).cloned().unwrap_or_default(),
            receiver_active_chat: guard
                .active_chats
                .get(receiver)
                .cloned()
                .flatten(),
        }
    }

    /// Sorted user set plus every connection of every online user.
    pub(crate) async fn broadcast_snapshot(&self) -> (Vec<String>, Vec<(String, ConnectionHandle)>) {
        let guard = self.inner.read().await;
        let mut users: Vec<String> = guard.connections.keys().cloned().collect();
        users.sort();

        let conns = guard
            .connections
            .iter()
            .flat_map(|(user, handles)| {
                handles
                    .iter()
                    .map(move |h| (user.clone(), h.clone()))
            })
            .collect();

        (users, conns)
    }
}
