use super::Inner;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Tracks which conversation, if any, each online user is currently viewing.
///
/// A view over the same shared state as the `ConnectionRegistry`, obtained
/// via `ConnectionRegistry::presence()`. Sharing the lock keeps the lifecycle
/// invariant simple: a presence entry exists exactly as long as the user has
/// a registered connection.
///
/// The partner value is advisory. It gates whether the router delivers full
/// content or a notification; it is never used for access control.
#[derive(Clone)]
pub struct PresenceTracker {
    inner: Arc<RwLock<Inner>>,
}

impl PresenceTracker {
    pub(crate) fn new(inner: Arc<RwLock<Inner>>) -> Self {
        Self { inner }
    }

    /// Record which conversation `username` is viewing (`None` = no
    /// conversation open).
    ///
    /// Calls for an offline username are ignored: accepting them would leave
    /// a presence entry with no owning registry entry behind.
    pub async fn set_active_chat(&self, username: &str, partner: Option<&str>) {
        let mut guard = self.inner.write().await;
        match guard.active_chats.get_mut(username) {
            Some(entry) => {
                *entry = partner.map(|p| p.to_string());
                tracing::debug!(%username, ?partner, "active chat updated");
            }
            None => {
                tracing::debug!(%username, ?partner, "active chat update for offline user; ignoring");
            }
        }
    }

    /// The partner `username` is currently viewing, if any.
    pub async fn active_chat_of(&self, username: &str) -> Option<String> {
        let guard = self.inner.read().await;
        guard.active_chats.get(username).cloned().flatten()
    }
}

#[cfg(test)]
mod tests {
    use crate::websocket::{ConnectionHandle, ConnectionRegistry};
    use tokio::sync::mpsc::unbounded_channel;

    fn handle() -> ConnectionHandle {
        let (tx, rx) = unbounded_channel();
        std::mem::forget(rx);
        ConnectionHandle::new(tx)
    }

    #[tokio::test]
    async fn set_active_chat_for_offline_user_leaves_no_entry() {
        let registry = ConnectionRegistry::new();
        let presence = registry.presence();

        presence.set_active_chat("ghost", Some("alice")).await;
        assert_eq!(presence.active_chat_of("ghost").await, None);
        assert!(registry.online_users().await.is_empty());
    }

    #[tokio::test]
    async fn active_chat_can_be_set_and_cleared_while_online() {
        let registry = ConnectionRegistry::new();
        let presence = registry.presence();
        registry.register("alice", handle()).await;

        assert_eq!(presence.active_chat_of("alice").await, None);

        presence.set_active_chat("alice", Some("bob")).await;
        assert_eq!(presence.active_chat_of("alice").await.as_deref(), Some("bob"));

        presence.set_active_chat("alice", None).await;
        assert_eq!(presence.active_chat_of("alice").await, None);
    }
}
