use super::message_types::{ChatMessage, Envelope};
use super::{ConnectionId, ConnectionRegistry};
use crate::error::AppResult;

/// What `deliver` did for the receiver side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Receiver was viewing this conversation; full content delivered.
    Delivered,
    /// Receiver online but viewing elsewhere; notification sent instead.
    Notified,
    /// Receiver has no live connections; nothing sent to them.
    ReceiverOffline,
}

/// Routes chat messages between exactly the intended sender and receiver.
///
/// Reads connections and presence in a single lock acquisition (one
/// consistent snapshot per delivery), then sends with the lock released.
/// Sends are non-blocking channel pushes, so two `deliver` calls made in
/// order for the same (sender, receiver) pair reach the receiver's
/// connections in that order.
#[derive(Clone)]
pub struct MessageRouter {
    registry: ConnectionRegistry,
}

impl MessageRouter {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    /// Fan a message out to the sender's own connections, and to the
    /// receiver's connections either as full content or as a notification.
    ///
    /// The receiver sees the unmodified message only when they are actively
    /// viewing the conversation with the sender; otherwise they get a
    /// notification that names the sender but carries no message content.
    /// Durable storage is the caller's job and must happen before this call.
    ///
    /// Per-connection send failures are isolated: the failed connection is
    /// evicted from the registry and the rest of the fan-out proceeds. The
    /// only error this returns is envelope encoding.
    pub async fn deliver(&self, msg: &ChatMessage) -> AppResult<DeliveryOutcome> {
        let snapshot = self
            .registry
            .delivery_snapshot(&msg.sender, &msg.receiver)
            .await;

        let chat_frame = Envelope::Chat(msg.clone()).to_json()?;
        let mut failed: Vec<(String, ConnectionId)> = Vec::new();

        // Echo to every one of the sender's own tabs/devices, always.
        for conn in &snapshot.sender_conns {
            if conn.send(chat_frame.clone()).is_err() {
                failed.push((msg.sender.clone(), conn.id()));
            }
        }

        let outcome = if snapshot.receiver_conns.is_empty() {
            tracing::debug!(
                sender = %msg.sender,
                receiver = %msg.receiver,
                "receiver offline; no real-time delivery"
            );
            DeliveryOutcome::ReceiverOffline
        } else if msg.receiver == msg.sender {
            // Self-conversation: the echo above already reached every
            // connection once.
            DeliveryOutcome::Delivered
        } else if snapshot.receiver_active_chat.as_deref() == Some(msg.sender.as_str()) {
            for conn in &snapshot.receiver_conns {
                if conn.send(chat_frame.clone()).is_err() {
                    failed.push((msg.receiver.clone(), conn.id()));
                }
            }
            tracing::debug!(sender = %msg.sender, receiver = %msg.receiver, "delivered full message");
            DeliveryOutcome::Delivered
        } else {
            let note_frame = Envelope::notification_for(msg).to_json()?;
            for conn in &snapshot.receiver_conns {
                if conn.send(note_frame.clone()).is_err() {
                    failed.push((msg.receiver.clone(), conn.id()));
                }
            }
            tracing::debug!(sender = %msg.sender, receiver = %msg.receiver, "receiver viewing elsewhere; notified");
            DeliveryOutcome::Notified
        };

        for (username, id) in failed {
            self.registry.evict(&username, id).await;
        }

        Ok(outcome)
    }

    /// Send the current online-user set to every connection of every online
    /// user.
    ///
    /// Callers decide when presence changes warrant a broadcast; the router
    /// never invokes this on its own.
    pub async fn broadcast_user_list(&self) -> AppResult<()> {
        let (users, conns) = self.registry.broadcast_snapshot().await;
        let frame = Envelope::UserList { users }.to_json()?;

        let mut failed: Vec<(String, ConnectionId)> = Vec::new();
        for (username, conn) in conns {
            if conn.send(frame.clone()).is_err() {
                failed.push((username, conn.id()));
            }
        }

        for (username, id) in failed {
            self.registry.evict(&username, id).await;
        }

        Ok(())
    }
}
