use crate::error::AppResult;
use crate::websocket::message_types::ChatMessage;
use async_trait::async_trait;

/// Boundary to the durable-store collaborator.
///
/// The WebSocket route hands every inbound message here before routing it,
/// so real-time delivery never races ahead of persistence. History retrieval
/// lives entirely on the collaborator's side; this service never reads back.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn persist(&self, msg: &ChatMessage) -> AppResult<()>;
}

/// Default wiring: no persistence, log and move on.
pub struct NullMessageStore;

#[async_trait]
impl MessageStore for NullMessageStore {
    async fn persist(&self, msg: &ChatMessage) -> AppResult<()> {
        tracing::debug!(sender = %msg.sender, receiver = %msg.receiver, "no message store configured; skipping persist");
        Ok(())
    }
}
