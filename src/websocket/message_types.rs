use crate::error::AppError;
use serde::{Deserialize, Serialize};

fn default_content_type() -> String {
    "text".to_string()
}

/// One chat message as routed between exactly two users.
///
/// `message` carries the text, or for image messages the URL the upload
/// collaborator produced; `content_type` tags which one it is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub receiver: String,
    pub message: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    pub timestamp: String,
}

/// Outbound envelopes from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    /// Full message content, sent to the sender's own connections and to a
    /// receiver actively viewing this conversation.
    #[serde(rename = "chat")]
    Chat(ChatMessage),

    /// Sent to a receiver who is online but viewing some other (or no)
    /// conversation. Carries only the origin, never the message content.
    #[serde(rename = "notification")]
    Notification { from: String, message: String },

    /// The full set of currently-online usernames.
    #[serde(rename = "user_list")]
    UserList { users: Vec<String> },
}

impl Envelope {
    /// Notification summary for a message whose receiver is not viewing the
    /// conversation. Derived from the sender only.
    pub fn notification_for(msg: &ChatMessage) -> Self {
        Envelope::Notification {
            from: msg.sender.clone(),
            message: format!("New message from {}", msg.sender),
        }
    }

    pub fn to_json(&self) -> Result<String, AppError> {
        serde_json::to_string(self).map_err(|e| AppError::Encode(e.to_string()))
    }
}

/// Inbound WebSocket events from client to server
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum WsInboundEvent {
    /// Send a message to the connection's conversation partner. Sender and
    /// receiver come from the connection itself, never from the payload.
    #[serde(rename = "chat")]
    Chat {
        message: String,
        #[serde(default = "default_content_type")]
        content_type: String,
    },

    /// Enter/leave-conversation signal; `partner: null` means the user is
    /// connected but viewing no conversation.
    #[serde(rename = "set_active_chat")]
    SetActiveChat { partner: Option<String> },
}
