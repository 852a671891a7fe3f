//! Messaging client: the session with the chat network.
//!
//! `MessagingClient` is the seam every other component talks to. The client emits lifecycle
//! and message events on an mpsc channel consumed by the dispatcher; handlers and the HTTP
//! surface call back into it to reply, fetch or delete messages.

mod bridge;
#[cfg(any(test, feature = "test-util"))]
mod memory;

pub use bridge::BridgeClient;
#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryClient, SentMessage};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A chat message as seen by the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    /// Opaque message id, usable with `get_message_by_id` / `delete_message`.
    pub id: String,
    /// Conversation the message came from; replies go back here.
    pub from: String,
    #[serde(default)]
    pub body: String,
    /// True when the bot account itself sent the message.
    #[serde(default)]
    pub from_me: bool,
}

/// Lifecycle and message signals emitted by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Pairing QR payload to show to the operator.
    Qr(String),
    Loading { percent: u32, message: String },
    Authenticated,
    AuthFailure(String),
    Ready,
    Disconnected(String),
    Error(String),
    Message(IncomingMessage),
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("client request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("client api error: {0}")]
    Api(String),
    #[error("message not found: {0}")]
    NotFound(String),
}

/// Operations on the messaging account.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Bring the session up. Resolves once the client is connected or fails.
    async fn initialize(&self) -> Result<(), ClientError>;

    /// Send a text message to a conversation.
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ClientError>;

    /// Reply to `message` in its conversation, quoting it.
    async fn reply(&self, message: &IncomingMessage, text: &str) -> Result<(), ClientError>;

    async fn get_message_by_id(&self, id: &str) -> Result<IncomingMessage, ClientError>;

    /// Delete a message; `for_everyone` revokes it for all participants.
    async fn delete_message(&self, id: &str, for_everyone: bool) -> Result<(), ClientError>;
}
