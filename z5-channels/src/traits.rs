//! Channel traits for implementing chat transports.

use crate::message::{ChannelMessage, ChannelType, OutgoingMessage};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel error type.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Message send failed: {0}")]
    SendFailed(String),

    /// The recipient blocked the bot or the conversation no longer exists.
    #[error("Recipient unreachable: {0}")]
    Unreachable(String),

    #[error("Channel not ready")]
    NotReady,
}

impl ChannelError {
    /// Whether retrying the delivery later can never succeed.
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Auth(_))
    }
}

/// Channel adapter trait.
///
/// Implement this trait to add support for a new messaging transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Transport kind.
    fn channel_type(&self) -> ChannelType;

    /// Get the channel name.
    fn name(&self) -> &'static str {
        self.channel_type().as_str()
    }

    /// Initialize the channel (connect, authenticate, etc.).
    async fn init(&mut self) -> ChannelResult<()>;

    /// Send a message to the channel. Returns a delivery id.
    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String>;

    /// Send plain text to a conversation.
    async fn send_text(&self, channel_id: &str, text: &str) -> ChannelResult<String> {
        self.send(OutgoingMessage::text(self.channel_type(), channel_id, text))
            .await
    }

    /// Listen for incoming messages and forward them to `tx` (long-running).
    ///
    /// Returns when the transport is exhausted or the receiver is dropped.
    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> ChannelResult<()>;

    /// Check if the channel is healthy.
    async fn health_check(&self) -> ChannelResult<()>;

    /// Shutdown the channel gracefully.
    async fn shutdown(&self) -> ChannelResult<()>;
}
