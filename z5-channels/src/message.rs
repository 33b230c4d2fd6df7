//! Message types for channel communication.

use serde::{Deserialize, Serialize};

/// Channel type enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Telegram,
    Cli,
}

impl ChannelType {
    /// Get the channel type as a string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::Cli => "cli",
        }
    }
}

/// An inbound text message from a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Message ID (channel-specific or generated)
    pub id: String,
    /// Channel type
    pub channel_type: ChannelType,
    /// Stable conversation identifier (Telegram chat id)
    pub channel_id: String,
    /// User identifier
    pub user_id: String,
    /// Sender's display name, when the transport provides one
    #[serde(default)]
    pub sender_name: Option<String>,
    /// Message text
    pub text: String,
    /// Timestamp (Unix millis)
    pub timestamp: i64,
}

impl ChannelMessage {
    /// Build a text message stamped with the current time and a fresh id.
    pub fn text(
        channel_type: ChannelType,
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel_type,
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            sender_name: None,
            text: text.into(),
            timestamp: now_millis(),
        }
    }

    /// Attach a display name.
    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }

    /// Display name, or the user id when the transport gave none.
    pub fn display_name(&self) -> &str {
        self.sender_name.as_deref().unwrap_or(&self.user_id)
    }
}

/// Outgoing text message to a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Target channel type
    pub channel_type: ChannelType,
    /// Target conversation ID
    pub channel_id: String,
    /// Reply to message ID (optional)
    pub reply_to: Option<String>,
    /// Message text
    pub text: String,
}

impl OutgoingMessage {
    /// Plain text message without a reply reference.
    pub fn text(
        channel_type: ChannelType,
        channel_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            channel_type,
            channel_id: channel_id.into(),
            reply_to: None,
            text: text.into(),
        }
    }
}

pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
