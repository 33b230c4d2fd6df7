//! CLI channel adapter for playing in a terminal.
//!
//! Every line typed on stdin is one message from a single local conversation.

use crate::message::{ChannelMessage, ChannelType, OutgoingMessage};
use crate::traits::{Channel, ChannelResult};
use async_trait::async_trait;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};

/// Conversation id used for the local terminal.
pub const CLI_CONVERSATION_ID: &str = "cli";

/// CLI channel - stdin/stdout, one conversation.
pub struct CliChannel {
    user_name: String,
    stdout: Mutex<io::Stdout>,
}

impl CliChannel {
    /// Create a new CLI channel, greeting the local user by their login name.
    pub fn new() -> Self {
        let user_name = std::env::var("USER").unwrap_or_else(|_| "player".to_string());
        Self {
            user_name,
            stdout: Mutex::new(io::stdout()),
        }
    }

    fn to_message(&self, line: &str) -> Option<ChannelMessage> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        Some(
            ChannelMessage::text(ChannelType::Cli, CLI_CONVERSATION_ID, &self.user_name, line)
                .with_sender_name(&self.user_name),
        )
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Cli
    }

    async fn init(&mut self) -> ChannelResult<()> {
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        let mut out = self.stdout.lock().await;
        let block = format!("{}\n\n", message.text);
        // A closed stdout is not worth failing the conversation over.
        if let Err(e) = out.write_all(block.as_bytes()).await {
            tracing::debug!("CLI write failed: {e}");
        }
        let _ = out.flush().await;
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> ChannelResult<()> {
        let reader = BufReader::new(io::stdin());
        let mut lines = reader.lines();

        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim() == "/quit" || line.trim() == "/exit" {
                break;
            }
            let Some(msg) = self.to_message(&line) else {
                continue;
            };
            if tx.send(msg).await.is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn health_check(&self) -> ChannelResult<()> {
        Ok(())
    }

    async fn shutdown(&self) -> ChannelResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_channel_name() {
        assert_eq!(CliChannel::new().name(), "cli");
    }

    #[tokio::test]
    async fn cli_channel_init() {
        let mut ch = CliChannel::new();
        assert!(ch.init().await.is_ok());
    }

    #[tokio::test]
    async fn cli_channel_health_check() {
        let ch = CliChannel::default();
        assert!(ch.health_check().await.is_ok());
        assert!(ch.shutdown().await.is_ok());
    }

    #[test]
    fn lines_map_to_the_local_conversation() {
        let ch = CliChannel::new();
        let msg = ch.to_message("  open mailbox \n").unwrap();
        assert_eq!(msg.channel_id, CLI_CONVERSATION_ID);
        assert_eq!(msg.text, "open mailbox");
        assert!(msg.sender_name.is_some());
        assert!(ch.to_message("   ").is_none());
    }
}
