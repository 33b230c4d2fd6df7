//! Telegram channel adapter.
//!
//! Provides the `TelegramChannel` implementation for receiving and sending messages
//! through the Telegram Bot API.

use crate::message::{now_millis, ChannelMessage, ChannelType, OutgoingMessage};
use crate::traits::{Channel, ChannelError, ChannelResult};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use z5_common::util::mask_secret;

/// Production Bot API endpoint.
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram rejects messages longer than this.
const MAX_MESSAGE_LEN: usize = 4096;

/// Long-poll duration passed to `getUpdates`.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Telegram channel - long-polls the Bot API for updates.
pub struct TelegramChannel {
    bot_token: String,
    allowed_users: Vec<String>,
    client: reqwest::Client,
    api_base: String,
    retry_delay: Duration,
}

impl TelegramChannel {
    /// Create a new Telegram channel.
    pub fn new(bot_token: String, allowed_users: Vec<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            bot_token,
            allowed_users,
            client,
            api_base: TELEGRAM_API_BASE.to_string(),
            retry_delay: Duration::from_secs(5),
        }
    }

    /// Point the channel at another Bot API server (local bot API, test doubles).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Delay before polling again after a failed `getUpdates`.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    fn is_user_allowed(&self, username: &str) -> bool {
        self.allowed_users.iter().any(|u| u == "*" || u == username)
    }

    fn is_any_user_allowed<'a, I>(&self, identities: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        identities.into_iter().any(|id| self.is_user_allowed(id))
    }

    /// Turn one `getUpdates` entry into a message, if it is an allowed text message.
    fn parse_update(&self, update: &serde_json::Value) -> Option<ChannelMessage> {
        let message = update.get("message")?;
        let text = message.get("text").and_then(|v| v.as_str())?;

        let chat_id = message
            .get("chat")
            .and_then(|c| c.get("id"))
            .and_then(serde_json::Value::as_i64)?
            .to_string();

        let from = message.get("from");
        let username = from
            .and_then(|f| f.get("username"))
            .and_then(|u| u.as_str())
            .unwrap_or("unknown");
        let user_id = from
            .and_then(|f| f.get("id"))
            .and_then(serde_json::Value::as_i64)
            .map(|id| id.to_string());
        let first_name = from
            .and_then(|f| f.get("first_name"))
            .and_then(|n| n.as_str());

        let mut identities = vec![username];
        if let Some(ref id) = user_id {
            identities.push(id.as_str());
        }

        if !self.is_any_user_allowed(identities.iter().copied()) {
            tracing::warn!(
                "Telegram: ignoring message from unauthorized user: {}",
                username
            );
            return None;
        }

        let id = message
            .get("message_id")
            .and_then(serde_json::Value::as_i64)
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), |id| id.to_string());

        Some(ChannelMessage {
            id,
            channel_type: ChannelType::Telegram,
            channel_id: chat_id,
            user_id: user_id.unwrap_or_else(|| username.to_string()),
            sender_name: first_name.map(String::from),
            text: text.to_string(),
            timestamp: now_millis(),
        })
    }

    /// Send a single message chunk as plain text.
    async fn send_single_chunk(&self, text: &str, chat_id: &str) -> ChannelResult<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::Connection(e.to_string()))?;

        if resp.status().is_success() {
            return Ok(());
        }

        let status = resp.status();
        let data: serde_json::Value = resp.json().await.unwrap_or_default();
        let description = data
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or("no description")
            .to_string();

        Err(match status.as_u16() {
            401 => ChannelError::Auth(description),
            403 => ChannelError::Unreachable(description),
            400 if description.contains("chat not found") => {
                ChannelError::Unreachable(description)
            }
            429 => ChannelError::RateLimited {
                retry_after_secs: data
                    .get("parameters")
                    .and_then(|p| p.get("retry_after"))
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(1),
            },
            _ => ChannelError::SendFailed(format!("{status}: {description}")),
        })
    }

    /// Send a chunk, waiting out one rate-limit response.
    async fn send_chunk_with_retry(&self, text: &str, chat_id: &str) -> ChannelResult<()> {
        match self.send_single_chunk(text, chat_id).await {
            Err(ChannelError::RateLimited { retry_after_secs }) => {
                tracing::warn!(
                    chat_id = %chat_id,
                    retry_after_secs,
                    "Telegram rate limit hit, retrying once"
                );
                tokio::time::sleep(Duration::from_secs(retry_after_secs)).await;
                self.send_single_chunk(text, chat_id).await
            }
            other => other,
        }
    }
}

/// Split a message into chunks that fit within Telegram's limit.
///
/// Prefers paragraph, line, sentence and word boundaries, in that order.
fn split_message(message: &str, max_chars: usize) -> Vec<String> {
    if message.chars().count() <= max_chars {
        return vec![message.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = message;

    while !remaining.is_empty() {
        let limit = match remaining.char_indices().nth(max_chars) {
            Some((idx, _)) => idx,
            None => {
                chunks.push(remaining.to_string());
                break;
            }
        };

        let chunk = &remaining[..limit];
        let split_pos = chunk
            .rfind("\n\n")
            .or_else(|| chunk.rfind('\n'))
            .or_else(|| chunk.rfind(". ").map(|p| p + 1))
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        let actual_split = if split_pos == 0 { limit } else { split_pos };

        chunks.push(remaining[..actual_split].to_string());
        remaining = remaining[actual_split..].trim_start();
    }

    chunks
}

#[async_trait]
impl Channel for TelegramChannel {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Telegram
    }

    async fn init(&mut self) -> ChannelResult<()> {
        // Verify bot token by calling getMe
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::Auth(format!("Invalid bot token: {err}")));
        }

        tracing::info!(token = %mask_secret(&self.bot_token), "Telegram channel initialized");
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        for chunk in split_message(&message.text, MAX_MESSAGE_LEN) {
            self.send_chunk_with_retry(&chunk, &message.channel_id)
                .await?;
        }

        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> ChannelResult<()> {
        let mut offset: i64 = 0;

        tracing::info!("Telegram channel listening for messages...");

        loop {
            let body = serde_json::json!({
                "offset": offset,
                "timeout": POLL_TIMEOUT_SECS,
                "allowed_updates": ["message"]
            });

            let resp = match self
                .client
                .post(self.api_url("getUpdates"))
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("Telegram poll error: {e}");
                    tokio::time::sleep(self.retry_delay).await;
                    continue;
                }
            };

            let data: serde_json::Value = match resp.json().await {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!("Telegram parse error: {e}");
                    tokio::time::sleep(self.retry_delay).await;
                    continue;
                }
            };

            if data.get("ok").and_then(serde_json::Value::as_bool) != Some(true) {
                tracing::warn!(
                    description = %data.get("description").and_then(|d| d.as_str()).unwrap_or(""),
                    "Telegram getUpdates was rejected"
                );
                tokio::time::sleep(self.retry_delay).await;
                continue;
            }

            let Some(results) = data.get("result").and_then(serde_json::Value::as_array) else {
                continue;
            };

            for update in results {
                if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64) {
                    offset = uid + 1;
                }

                let Some(msg) = self.parse_update(update) else {
                    continue;
                };

                tracing::debug!(
                    message_id = %msg.id,
                    channel_id = %msg.channel_id,
                    user_id = %msg.user_id,
                    "Telegram message received"
                );

                if tx.send(msg).await.is_err() {
                    tracing::info!("Message receiver closed, Telegram listener stopping");
                    return Ok(());
                }
            }
        }
    }

    async fn health_check(&self) -> ChannelResult<()> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::Connection(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::NotReady)
        }
    }

    async fn shutdown(&self) -> ChannelResult<()> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}
