//! Durable per-(conversation, story) command logs.
//!
//! The log is the only persisted form of progress. Entries are raw command
//! strings in arrival order, stored under `"{conversation_id}:{abbrev}"`.

mod memory;
mod redis;

pub use self::memory::MemoryLogStore;
pub use self::redis::RedisLogStore;

use crate::catalog::Story;
use crate::error::{BotError, BotResult};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Key-value list store backing the command log.
///
/// Implementations must serialize their own per-key operations.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Append one entry to the tail of `key`.
    async fn append(&self, key: &str, entry: &str) -> BotResult<()>;

    /// Entries between `start` and `stop` inclusive; negative indices count
    /// from the tail.
    async fn read_range(&self, key: &str, start: isize, stop: isize) -> BotResult<Vec<String>>;

    async fn length(&self, key: &str) -> BotResult<usize>;

    /// Delete `key`. Returns whether it existed.
    async fn delete(&self, key: &str) -> BotResult<bool>;

    async fn exists(&self, key: &str) -> BotResult<bool>;

    /// Every stored key.
    async fn keys(&self) -> BotResult<Vec<String>>;
}

/// Command log policy over a [`LogStore`].
#[derive(Clone)]
pub struct CommandLog {
    store: Arc<dyn LogStore>,
}

impl CommandLog {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self { store }
    }

    /// Composite store key for a (conversation, story) pair.
    pub fn key(conversation_id: &str, story: &Story) -> String {
        format!("{conversation_id}:{}", story.abbrev)
    }

    pub async fn append(&self, conversation_id: &str, story: &Story, command: &str) -> BotResult<()> {
        self.store
            .append(&Self::key(conversation_id, story), command)
            .await
    }

    /// All commands in arrival order; empty when nothing was recorded.
    pub async fn read_all(&self, conversation_id: &str, story: &Story) -> BotResult<Vec<String>> {
        self.store
            .read_range(&Self::key(conversation_id, story), 0, -1)
            .await
    }

    pub async fn length(&self, conversation_id: &str, story: &Story) -> BotResult<usize> {
        self.store.length(&Self::key(conversation_id, story)).await
    }

    /// Drop the whole log for the pair.
    pub async fn clear(&self, conversation_id: &str, story: &Story) -> BotResult<()> {
        if self.store.delete(&Self::key(conversation_id, story)).await? {
            Ok(())
        } else {
            Err(BotError::NothingToClear)
        }
    }

    pub async fn exists(&self, conversation_id: &str, story: &Story) -> BotResult<bool> {
        self.store.exists(&Self::key(conversation_id, story)).await
    }

    /// Conversations with any recorded log, across all stories.
    pub async fn conversations(&self) -> BotResult<BTreeSet<String>> {
        let keys = self.store.keys().await?;
        Ok(keys
            .iter()
            .filter_map(|key| key.split_once(':').map(|(conv, _)| conv.to_string()))
            .collect())
    }
}
