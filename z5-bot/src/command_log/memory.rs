//! In-process log store for tests and Redis-less local play.

use super::LogStore;
use crate::error::BotResult;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Volatile [`LogStore`]; progress is lost on exit.
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    lists: RwLock<HashMap<String, Vec<String>>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Resolve a Redis-style inclusive range against a list of `len` entries.
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if len == 0 || start > stop || start >= len {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn append(&self, key: &str, entry: &str) -> BotResult<()> {
        self.lists
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .push(entry.to_string());
        Ok(())
    }

    async fn read_range(&self, key: &str, start: isize, stop: isize) -> BotResult<Vec<String>> {
        let lists = self.lists.read().await;
        let Some(list) = lists.get(key) else {
            return Ok(Vec::new());
        };
        Ok(match resolve_range(list.len(), start, stop) {
            Some((from, to)) => list[from..=to].to_vec(),
            None => Vec::new(),
        })
    }

    async fn length(&self, key: &str) -> BotResult<usize> {
        Ok(self.lists.read().await.get(key).map_or(0, Vec::len))
    }

    async fn delete(&self, key: &str) -> BotResult<bool> {
        Ok(self.lists.write().await.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> BotResult<bool> {
        Ok(self.lists.read().await.contains_key(key))
    }

    async fn keys(&self) -> BotResult<Vec<String>> {
        Ok(self.lists.read().await.keys().cloned().collect())
    }
}
