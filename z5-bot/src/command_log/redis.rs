//! Redis-backed log store: one Redis list per (conversation, story) key.

use super::LogStore;
use crate::error::{BotError, BotResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;

/// Keys that look like command logs.
const KEY_PATTERN: &str = "*:*";

/// [`LogStore`] over a reconnecting Redis connection.
#[derive(Clone)]
pub struct RedisLogStore {
    conn: ConnectionManager,
}

impl RedisLogStore {
    /// Connect to `url` (`redis://[:password@]host:port/db`).
    pub async fn connect(url: &str) -> BotResult<Self> {
        let client = redis::Client::open(url).map_err(|e| BotError::Store(e.to_string()))?;

        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| BotError::Store(e.to_string()))?;

        Ok(Self { conn })
    }

    /// Round-trip a PING to confirm the server is reachable.
    pub async fn ping(&self) -> BotResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl LogStore for RedisLogStore {
    async fn append(&self, key: &str, entry: &str) -> BotResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("RPUSH")
            .arg(key)
            .arg(entry)
            .query_async::<i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn read_range(&self, key: &str, start: isize, stop: isize) -> BotResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let entries = redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async::<Vec<String>>(&mut conn)
            .await?;
        Ok(entries)
    }

    async fn length(&self, key: &str) -> BotResult<usize> {
        let mut conn = self.conn.clone();
        let len = redis::cmd("LLEN")
            .arg(key)
            .query_async::<usize>(&mut conn)
            .await?;
        Ok(len)
    }

    async fn delete(&self, key: &str) -> BotResult<bool> {
        let mut conn = self.conn.clone();
        let removed = redis::cmd("DEL")
            .arg(key)
            .query_async::<i64>(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> BotResult<bool> {
        let mut conn = self.conn.clone();
        let count = redis::cmd("EXISTS")
            .arg(key)
            .query_async::<i64>(&mut conn)
            .await?;
        Ok(count > 0)
    }

    async fn keys(&self) -> BotResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(KEY_PATTERN)
                .arg("COUNT")
                .arg(100)
                .query_async::<(u64, Vec<String>)>(&mut conn)
                .await?;

            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(keys)
    }
}
