use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::Mutex;

use super::{CacheResult, KvCache};

/// Shared redis cache. Every key is namespaced so `flush` only touches
/// entries written by this application.
#[derive(Clone)]
pub struct RedisCache {
    conn: Arc<Mutex<ConnectionManager>>,
    prefix: String,
}

/// Namespace for every key this application writes.
pub const DEFAULT_PREFIX: &str = "iscogram:";

impl RedisCache {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        Self::connect_with_prefix(url, DEFAULT_PREFIX).await
    }

    pub async fn connect_with_prefix(url: &str, prefix: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self {
            conn: Arc::new(Mutex::new(manager)),
            prefix: prefix.to_string(),
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait::async_trait]
impl KvCache for RedisCache {
    async fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, String>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let namespaced: Vec<String> = keys.iter().map(|k| self.namespaced(k)).collect();
        let mut conn = self.conn.lock().await;
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&namespaced)
            .query_async(&mut *conn)
            .await?;

        Ok(keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|v| (key.clone(), v)))
            .collect())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn.lock().await;
        let value: Option<String> = conn.get(self.namespaced(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.lock().await;
        conn.set_ex::<_, _, ()>(self.namespaced(key), value, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.conn.lock().await;
        conn.del::<_, ()>(self.namespaced(key)).await?;
        Ok(())
    }

    async fn flush(&self) -> CacheResult<()> {
        let pattern = format!("{}*", self.prefix);
        let mut conn = self.conn.lock().await;
        let mut cursor: u64 = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut *conn)
                .await?;

            if !keys.is_empty() {
                conn.del::<_, ()>(keys).await?;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(())
    }
}
