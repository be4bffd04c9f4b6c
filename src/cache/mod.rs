//! Key-value cache used for short-lived memoization of store lookups.
//!
//! Values are opaque strings; callers encode them (JSON) through
//! [`ReadThrough`]. New comments evict their post's entries; everything
//! else is allowed to be stale until its TTL runs out.

mod memory;
mod read_through;
mod redis_cache;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub use self::memory::MemoryCache;
pub use self::read_through::ReadThrough;
pub use self::redis_cache::RedisCache;

use crate::config::CacheConfig;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

#[async_trait::async_trait]
pub trait KvCache: Send + Sync {
    /// Fetch several keys at once. Missing or expired keys are absent from the map.
    async fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, String>>;

    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Drop every entry owned by this cache.
    async fn flush(&self) -> CacheResult<()>;
}

pub type SharedCache = Arc<dyn KvCache>;

/// Cache key builders.
pub mod keys {
    pub fn user(user_id: i64) -> String {
        format!("user_{}", user_id)
    }

    pub fn comment_count(post_id: i64) -> String {
        format!("comment_count_{}", post_id)
    }

    pub fn comments(post_id: i64, all_comments: bool) -> String {
        format!("comments_{}_{}", post_id, all_comments)
    }

    /// Every entry derived from a post's comments.
    pub fn post_comments(post_id: i64) -> Vec<String> {
        vec![
            comment_count(post_id),
            comments(post_id, false),
            comments(post_id, true),
        ]
    }
}

/// Build the cache backend selected by config: redis when a URL is set,
/// otherwise the in-process map.
pub async fn connect(config: &CacheConfig) -> anyhow::Result<SharedCache> {
    match config.url.as_deref() {
        Some(url) => {
            let cache = RedisCache::connect(url).await?;
            tracing::info!("Using redis cache at {}", url);
            Ok(Arc::new(cache))
        }
        None => {
            tracing::info!("Using in-process cache");
            Ok(Arc::new(MemoryCache::new()))
        }
    }
}
