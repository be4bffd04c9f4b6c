use std::collections::HashMap;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{CacheError, CacheResult, KvCache};

/// Memoizing decorator over a [`KvCache`] with a fixed TTL.
///
/// Concurrent populates of the same key race; the last write wins. A value
/// may be served stale for up to one TTL window after the store changes.
pub struct ReadThrough<'a> {
    cache: &'a dyn KvCache,
    ttl: Duration,
}

impl<'a> ReadThrough<'a> {
    pub fn new(cache: &'a dyn KvCache, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Batch lookup. Keys that miss are absent from the result; a hit that
    /// fails to decode is an error.
    pub async fn get_many<T: DeserializeOwned>(
        &self,
        keys: &[String],
    ) -> CacheResult<HashMap<String, T>> {
        let raw = self.cache.get_multi(keys).await?;
        raw.into_iter()
            .map(|(key, value)| -> CacheResult<(String, T)> {
                Ok((key, serde_json::from_str(&value)?))
            })
            .collect()
    }

    /// Store a value. Write failures are logged and otherwise ignored.
    pub async fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache encode failed");
                return;
            }
        };

        if let Err(e) = self.cache.set(key, encoded, self.ttl).await {
            tracing::warn!(key = %key, error = %e, "Cache set failed");
        }
    }

    /// Return the cached value for `key`, or run `populate`, cache its
    /// result and return it.
    pub async fn get_or_populate<T, E, F>(&self, key: &str, populate: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send,
        E: From<CacheError> + Send,
        F: FnOnce() -> Result<T, E> + Send,
    {
        if let Some(raw) = self.cache.get(key).await.map_err(E::from)? {
            let value = serde_json::from_str(&raw).map_err(|e| E::from(CacheError::from(e)))?;
            return Ok(value);
        }

        let value = populate()?;
        self.put(key, &value).await;
        Ok(value)
    }

    /// Drop entries made stale by a write. Failures are logged; the entries
    /// then expire on their own.
    pub async fn evict(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.cache.delete(key).await {
                tracing::warn!(key = %key, error = %e, "Cache delete failed");
            }
        }
    }
}
