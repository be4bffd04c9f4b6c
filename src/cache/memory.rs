use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use super::{CacheResult, KvCache};

/// Smallest map size at which writes sweep expired entries.
const MIN_SWEEP_LEN: usize = 1024;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

#[derive(Debug)]
struct Entries {
    map: HashMap<String, Entry>,
    /// Size at which the next write sweeps. Doubles with the live set so
    /// sweeps stay amortized O(1) per write.
    sweep_at: usize,
}

impl Default for Entries {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            sweep_at: MIN_SWEEP_LEN,
        }
    }
}

impl Entries {
    fn sweep_if_due(&mut self, now: Instant) {
        if self.map.len() < self.sweep_at {
            return;
        }
        self.map.retain(|_, e| MemoryCache::live(e, now));
        self.sweep_at = (self.map.len() * 2).max(MIN_SWEEP_LEN);
    }
}

/// In-process cache with per-entry expiry. Expired entries are treated as
/// misses and swept by writes once the map has grown.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<Entries>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(entry: &Entry, now: Instant) -> bool {
        now < entry.expires_at
    }
}

#[async_trait::async_trait]
impl KvCache for MemoryCache {
    async fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, String>> {
        let now = Instant::now();
        let entries = self.entries.lock().await;

        Ok(keys
            .iter()
            .filter_map(|key| {
                entries
                    .map
                    .get(key)
                    .filter(|e| Self::live(e, now))
                    .map(|e| (key.clone(), e.value.clone()))
            })
            .collect())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries
            .map
            .get(key)
            .filter(|e| Self::live(e, now))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.sweep_if_due(now);
        entries.map.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.lock().await.map.remove(key);
        Ok(())
    }

    async fn flush(&self) -> CacheResult<()> {
        let mut entries = self.entries.lock().await;
        *entries = Entries::default();
        Ok(())
    }
}
