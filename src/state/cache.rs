use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Key/value store with TTL semantics. Expired values are kept so they can be
/// served as a last resort, but `get` never returns them.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn set(&self, key: &str, value: String, ttl: Duration);

    /// The value for `key` if it is still within its TTL.
    async fn get(&self, key: &str) -> Option<String>;

    /// The value for `key` regardless of age.
    async fn get_stale(&self, key: &str) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub payload: String,
    pub inserted_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) < self.ttl
    }
}

/// In-process cache for serialized brackets.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().await.get(key).cloned()
    }
}

#[async_trait]
impl CacheStore for ResultCache {
    async fn set(&self, key: &str, value: String, ttl: Duration) {
        let entry = CacheEntry {
            key: key.to_owned(),
            payload: value,
            inserted_at: Instant::now(),
            ttl,
        };
        // Whole-entry replacement under the write lock; readers see the old
        // entry or the new one.
        self.entries.write().await.insert(key.to_owned(), entry);
    }

    async fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .get(key)
            .filter(|e| e.is_fresh(now))
            .map(|e| e.payload.clone())
    }

    async fn get_stale(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).map(|e| e.payload.clone())
    }
}
