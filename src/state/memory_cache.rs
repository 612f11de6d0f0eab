// Moka cache for single-process deployments

use crate::core::errors::CacheError;
use crate::core::traits::CacheClient;
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};

#[derive(Clone)]
struct Entry {
    payload: String,
    ttl: Duration,
}

/// Expires each entry after the TTL it was stored with
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory cache client
///
/// Stands in for Redis when the service runs as a single instance; entries
/// are private to the process.
pub struct MemoryCache {
    cache: Cache<String, Entry>,
}

impl MemoryCache {
    /// * `max_capacity` - Maximum number of keys held at once
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        Self { cache }
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.cache.get(key).await.map(|entry| entry.payload))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.cache
            .insert(
                key.to_string(),
                Entry {
                    payload: value.to_string(),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}
