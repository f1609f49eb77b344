//! Namespaced TTL cache injected into the components that need one.
//!
//! Values are stored as JSON envelopes carrying a SHA-256 checksum of the
//! payload. An entry whose checksum no longer matches, or that no longer
//! deserializes into the requested type, is reported as a miss so callers
//! refetch from the source of truth.

use moka::future::Cache;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Cached payload with its integrity checksum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEnvelope {
    /// Serialized JSON payload.
    pub data: String,
    /// Hex-encoded SHA-256 of `data`.
    pub checksum: String,
}

impl CacheEnvelope {
    pub fn new(data: String) -> Self {
        let checksum = Self::compute_checksum(&data);
        Self { data, checksum }
    }

    fn compute_checksum(data: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_valid(&self) -> bool {
        Self::compute_checksum(&self.data) == self.checksum
    }

    /// Returns the payload if the stored envelope is intact.
    pub fn open(serialized: &str) -> Option<String> {
        let envelope: CacheEnvelope = serde_json::from_str(serialized).ok()?;
        if envelope.is_valid() {
            Some(envelope.data)
        } else {
            tracing::warn!(
                "Cache validation failed: checksum mismatch. Expected: {}, Data length: {}",
                envelope.checksum,
                envelope.data.len()
            );
            None
        }
    }
}

/// Key/value cache with a fixed TTL and key namespace.
///
/// Clones share the same underlying store. Writes are last-writer-wins.
#[derive(Clone)]
pub struct CacheService {
    namespace: String,
    store: Cache<String, String>,
}

impl CacheService {
    pub fn new(namespace: impl Into<String>, ttl: Duration, max_capacity: u64) -> Self {
        let store = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(max_capacity)
            .build();
        Self {
            namespace: namespace.into(),
            store,
        }
    }

    /// Fully qualified key, e.g. `salesforce-enrichment:global:org_mappings`.
    pub fn key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let full_key = self.key(key);
        let raw = self.store.get(&full_key).await?;
        let data = match CacheEnvelope::open(&raw) {
            Some(data) => data,
            None => {
                self.store.invalidate(&full_key).await;
                return None;
            }
        };
        match serde_json::from_str(&data) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Discarding undecodable cache entry {}: {}", full_key, e);
                self.store.invalidate(&full_key).await;
                None
            }
        }
    }

    /// Stores `value`. Serialization failures are logged and the write is skipped;
    /// the next read will simply miss.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) {
        let full_key = self.key(key);
        let data = match serde_json::to_string(value) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("Not caching {}: {}", full_key, e);
                return;
            }
        };
        let envelope = CacheEnvelope::new(data);
        match serde_json::to_string(&envelope) {
            Ok(serialized) => self.store.insert(full_key, serialized).await,
            Err(e) => tracing::warn!("Not caching {}: {}", full_key, e),
        }
    }

    /// Writes a raw string under `key`, bypassing the envelope.
    #[cfg(test)]
    async fn insert_raw(&self, key: &str, raw: String) {
        self.store.insert(self.key(key), raw).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> CacheService {
        CacheService::new("test:ns", Duration::from_secs(60), 100)
    }

    #[test]
    fn test_envelope_detects_tampering() {
        let envelope = CacheEnvelope::new(r#"{"original": "data"}"#.to_string());
        let serialized = serde_json::to_string(&envelope).unwrap();
        assert_eq!(
            CacheEnvelope::open(&serialized),
            Some(r#"{"original": "data"}"#.to_string())
        );

        let tampered = serialized.replace("original", "hacked");
        assert_eq!(CacheEnvelope::open(&tampered), None);
    }

    #[tokio::test]
    async fn test_round_trip_under_namespace() {
        let cache = cache();
        cache.set_json("accounts", &vec!["001A", "001B"]).await;

        let hit: Option<Vec<String>> = cache.get_json("accounts").await;
        assert_eq!(hit, Some(vec!["001A".to_string(), "001B".to_string()]));
        assert_eq!(cache.key("accounts"), "test:ns:accounts");
    }

    #[tokio::test]
    async fn test_corrupted_entry_is_a_miss_and_evicted() {
        let cache = cache();
        cache.insert_raw("accounts", "not an envelope".to_string()).await;

        let miss: Option<Vec<String>> = cache.get_json("accounts").await;
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_clones_share_store() {
        let cache = cache();
        let other = cache.clone();
        other.set_json("k", &42u32).await;
        assert_eq!(cache.get_json::<u32>("k").await, Some(42));

        cache.set_json("k", &7u32).await;
        assert_eq!(other.get_json::<u32>("k").await, Some(7));
    }
}
