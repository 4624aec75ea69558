//! Cache store port.
//!
//! The only cross-process shared mutable resource in the system. All
//! mutation goes through the atomic primitives defined here; callers never
//! do read-modify-write on top of `get`/`set`.

use async_trait::async_trait;

use crate::error::CacheError;

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Aggregate keyspace statistics, computed with provider-native commands
/// rather than per-key scans.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub total_keys: u64,
    /// Keys carrying a TTL (the rest are persistent).
    pub keys_with_ttl: u64,
}

/// Port for the key/value store backing dedup, counters and warmed content.
///
/// Implementations: `RedisStore` (production, cross-process) and
/// `MemoryStore` (tests, single-process deployments).
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a value by key.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Set a value with an expiry.
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()>;

    /// Atomically set the key only if it does not exist.
    ///
    /// Returns `true` only for the single caller that claimed the key.
    /// This is the dedup primitive: concurrent claims of one key must
    /// yield exactly one `true`.
    async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<bool>;

    /// Whether the key currently exists, without claiming it.
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Delete a single key. Missing keys are not an error.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Set or replace the expiry on an existing key. Missing keys are not
    /// an error.
    async fn expire(&self, key: &str, ttl_secs: u64) -> CacheResult<()>;

    /// Delete every key matching the glob-style pattern, returning the count.
    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64>;

    /// Atomically increment a counter, setting `ttl_secs` on first creation.
    ///
    /// Returns the value after the increment. The TTL is applied only when
    /// the increment created the key, so the window expires as a whole.
    async fn increment(&self, key: &str, ttl_secs: u64) -> CacheResult<u64>;

    /// Add a member with a score to a sorted set.
    async fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> CacheResult<()>;

    /// Members with score in `[min, max]`, best score first.
    async fn sorted_set_range(&self, key: &str, min: f64, max: f64) -> CacheResult<Vec<String>>;

    /// Count of members with score in `[min, max]`.
    async fn sorted_set_count(&self, key: &str, min: f64, max: f64) -> CacheResult<u64>;

    /// Drop members with score below `min` (rolls old entries off a
    /// timestamp-scored sliding window).
    async fn sorted_set_trim_below(&self, key: &str, min: f64) -> CacheResult<u64>;

    /// Keys matching the glob-style pattern.
    async fn scan_keys(&self, pattern: &str) -> CacheResult<Vec<String>>;

    /// Aggregate keyspace statistics.
    async fn stats(&self) -> CacheResult<StoreStats>;
}
