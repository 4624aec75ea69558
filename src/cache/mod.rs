//! Event cache service: dedup claims, invalidation, warming, metrics.
//!
//! Wraps the [`CacheStore`] port with domain operations. Every method here
//! degrades gracefully: if the store is unreachable the method logs and
//! returns a safe default, and callers treat the cache as advisory. Losing
//! the cache disables dedup and warming for the outage window; it never
//! blocks event delivery.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::domain::{ContentId, ContentType, TrendingItem, UserId};
use crate::port::{CacheStore, StoreStats};

/// Key under which the trending ranking sorted set lives.
const TRENDING_RANK_KEY: &str = "trending:rank";

/// Hit/miss counters for one cache category.
#[derive(Debug, Default)]
struct CategoryCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Snapshot of hit/miss ratios per category.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PerformanceMetrics {
    pub categories: HashMap<String, CategoryMetrics>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CategoryMetrics {
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
}

/// Keyspace-level statistics combined with local counter totals.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub store: StoreStats,
    pub total_hits: u64,
    pub total_misses: u64,
}

/// Domain cache operations over the raw store.
pub struct EventCacheService {
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
    counters: DashMap<String, CategoryCounters>,
}

impl EventCacheService {
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        Self {
            store,
            config,
            counters: DashMap::new(),
        }
    }

    /// Atomically claim a dedupe key.
    ///
    /// Returns `true` only for the claiming caller; `false` when the key is
    /// already held or the store is unavailable. Never a separate
    /// read-then-write: the claim reduces to the store's set-if-absent.
    pub async fn cache_event(&self, dedupe_key: &str, payload: &str, ttl_secs: u64) -> bool {
        match self
            .store
            .set_if_absent(dedupe_key, payload, ttl_secs)
            .await
        {
            Ok(claimed) => claimed,
            Err(e) => {
                warn!(key = %dedupe_key, error = %e, "Dedup claim failed, treating as unclaimed");
                false
            }
        }
    }

    /// Existence check without claiming; used for pre-flight decisions.
    pub async fn is_event_duplicate(&self, dedupe_key: &str) -> bool {
        match self.store.exists(dedupe_key).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(key = %dedupe_key, error = %e, "Duplicate check failed, assuming not duplicate");
                false
            }
        }
    }

    /// Delete every cache entry matching the pattern.
    pub async fn invalidate_pattern(&self, pattern: &str) {
        match self.store.delete_pattern(pattern).await {
            Ok(count) => debug!(pattern = %pattern, removed = count, "Cache invalidated"),
            Err(e) => warn!(pattern = %pattern, error = %e, "Cache invalidation failed"),
        }
    }

    /// Invalidate everything derived from one user's state (feed, profile
    /// aggregates, recommendations).
    pub async fn invalidate_user_cache(&self, user_id: &UserId) {
        for pattern in [
            format!("feed:user:{user_id}"),
            format!("user:{user_id}:*"),
            format!("rec:user:{user_id}:*"),
        ] {
            self.invalidate_pattern(&pattern).await;
        }
    }

    /// Invalidate everything derived from one piece of content.
    pub async fn invalidate_content_cache(&self, content_type: ContentType, content_id: &ContentId) {
        for pattern in [
            format!("likes:{content_type}:{content_id}"),
            format!("popular:{content_type}:{content_id}"),
            format!("content:{content_type}:{content_id}:*"),
        ] {
            self.invalidate_pattern(&pattern).await;
        }
    }

    /// Pre-populate popularity entries so reads skip cold computation.
    pub async fn warm_popular_content(&self, items: &[(ContentType, ContentId, f64)]) {
        for (content_type, content_id, score) in items {
            let key = format!("popular:{content_type}:{content_id}");
            let value = json!({ "score": score }).to_string();
            if let Err(e) = self.store.set(&key, &value, self.config.popular_ttl_secs).await {
                warn!(key = %key, error = %e, "Popular content warm failed");
            }
        }
    }

    /// Cache the running like total for a piece of content.
    pub async fn warm_content_likes(
        &self,
        content_type: ContentType,
        content_id: &ContentId,
        total_likes: u64,
    ) {
        let key = format!("likes:{content_type}:{content_id}");
        let value = total_likes.to_string();
        if let Err(e) = self.store.set(&key, &value, self.config.likes_ttl_secs).await {
            warn!(key = %key, error = %e, "Likes warm failed");
        }
    }

    /// Cache a user's feed snapshot.
    pub async fn warm_user_feed(&self, user_id: &UserId, feed_snapshot: &str) {
        let key = format!("feed:user:{user_id}");
        if let Err(e) = self.store.set(&key, feed_snapshot, self.config.feed_ttl_secs).await {
            warn!(user_id = %user_id, error = %e, "Feed warm failed");
        }
    }

    /// Read back a warmed feed snapshot, recording a hit or miss.
    pub async fn cached_user_feed(&self, user_id: &UserId) -> Option<String> {
        let key = format!("feed:user:{user_id}");
        match self.store.get(&key).await {
            Ok(Some(feed)) => {
                self.increment_hit_counter("feed");
                Some(feed)
            }
            Ok(None) => {
                self.increment_miss_counter("feed");
                None
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Feed read failed");
                self.increment_miss_counter("feed");
                None
            }
        }
    }

    /// Replace the trending ranking sorted set with a fresh computation.
    pub async fn warm_trending_content(&self, ranked: &[TrendingItem]) {
        if let Err(e) = self.store.delete(TRENDING_RANK_KEY).await {
            warn!(error = %e, "Trending rank reset failed");
            return;
        }
        for item in ranked {
            let member = format!("{}:{}", item.content_type, item.content_id);
            if let Err(e) = self
                .store
                .sorted_set_add(TRENDING_RANK_KEY, &member, item.engagement_score)
                .await
            {
                warn!(member = %member, error = %e, "Trending rank warm failed");
                return;
            }
        }
        if ranked.is_empty() {
            return;
        }
        // A stale ranking ages out if the recompute job stops running.
        if let Err(e) = self
            .store
            .expire(TRENDING_RANK_KEY, self.config.trending_ttl_secs)
            .await
        {
            warn!(error = %e, "Trending rank expiry failed");
        }
        debug!(entries = ranked.len(), "Trending rank warmed");
    }

    /// Top trending members by score, best first.
    pub async fn trending_ranking(&self) -> Vec<String> {
        match self
            .store
            .sorted_set_range(TRENDING_RANK_KEY, f64::MIN, f64::MAX)
            .await
        {
            Ok(members) => {
                if members.is_empty() {
                    self.increment_miss_counter("trending");
                } else {
                    self.increment_hit_counter("trending");
                }
                members
            }
            Err(e) => {
                warn!(error = %e, "Trending rank read failed");
                self.increment_miss_counter("trending");
                Vec::new()
            }
        }
    }

    pub fn increment_hit_counter(&self, category: &str) {
        self.counters
            .entry(category.to_string())
            .or_default()
            .hits
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_miss_counter(&self, category: &str) {
        self.counters
            .entry(category.to_string())
            .or_default()
            .misses
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Hit/miss ratios per category from the local counters.
    #[must_use]
    pub fn performance_metrics(&self) -> PerformanceMetrics {
        let categories = self
            .counters
            .iter()
            .map(|entry| {
                let hits = entry.hits.load(Ordering::Relaxed);
                let misses = entry.misses.load(Ordering::Relaxed);
                let total = hits + misses;
                let hit_ratio = if total == 0 {
                    0.0
                } else {
                    hits as f64 / total as f64
                };
                (
                    entry.key().clone(),
                    CategoryMetrics {
                        hits,
                        misses,
                        hit_ratio,
                    },
                )
            })
            .collect();
        PerformanceMetrics { categories }
    }

    /// Keyspace statistics via the store's aggregate commands.
    ///
    /// Returns zeroed stats when the store is unreachable.
    pub async fn cache_stats(&self) -> CacheStats {
        let store = match self.store.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "Cache stats unavailable");
                StoreStats::default()
            }
        };
        let (total_hits, total_misses) = self.counters.iter().fold((0, 0), |(h, m), entry| {
            (
                h + entry.hits.load(Ordering::Relaxed),
                m + entry.misses.load(Ordering::Relaxed),
            )
        });
        CacheStats {
            store,
            total_hits,
            total_misses,
        }
    }

    /// Maintenance sweep: enumerate keys matching the pattern and touch
    /// each one so lazily-expired entries are dropped. Returns the number
    /// of keys that turned out to be gone.
    ///
    /// Runs concurrently with normal traffic; there is no global lock to
    /// hold.
    pub async fn clean_expired_keys(&self, pattern: &str) -> u64 {
        let keys = match self.store.scan_keys(pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Sweep enumeration failed");
                return 0;
            }
        };
        let mut removed = 0;
        for key in keys {
            match self.store.exists(&key).await {
                Ok(false) => removed += 1,
                Ok(true) => {}
                Err(e) => {
                    warn!(key = %key, error = %e, "Sweep check failed");
                    return removed;
                }
            }
        }
        debug!(pattern = %pattern, removed, "Sweep completed");
        removed
    }
}
