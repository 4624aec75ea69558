//! In-memory cache store and single-process fan-out bus.
//!
//! The memory store backs tests and single-process deployments. Expiry is
//! lazy: reads drop entries past their deadline, and the maintenance sweep
//! walks the keyspace to collect the rest. An outage flag lets tests
//! exercise every degraded path without a real store to kill.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::error::CacheError;
use crate::port::{
    BroadcastEnvelope, CacheResult, CacheStore, FanoutBus, StoreStats,
};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

#[derive(Debug, Default)]
struct SortedSet {
    members: Vec<(String, f64)>,
    expires_at: Option<Instant>,
}

impl SortedSet {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Concurrent in-memory [`CacheStore`].
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    sorted_sets: DashMap<String, SortedSet>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a store outage: every operation errors until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> CacheResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(CacheError::Unavailable("simulated outage".into()))
        } else {
            Ok(())
        }
    }

    fn ttl_deadline(ttl_secs: u64) -> Option<Instant> {
        (ttl_secs > 0).then(|| Instant::now() + Duration::from_secs(ttl_secs))
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check_available()?;
        if let Some(entry) = self.entries.get(key) {
            if !entry.expired() {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Lazy expiry.
        self.entries.remove_if(key, |_, entry| entry.expired());
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()> {
        self.check_available()?;
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Self::ttl_deadline(ttl_secs),
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<bool> {
        self.check_available()?;
        // The entry API holds the shard lock, making check-and-insert atomic.
        let fresh = Entry {
            value: value.to_string(),
            expires_at: Self::ttl_deadline(ttl_secs),
        };
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().expired() {
                    occupied.insert(fresh);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.check_available()?;
        if let Some(entry) = self.entries.get(key) {
            if !entry.expired() {
                return Ok(true);
            }
        }
        self.entries.remove_if(key, |_, entry| entry.expired());
        self.sorted_sets.remove_if(key, |_, set| set.expired());
        Ok(self.sorted_sets.contains_key(key))
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.check_available()?;
        self.entries.remove(key);
        self.sorted_sets.remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> CacheResult<()> {
        self.check_available()?;
        let deadline = Self::ttl_deadline(ttl_secs);
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = deadline;
        }
        if let Some(mut set) = self.sorted_sets.get_mut(key) {
            set.expires_at = deadline;
        }
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        self.check_available()?;
        let mut removed = 0;
        let matching: Vec<String> = self
            .entries
            .iter()
            .map(|e| e.key().clone())
            .chain(self.sorted_sets.iter().map(|e| e.key().clone()))
            .filter(|key| glob_match(pattern, key))
            .collect();
        for key in matching {
            if self.entries.remove(&key).is_some() | self.sorted_sets.remove(&key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn increment(&self, key: &str, ttl_secs: u64) -> CacheResult<u64> {
        self.check_available()?;
        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: "0".to_string(),
            expires_at: Self::ttl_deadline(ttl_secs),
        });
        if entry.expired() {
            entry.value = "0".to_string();
            entry.expires_at = Self::ttl_deadline(ttl_secs);
        }
        let next = entry.value.parse::<u64>().unwrap_or(0) + 1;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> CacheResult<()> {
        self.check_available()?;
        let mut set = self.sorted_sets.entry(key.to_string()).or_default();
        if set.expired() {
            set.members.clear();
            set.expires_at = None;
        }
        if let Some(existing) = set.members.iter_mut().find(|(m, _)| m == member) {
            existing.1 = score;
        } else {
            set.members.push((member.to_string(), score));
        }
        Ok(())
    }

    async fn sorted_set_range(&self, key: &str, min: f64, max: f64) -> CacheResult<Vec<String>> {
        self.check_available()?;
        if let Some(set) = self.sorted_sets.get(key) {
            if !set.expired() {
                let mut members: Vec<(String, f64)> = set
                    .members
                    .iter()
                    .filter(|(_, score)| *score >= min && *score <= max)
                    .cloned()
                    .collect();
                members
                    .sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
                return Ok(members.into_iter().map(|(member, _)| member).collect());
            }
        }
        self.sorted_sets.remove_if(key, |_, set| set.expired());
        Ok(Vec::new())
    }

    async fn sorted_set_count(&self, key: &str, min: f64, max: f64) -> CacheResult<u64> {
        self.check_available()?;
        let Some(set) = self.sorted_sets.get(key) else {
            return Ok(0);
        };
        if set.expired() {
            return Ok(0);
        }
        Ok(set
            .members
            .iter()
            .filter(|(_, score)| *score >= min && *score <= max)
            .count() as u64)
    }

    async fn sorted_set_trim_below(&self, key: &str, min: f64) -> CacheResult<u64> {
        self.check_available()?;
        let Some(mut set) = self.sorted_sets.get_mut(key) else {
            return Ok(0);
        };
        if set.expired() {
            set.members.clear();
            set.expires_at = None;
            return Ok(0);
        }
        let before = set.members.len();
        set.members.retain(|(_, score)| *score >= min);
        Ok((before - set.members.len()) as u64)
    }

    async fn scan_keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        self.check_available()?;
        Ok(self
            .entries
            .iter()
            .map(|e| e.key().clone())
            .chain(self.sorted_sets.iter().map(|e| e.key().clone()))
            .filter(|key| glob_match(pattern, key))
            .collect())
    }

    async fn stats(&self) -> CacheResult<StoreStats> {
        self.check_available()?;
        let keys_with_ttl = self
            .entries
            .iter()
            .filter(|e| e.expires_at.is_some() && !e.expired())
            .count() as u64;
        let live = self.entries.iter().filter(|e| !e.expired()).count() as u64;
        let live_sets = self.sorted_sets.iter().filter(|s| !s.expired()).count() as u64;
        Ok(StoreStats {
            total_keys: live + live_sets,
            keys_with_ttl,
        })
    }
}

/// Glob matching for `*` wildcards only, which is all the key patterns use.
fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }
    let mut rest = key;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            let Some(stripped) = rest.strip_prefix(part) else {
                return false;
            };
            rest = stripped;
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            let Some(pos) = rest.find(part) else {
                return false;
            };
            rest = &rest[pos + part.len()..];
        }
    }
    // Pattern ended with '*'.
    true
}

/// Single-process [`FanoutBus`]: publishing is a no-op and no envelopes
/// ever arrive, because every connection is local.
#[derive(Default)]
pub struct LocalBus;

impl LocalBus {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FanoutBus for LocalBus {
    async fn publish(&self, _envelope: &BroadcastEnvelope) -> crate::error::Result<()> {
        Ok(())
    }

    async fn subscribe(&self) -> crate::error::Result<mpsc::Receiver<BroadcastEnvelope>> {
        // Channel with no sender side retained; recv() pends forever.
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_if_absent_claims_once() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("k", "a", 60).await.unwrap());
        assert!(!store.set_if_absent("k", "b", 60).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn expired_entry_can_be_reclaimed() {
        let store = MemoryStore::new();
        // ttl of zero means no expiry; use a tiny ttl instead.
        assert!(store.set_if_absent("k", "a", 1).await.unwrap());
        store
            .entries
            .get_mut("k")
            .unwrap()
            .expires_at
            .replace(Instant::now() - Duration::from_secs(1));
        assert!(store.set_if_absent("k", "b", 60).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn increment_counts_up_and_respects_reset() {
        let store = MemoryStore::new();
        assert_eq!(store.increment("c", 60).await.unwrap(), 1);
        assert_eq!(store.increment("c", 60).await.unwrap(), 2);
        store
            .entries
            .get_mut("c")
            .unwrap()
            .expires_at
            .replace(Instant::now() - Duration::from_secs(1));
        assert_eq!(store.increment("c", 60).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn pattern_delete_removes_matching_keys() {
        let store = MemoryStore::new();
        store.set("feed:user:1", "x", 0).await.unwrap();
        store.set("feed:user:2", "y", 0).await.unwrap();
        store.set("likes:post:1", "z", 0).await.unwrap();
        let removed = store.delete_pattern("feed:user:*").await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.get("likes:post:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sorted_set_range_orders_best_first() {
        let store = MemoryStore::new();
        store.sorted_set_add("z", "low", 1.0).await.unwrap();
        store.sorted_set_add("z", "high", 9.0).await.unwrap();
        store.sorted_set_add("z", "mid", 5.0).await.unwrap();
        let range = store.sorted_set_range("z", f64::MIN, f64::MAX).await.unwrap();
        assert_eq!(range, vec!["high", "mid", "low"]);
        assert_eq!(store.sorted_set_count("z", 2.0, 10.0).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn expired_sorted_set_reads_empty() {
        let store = MemoryStore::new();
        store.sorted_set_add("rank", "a", 1.0).await.unwrap();
        store.expire("rank", 60).await.unwrap();
        assert!(!store.sorted_set_range("rank", f64::MIN, f64::MAX).await.unwrap().is_empty());
        store
            .sorted_sets
            .get_mut("rank")
            .unwrap()
            .expires_at
            .replace(Instant::now() - Duration::from_secs(1));
        assert!(store.sorted_set_range("rank", f64::MIN, f64::MAX).await.unwrap().is_empty());
        assert!(!store.exists("rank").await.unwrap());
    }

    #[tokio::test]
    async fn trim_below_rolls_the_window() {
        let store = MemoryStore::new();
        store.sorted_set_add("w", "old", 10.0).await.unwrap();
        store.sorted_set_add("w", "new", 100.0).await.unwrap();
        assert_eq!(store.sorted_set_trim_below("w", 50.0).await.unwrap(), 1);
        let remaining = store.sorted_set_range("w", f64::MIN, f64::MAX).await.unwrap();
        assert_eq!(remaining, vec!["new"]);
    }

    #[tokio::test]
    async fn unavailable_store_errors_every_operation() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(store.get("k").await.is_err());
        assert!(store.set_if_absent("k", "v", 60).await.is_err());
        assert!(store.increment("c", 60).await.is_err());
    }

    #[test]
    fn glob_matching_covers_the_key_shapes() {
        assert!(glob_match("feed:user:*", "feed:user:42"));
        assert!(glob_match("user:9:*", "user:9:profile"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("feed:user:*", "likes:post:1"));
        assert!(!glob_match("exact", "exactly"));
    }
}
