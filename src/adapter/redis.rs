//! Redis-backed cache store and pub/sub fan-out bus.
//!
//! Redis is the one cross-process shared resource: the dedup claims,
//! counters and sliding windows all reduce to its atomic commands, and its
//! pub/sub carries broadcast envelopes between server processes.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{CacheError, Error, Result};
use crate::port::{BroadcastEnvelope, CacheResult, CacheStore, FanoutBus, StoreStats};

/// Pub/sub channel carrying broadcast envelopes between processes.
const FANOUT_CHANNEL: &str = "ripple:fanout";

/// Redis [`CacheStore`] adapter.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to redis; the connection manager reconnects on its own.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(CacheError::from)?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(CacheError::from)?;
        Ok(Self { manager })
    }

    async fn scan(&self, pattern: &str) -> CacheResult<Vec<String>> {
        // SCAN cursor loop; KEYS would block the server under load.
        let mut conn = self.manager.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.manager.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()> {
        let mut conn = self.manager.clone();
        if ttl_secs > 0 {
            conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        } else {
            conn.set::<_, _, ()>(key, value).await?;
        }
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<bool> {
        // SET NX EX is the atomic claim; no read-then-write.
        let mut conn = self.manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.manager.clone();
        Ok(conn.exists(key).await?)
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> CacheResult<()> {
        let mut conn = self.manager.clone();
        conn.expire::<_, ()>(key, ttl_secs as i64).await?;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        let keys = self.scan(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.manager.clone();
        let removed: u64 = conn.del(keys).await?;
        Ok(removed)
    }

    async fn increment(&self, key: &str, ttl_secs: u64) -> CacheResult<u64> {
        let mut conn = self.manager.clone();
        let count: u64 = conn.incr(key, 1).await?;
        if count == 1 && ttl_secs > 0 {
            // First increment created the key; start the window now so the
            // whole counter expires at once.
            conn.expire::<_, ()>(key, ttl_secs as i64).await?;
        }
        Ok(count)
    }

    async fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> CacheResult<()> {
        let mut conn = self.manager.clone();
        conn.zadd::<_, _, _, ()>(key, member, score).await?;
        Ok(())
    }

    async fn sorted_set_range(&self, key: &str, min: f64, max: f64) -> CacheResult<Vec<String>> {
        let mut conn = self.manager.clone();
        // Best score first.
        let members: Vec<String> = redis::cmd("ZREVRANGEBYSCORE")
            .arg(key)
            .arg(max)
            .arg(min)
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    async fn sorted_set_count(&self, key: &str, min: f64, max: f64) -> CacheResult<u64> {
        let mut conn = self.manager.clone();
        Ok(conn.zcount(key, min, max).await?)
    }

    async fn sorted_set_trim_below(&self, key: &str, min: f64) -> CacheResult<u64> {
        let mut conn = self.manager.clone();
        let removed: u64 = redis::cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg("-inf")
            .arg(format!("({min}"))
            .query_async(&mut conn)
            .await?;
        Ok(removed)
    }

    async fn scan_keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        self.scan(pattern).await
    }

    async fn stats(&self) -> CacheResult<StoreStats> {
        // INFO keyspace aggregates key and expiry counts server-side; no
        // per-key scanning.
        let mut conn = self.manager.clone();
        let info: String = redis::cmd("INFO")
            .arg("keyspace")
            .query_async(&mut conn)
            .await?;
        Ok(parse_keyspace_info(&info))
    }
}

/// Parse `INFO keyspace` output, e.g. `db0:keys=42,expires=17,avg_ttl=0`.
fn parse_keyspace_info(info: &str) -> StoreStats {
    let mut stats = StoreStats::default();
    for line in info.lines() {
        let Some((db, fields)) = line.split_once(':') else {
            continue;
        };
        if !db.starts_with("db") {
            continue;
        }
        for field in fields.split(',') {
            match field.split_once('=') {
                Some(("keys", n)) => stats.total_keys += n.trim().parse().unwrap_or(0),
                Some(("expires", n)) => stats.keys_with_ttl += n.trim().parse().unwrap_or(0),
                _ => {}
            }
        }
    }
    stats
}

/// Redis pub/sub [`FanoutBus`] adapter.
pub struct RedisBus {
    client: redis::Client,
    manager: ConnectionManager,
    /// This process's identity; envelopes it published are dropped on the
    /// subscribe side.
    origin: String,
}

impl RedisBus {
    pub async fn connect(url: &str, origin: String) -> Result<Self> {
        let client = redis::Client::open(url).map_err(CacheError::from)?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(CacheError::from)?;
        Ok(Self {
            client,
            manager,
            origin,
        })
    }
}

#[async_trait]
impl FanoutBus for RedisBus {
    async fn publish(&self, envelope: &BroadcastEnvelope) -> Result<()> {
        let payload = serde_json::to_string(envelope)?;
        let mut conn = self.manager.clone();
        conn.publish::<_, _, ()>(FANOUT_CHANNEL, payload)
            .await
            .map_err(|e| Error::Cache(CacheError::from(e)))?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<BroadcastEnvelope>> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(CacheError::from)?;
        pubsub
            .subscribe(FANOUT_CHANNEL)
            .await
            .map_err(CacheError::from)?;

        let (tx, rx) = mpsc::channel(256);
        let origin = self.origin.clone();
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, "Undecodable fan-out payload");
                        continue;
                    }
                };
                let envelope: BroadcastEnvelope = match serde_json::from_str(&payload) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!(error = %e, "Malformed fan-out envelope");
                        continue;
                    }
                };
                if envelope.origin == origin {
                    continue;
                }
                if tx.send(envelope).await.is_err() {
                    debug!("Fan-out subscriber dropped, stopping pump");
                    break;
                }
            }
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyspace_info_parses_key_and_expiry_counts() {
        let info = "# Keyspace\r\ndb0:keys=42,expires=17,avg_ttl=3600\r\ndb1:keys=8,expires=0,avg_ttl=0\r\n";
        let stats = parse_keyspace_info(info);
        assert_eq!(stats.total_keys, 50);
        assert_eq!(stats.keys_with_ttl, 17);
    }

    #[test]
    fn empty_keyspace_info_is_zero() {
        let stats = parse_keyspace_info("# Keyspace\r\n");
        assert_eq!(stats.total_keys, 0);
        assert_eq!(stats.keys_with_ttl, 0);
    }
}
