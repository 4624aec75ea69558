//! Configuration loading from TOML files.
//!
//! Secrets (redis URL, auth service endpoint) may be overridden through the
//! environment so they never have to live in the config file.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

use crate::domain::EventClass;
use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub auth: AuthConfig,
    pub cache: CacheConfig,
    pub dedup: DedupConfig,
    pub filter: FilterConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

/// Gateway bind address and per-connection rate limiting.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind_addr: String,
    /// Commands allowed per connection per window.
    pub rate_limit_max_commands: u32,
    pub rate_limit_window_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9030".into(),
            rate_limit_max_commands: 60,
            rate_limit_window_secs: 60,
        }
    }
}

/// Token verification against the account service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Introspection endpoint; `RIPPLE_AUTH_URL` overrides.
    pub introspect_url: String,
    /// Hard ceiling on credential resolution; on timeout the connection
    /// stays unauthenticated instead of hanging the handshake.
    pub verify_timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            introspect_url: "http://127.0.0.1:9000/auth/introspect".into(),
            verify_timeout_secs: 5,
        }
    }
}

/// Cache store connection and content TTLs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Redis connection URL; `RIPPLE_REDIS_URL` overrides.
    pub redis_url: String,
    pub feed_ttl_secs: u64,
    pub likes_ttl_secs: u64,
    pub popular_ttl_secs: u64,
    pub trending_ttl_secs: u64,
    /// Interval between maintenance sweeps of expired bookkeeping keys.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".into(),
            feed_ttl_secs: 300,
            likes_ttl_secs: 60,
            popular_ttl_secs: 600,
            trending_ttl_secs: 900,
            sweep_interval_secs: 600,
        }
    }
}

/// Dedup TTLs per event class, in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub like_ttl_secs: u64,
    pub comment_ttl_secs: u64,
    pub presence_ttl_secs: u64,
    pub feed_update_ttl_secs: u64,
    pub trending_ttl_secs: u64,
    pub recommendation_ttl_secs: u64,
    pub notification_ttl_secs: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            like_ttl_secs: 60,
            comment_ttl_secs: 300,
            presence_ttl_secs: 60,
            feed_update_ttl_secs: 120,
            trending_ttl_secs: 3_600,
            recommendation_ttl_secs: 86_400,
            notification_ttl_secs: 600,
        }
    }
}

impl DedupConfig {
    /// TTL for the dedupe marker of the given event class.
    #[must_use]
    pub fn ttl_for(&self, class: EventClass) -> u64 {
        match class {
            EventClass::Like => self.like_ttl_secs,
            EventClass::Comment => self.comment_ttl_secs,
            EventClass::Presence => self.presence_ttl_secs,
            EventClass::FeedUpdate => self.feed_update_ttl_secs,
            EventClass::Trending => self.trending_ttl_secs,
            EventClass::Recommendation => self.recommendation_ttl_secs,
            EventClass::Notification => self.notification_ttl_secs,
        }
    }
}

/// Notification filter thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Notifications of one class a recipient may receive per window.
    pub frequency_threshold: u32,
    /// Per-kind overrides of the frequency threshold, keyed by kind label
    /// ("like", "comment", ...). Kinds not listed use the default.
    pub frequency_overrides: HashMap<String, u32>,
    pub frequency_window_secs: u64,
    /// Sends from one sender to one recipient within the abuse window
    /// before the pair is treated as blacklisted.
    pub abuse_threshold: u32,
    pub abuse_window_secs: u64,
    /// Importance score below which delivery is flagged for batching.
    pub batching_importance_threshold: f64,
}

impl FilterConfig {
    /// Frequency threshold for the given kind label.
    #[must_use]
    pub fn frequency_threshold_for(&self, kind: &str) -> u32 {
        self.frequency_overrides
            .get(kind)
            .copied()
            .unwrap_or(self.frequency_threshold)
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            frequency_threshold: 20,
            frequency_overrides: HashMap::new(),
            frequency_window_secs: 3_600,
            abuse_threshold: 15,
            abuse_window_secs: 3_600,
            batching_importance_threshold: 0.3,
        }
    }
}

/// Recommendation/trending engine tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rolling window for trending computation, in hours.
    pub trending_window_hours: u32,
    pub trending_interval_secs: u64,
    pub trending_size: usize,
    /// Users active within this window receive trending pushes.
    pub active_window_secs: u64,
    /// Hard cap on recommendations returned regardless of requested limit.
    pub max_recommendations: usize,
    pub weight_update_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trending_window_hours: 24,
            trending_interval_secs: 900,
            trending_size: 10,
            active_window_secs: 1_800,
            max_recommendations: 50,
            weight_update_interval_secs: 3_600,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

impl LoggingConfig {
    /// Initialize the tracing subscriber with this logging configuration.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.format.as_str() {
            "json" => {
                fmt().json().with_env_filter(filter).init();
            }
            _ => {
                fmt().with_env_filter(filter).init();
            }
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the TOML is malformed,
    /// or validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        let mut config: Self = toml::from_str(&content).map_err(ConfigError::Parse)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Environment overrides for values that should not live in the file.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("RIPPLE_REDIS_URL") {
            self.cache.redis_url = url;
        }
        if let Ok(url) = std::env::var("RIPPLE_AUTH_URL") {
            self.auth.introspect_url = url;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.gateway.bind_addr.is_empty() {
            return Err(ConfigError::MissingField {
                field: "gateway.bind_addr",
            }
            .into());
        }
        if self.gateway.rate_limit_max_commands == 0 {
            return Err(ConfigError::InvalidValue {
                field: "gateway.rate_limit_max_commands",
                reason: "must be at least 1".into(),
            }
            .into());
        }
        if self.filter.frequency_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "filter.frequency_threshold",
                reason: "must be at least 1".into(),
            }
            .into());
        }
        if self.engine.max_recommendations == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.max_recommendations",
                reason: "must be at least 1".into(),
            }
            .into());
        }
        if self.engine.trending_window_hours == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.trending_window_hours",
                reason: "must be at least 1".into(),
            }
            .into());
        }
        Ok(())
    }

    /// Initialize logging with the configured settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.filter.frequency_threshold, 20);
        assert_eq!(config.engine.max_recommendations, 50);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [filter]
            frequency_threshold = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.filter.frequency_threshold, 5);
        assert_eq!(config.filter.abuse_threshold, 15);
    }

    #[test]
    fn zero_rate_limit_fails_validation() {
        let config: Config = toml::from_str(
            r#"
            [gateway]
            rate_limit_max_commands = 0
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn dedup_ttl_lookup_covers_every_class() {
        let dedup = DedupConfig::default();
        assert_eq!(dedup.ttl_for(EventClass::Like), 60);
        assert_eq!(dedup.ttl_for(EventClass::Recommendation), 86_400);
    }
}
