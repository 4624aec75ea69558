//! App orchestration module.
//!
//! Builds the full service graph explicitly — store, cache service,
//! registry, filter, emitter, engine, gateway — and runs the accept loop
//! alongside the scheduled jobs. Construction is plain dependency
//! injection; nothing initializes itself on first use.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapter::{
    GatewayDeps, HttpVerifier, LocalBus, MemoryStore, RedisBus, RedisStore, StaticProfiles,
    WsServer,
};
use crate::cache::EventCacheService;
use crate::config::Config;
use crate::emitter::EventEmitter;
use crate::engine::RecommendationEngine;
use crate::error::Result;
use crate::filter::NotificationFilter;
use crate::port::{CacheStore, FanoutBus, ProfileStore, TokenVerifier};
use crate::registry::ConnectionRegistry;

/// Fully wired service graph.
pub struct App {
    pub registry: Arc<ConnectionRegistry>,
    pub cache: Arc<EventCacheService>,
    pub emitter: Arc<EventEmitter>,
    pub engine: Arc<RecommendationEngine>,
    config: Config,
    bus: Arc<dyn FanoutBus>,
}

impl App {
    /// Construct every service against the given ports.
    #[must_use]
    pub fn build(
        config: Config,
        store: Arc<dyn CacheStore>,
        bus: Arc<dyn FanoutBus>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        let origin = Uuid::new_v4().to_string();
        let registry = Arc::new(ConnectionRegistry::new(Arc::clone(&bus), origin));
        let cache = Arc::new(EventCacheService::new(
            Arc::clone(&store),
            config.cache.clone(),
        ));
        let filter = Arc::new(NotificationFilter::new(
            Arc::clone(&store),
            Arc::clone(&profiles),
            config.filter.clone(),
        ));
        let emitter = Arc::new(EventEmitter::new(
            Arc::clone(&cache),
            filter,
            Arc::clone(&registry),
            config.dedup.clone(),
        ));
        let engine = Arc::new(RecommendationEngine::new(
            profiles,
            store,
            Arc::clone(&cache),
            Arc::clone(&emitter),
            config.engine.clone(),
        ));
        Self {
            registry,
            cache,
            emitter,
            engine,
            config,
            bus,
        }
    }

    /// Connect real adapters from config and run until the task is
    /// cancelled. Falls back to the in-memory store when redis is down so
    /// a single process still serves events (dedup scoped to the process).
    pub async fn run(config: Config) -> Result<()> {
        let (store, bus): (Arc<dyn CacheStore>, Arc<dyn FanoutBus>) =
            match RedisStore::connect(&config.cache.redis_url).await {
                Ok(store) => {
                    let bus = RedisBus::connect(
                        &config.cache.redis_url,
                        Uuid::new_v4().to_string(),
                    )
                    .await?;
                    (Arc::new(store), Arc::new(bus))
                }
                Err(e) => {
                    warn!(error = %e, "Redis unreachable, running with in-memory store");
                    (Arc::new(MemoryStore::new()), Arc::new(LocalBus::new()))
                }
            };

        let profiles: Arc<dyn ProfileStore> = Arc::new(StaticProfiles::new());
        let verifier: Arc<dyn TokenVerifier> =
            Arc::new(HttpVerifier::new(config.auth.introspect_url.clone()));

        let app = Self::build(config, store, bus, profiles);
        app.spawn_jobs();
        app.spawn_fanout_pump();

        let server = WsServer::new(GatewayDeps {
            registry: Arc::clone(&app.registry),
            verifier,
            engine: Arc::clone(&app.engine),
            cache: Arc::clone(&app.cache),
            gateway_config: app.config.gateway.clone(),
            auth_config: app.config.auth.clone(),
        });

        tokio::select! {
            result = server.run() => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, closing connections");
                app.registry.close_all().await;
                Ok(())
            }
        }
    }

    /// Scheduled jobs: trending recompute + push, weight aggregation,
    /// cache maintenance sweep.
    pub fn spawn_jobs(&self) {
        let engine = Arc::clone(&self.engine);
        let trending_every = Duration::from_secs(self.config.engine.trending_interval_secs);
        tokio::spawn(async move {
            let mut tick = interval(trending_every);
            loop {
                tick.tick().await;
                let items = engine.detect_trending_content().await;
                engine.notify_trending_content(&items).await;
            }
        });

        let engine = Arc::clone(&self.engine);
        let weights_every = Duration::from_secs(self.config.engine.weight_update_interval_secs);
        tokio::spawn(async move {
            let mut tick = interval(weights_every);
            loop {
                tick.tick().await;
                engine.update_recommendation_algorithm().await;
            }
        });

        let cache = Arc::clone(&self.cache);
        let sweep_every = Duration::from_secs(self.config.cache.sweep_interval_secs);
        tokio::spawn(async move {
            let mut tick = interval(sweep_every);
            loop {
                tick.tick().await;
                let removed = cache.clean_expired_keys("*").await;
                if removed > 0 {
                    info!(removed, "Maintenance sweep collected expired keys");
                }
            }
        });
    }

    /// Pump envelopes published by peer processes into the local registry.
    pub fn spawn_fanout_pump(&self) {
        let registry = Arc::clone(&self.registry);
        let bus = Arc::clone(&self.bus);
        tokio::spawn(async move {
            let mut rx = match bus.subscribe().await {
                Ok(rx) => rx,
                Err(e) => {
                    warn!(error = %e, "Fan-out subscription failed, cross-process delivery off");
                    return;
                }
            };
            while let Some(envelope) = rx.recv().await {
                registry.apply_envelope(&envelope).await;
            }
        });
    }
}
