//! Shared harness for integration tests: a fully wired service graph over
//! in-memory adapters, plus helpers for driving sessions.

use std::sync::Arc;

use ripple::adapter::{LocalBus, MemoryStore, StaticProfiles};
use ripple::app::App;
use ripple::cache::EventCacheService;
use ripple::config::Config;
use ripple::domain::ConnectionId;
use ripple::emitter::EventEmitter;
use ripple::engine::RecommendationEngine;
use ripple::gateway::Session;
use ripple::port::{CacheStore, ClientTransport, ProfileStore, TokenVerifier};
use ripple::registry::ConnectionRegistry;
use ripple::testkit::{RecordingTransport, StaticVerifier};

pub struct TestApp {
    pub config: Config,
    pub store: Arc<MemoryStore>,
    pub profiles: Arc<StaticProfiles>,
    pub verifier: Arc<StaticVerifier>,
    pub registry: Arc<ConnectionRegistry>,
    pub cache: Arc<EventCacheService>,
    pub emitter: Arc<EventEmitter>,
    pub engine: Arc<RecommendationEngine>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let profiles = Arc::new(StaticProfiles::new());
        let verifier = Arc::new(StaticVerifier::new());
        let app = App::build(
            config.clone(),
            Arc::clone(&store) as Arc<dyn CacheStore>,
            Arc::new(LocalBus::new()),
            Arc::clone(&profiles) as Arc<dyn ProfileStore>,
        );
        Self {
            config,
            store,
            profiles,
            verifier,
            registry: app.registry,
            cache: app.cache,
            emitter: app.emitter,
            engine: app.engine,
        }
    }

    /// Register a fresh connection backed by a recording transport.
    pub fn connect(&self) -> (Session, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let session = Session::new(
            ConnectionId::generate(),
            Arc::clone(&transport) as Arc<dyn ClientTransport>,
            Arc::clone(&self.registry),
            Arc::clone(&self.verifier) as Arc<dyn TokenVerifier>,
            Arc::clone(&self.engine),
            Arc::clone(&self.cache),
            &self.config.gateway,
            self.config.auth.clone(),
        );
        session.register();
        (session, transport)
    }

    /// Connect and authenticate as `user_id` in one step.
    pub async fn connect_as(&self, user_id: &str) -> (Session, Arc<RecordingTransport>) {
        let token = format!("token-{user_id}");
        self.verifier.allow(&token, user_id);
        let (session, transport) = self.connect();
        session.authenticate(&token).await;
        (session, transport)
    }
}
