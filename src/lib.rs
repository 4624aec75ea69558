//! Ripple - realtime event distribution over WebSocket.
//!
//! Ripple pushes social events (likes, comments, presence, feed updates,
//! trending content, personalized recommendations, notifications) to
//! connected clients with at-most-once semantics. Duplicate suppression,
//! notification filtering and trending computation all hang off a shared
//! cache store.
//!
//! # Architecture
//!
//! Hexagonal: domain types and services in the middle, ports at the seams,
//! adapters on the outside.
//!
//! - [`domain`] - Events, topics, identifiers, notification and
//!   recommendation types
//! - [`port`] - Trait seams: cache store, client transport, fan-out bus,
//!   token verification, profile store
//! - [`cache`] - Event cache service: dedup claims, invalidation, warming,
//!   hit/miss accounting
//! - [`registry`] - Connection registry: user and topic indexes, local
//!   delivery, cross-process fan-out
//! - [`gateway`] - Wire protocol and per-connection session state machine
//! - [`filter`] - Four-stage notification admission filter
//! - [`emitter`] - Event emission pipeline: dedup, filter, fan-out
//! - [`engine`] - Trending detection and personalized recommendations
//! - [`adapter`] - Redis store and bus, websocket server, token
//!   introspection client, in-memory fallbacks
//! - [`app`] - Service graph wiring and scheduled jobs
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ripple::adapter::{LocalBus, MemoryStore, StaticProfiles};
//! use ripple::app::App;
//! use ripple::config::Config;
//!
//! let app = App::build(
//!     Config::default(),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(LocalBus::new()),
//!     Arc::new(StaticProfiles::new()),
//! );
//! ```

pub mod adapter;
pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod domain;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod port;
pub mod registry;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
