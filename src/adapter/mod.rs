//! Implementations of ports (hexagonal adapters).

mod http_auth;
mod memory;
mod profiles;
mod redis;
pub mod ws;

pub use http_auth::HttpVerifier;
pub use memory::{LocalBus, MemoryStore};
pub use profiles::StaticProfiles;
pub use self::redis::{RedisBus, RedisStore};
pub use ws::{GatewayDeps, WsServer, WsTransport};
