//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! Ports are the seams where this subsystem meets external systems: the
//! cache store, the client transport, the cross-process fan-out bus, the
//! account service's token verification, and the profile/history store.
//! Each has a production adapter in [`crate::adapter`] and a test double in
//! the testkit.

mod auth;
mod bus;
mod cache;
mod profile;
mod transport;

pub use auth::{TokenClaims, TokenVerifier};
pub use bus::{BroadcastEnvelope, BroadcastTarget, FanoutBus};
pub use cache::{CacheResult, CacheStore, StoreStats};
pub use profile::ProfileStore;
pub use transport::{ClientTransport, DeliveryResult};
