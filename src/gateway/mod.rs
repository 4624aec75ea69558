//! Realtime gateway: wire messages, rate limiting, per-connection sessions.
//!
//! The websocket accept loop itself lives in [`crate::adapter::ws`]; this
//! module holds the transport-agnostic command surface so tests can drive
//! sessions without a socket.

mod messages;
mod rate_limit;
mod session;

pub use messages::{ClientCommand, ErrorCode, ServerMessage};
pub use rate_limit::RateLimiter;
pub use session::Session;
