//! Client transport port.

use async_trait::async_trait;

/// Outcome of a best-effort push to one connection.
///
/// Delivery failure is expected operational behavior (the socket may be
/// gone), so this is a plain value, never an `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Delivered,
    /// The transport rejected or dropped the message; the reason is logged
    /// by the caller, not surfaced to the triggering actor.
    Failed(String),
}

impl DeliveryResult {
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Port for pushing serialized server messages to one connected client.
///
/// Implementations: `WsTransport` (production websocket writer) and the
/// testkit's `RecordingTransport`.
#[async_trait]
pub trait ClientTransport: Send + Sync {
    /// Push one serialized message. Must not block on a stalled peer
    /// beyond the transport's own bounded buffering.
    async fn send(&self, message: String) -> DeliveryResult;

    /// Ask the transport to close the connection gracefully.
    async fn close(&self);
}
