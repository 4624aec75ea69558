//! Cross-process fan-out port.
//!
//! A user's devices may be attached to different server processes. The bus
//! carries broadcast envelopes between processes so a delivery addressed to
//! a user or topic reaches every live connection regardless of placement.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::domain::{TopicKey, UserId};
use crate::error::Result;

/// Addressing of one broadcast envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum BroadcastTarget {
    User { user_id: UserId },
    Topic { topic: TopicKey },
}

/// A serialized server message in flight between processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastEnvelope {
    /// Process that originated the envelope; subscribers skip their own.
    pub origin: String,
    pub target: BroadcastTarget,
    /// The serialized server message, delivered verbatim to sockets.
    pub message: String,
}

/// Port for publishing broadcast envelopes to peer processes.
///
/// Implementations: `RedisBus` (pub/sub, production) and `LocalBus`
/// (single-process no-op).
#[async_trait]
pub trait FanoutBus: Send + Sync {
    /// Publish an envelope to all peer processes. Best-effort: a bus
    /// outage must not fail local delivery.
    async fn publish(&self, envelope: &BroadcastEnvelope) -> Result<()>;

    /// Stream of envelopes published by peers (own-origin ones excluded).
    async fn subscribe(&self) -> Result<mpsc::Receiver<BroadcastEnvelope>>;
}
