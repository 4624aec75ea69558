use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::port::{ClientTransport, DeliveryResult};

/// [`ClientTransport`] that records every payload instead of sending it.
///
/// Flip [`fail_sends`](Self::fail_sends) to stand in for a dead socket.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<String>>,
    failing: AtomicBool,
    closed: AtomicBool,
}

impl RecordingTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent send report failure.
    pub fn fail_sends(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Everything sent so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Sent payloads parsed as JSON values.
    #[must_use]
    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .iter()
            .filter_map(|raw| serde_json::from_str(raw).ok())
            .collect()
    }

    /// Payloads whose `type` field equals `message_type`.
    #[must_use]
    pub fn sent_of_type(&self, message_type: &str) -> Vec<serde_json::Value> {
        self.sent_json()
            .into_iter()
            .filter(|value| value["type"] == message_type)
            .collect()
    }

    #[must_use]
    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientTransport for RecordingTransport {
    async fn send(&self, message: String) -> DeliveryResult {
        if self.failing.load(Ordering::SeqCst) {
            return DeliveryResult::Failed("recording transport set to fail".into());
        }
        self.sent.lock().push(message);
        DeliveryResult::Delivered
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
