//! Per-connection sliding-window rate limiting.
//!
//! Connections are process-local, so the window lives in process memory;
//! no cache round-trip on the command hot path.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Sliding-window command limiter for one connection.
pub struct RateLimiter {
    max_commands: u32,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_commands: u32, window: Duration) -> Self {
        Self {
            max_commands,
            window,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Record one command attempt; returns `false` when over the limit.
    ///
    /// Rejected attempts are not recorded, so a client hammering the limit
    /// recovers as soon as the window slides past its admitted commands.
    pub fn check(&self) -> bool {
        self.check_at(Instant::now())
    }

    fn check_at(&self, now: Instant) -> bool {
        let mut timestamps = self.timestamps.lock();
        while let Some(front) = timestamps.front() {
            if now.duration_since(*front) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
        if timestamps.len() >= self.max_commands as usize {
            return false;
        }
        timestamps.push_back(now);
        true
    }
}
