//! Notification filter: preference, frequency, reputation, importance.
//!
//! A four-stage decision pipeline run before any notification-class event
//! is delivered. Stages short-circuit on block. Stages 1-3 fail open: an
//! infrastructure error while evaluating a check admits the notification,
//! because losing a legitimate notification to a cache blip is worse than
//! letting one through unfiltered. That trade-off is deliberate and the
//! fail-open path logs loudly enough to audit.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::FilterConfig;
use crate::domain::{
    BlockReason, FilterDecision, InteractionHistory, NotificationKind, NotificationPreference,
    UserId,
};
use crate::port::{CacheStore, ProfileStore};

/// Inputs the importance heuristic looks at.
#[derive(Debug, Clone)]
pub struct NotificationContext {
    pub recipient_id: UserId,
    pub kind: NotificationKind,
    pub sender_id: Option<UserId>,
}

pub struct NotificationFilter {
    store: Arc<dyn CacheStore>,
    profiles: Arc<dyn ProfileStore>,
    config: FilterConfig,
}

impl NotificationFilter {
    #[must_use]
    pub fn new(
        store: Arc<dyn CacheStore>,
        profiles: Arc<dyn ProfileStore>,
        config: FilterConfig,
    ) -> Self {
        Self {
            store,
            profiles,
            config,
        }
    }

    /// Run the pipeline for one notification.
    pub async fn evaluate(&self, ctx: &NotificationContext) -> FilterDecision {
        if let Some(reason) = self.check_preference(ctx).await {
            debug!(recipient = %ctx.recipient_id, kind = ctx.kind.as_str(), reason = reason.as_str(), "Notification blocked");
            return FilterDecision::Block(reason);
        }
        if let Some(reason) = self.check_frequency(ctx).await {
            debug!(recipient = %ctx.recipient_id, kind = ctx.kind.as_str(), reason = reason.as_str(), "Notification blocked");
            return FilterDecision::Block(reason);
        }
        if let Some(reason) = self.check_reputation(ctx).await {
            debug!(recipient = %ctx.recipient_id, kind = ctx.kind.as_str(), reason = reason.as_str(), "Notification blocked");
            return FilterDecision::Block(reason);
        }

        let importance = self.importance_score(ctx).await;
        if importance < self.config.batching_importance_threshold {
            // Batching is a future aggregation hook; delivery proceeds now.
            debug!(
                recipient = %ctx.recipient_id,
                kind = ctx.kind.as_str(),
                importance,
                "Low-importance notification, batching suggested"
            );
            return FilterDecision::AdmitWithBatchingSuggested;
        }
        FilterDecision::Admit
    }

    /// Stage 1: recipient preference. Fails open on store errors.
    async fn check_preference(&self, ctx: &NotificationContext) -> Option<BlockReason> {
        let prefs = match self.profiles.notification_preference(&ctx.recipient_id).await {
            Ok(Some(prefs)) => prefs,
            Ok(None) => NotificationPreference::default(),
            Err(e) => {
                warn!(recipient = %ctx.recipient_id, error = %e, "Preference lookup failed, admitting");
                return None;
            }
        };
        if prefs.allows(ctx.kind) {
            None
        } else {
            Some(BlockReason::UserPreference)
        }
    }

    /// Stage 2: frequency budget per (recipient, kind class).
    ///
    /// The counter is an atomic increment with a TTL, so the whole window
    /// expires at once and rollover re-admits identical notifications.
    async fn check_frequency(&self, ctx: &NotificationContext) -> Option<BlockReason> {
        let key = format!(
            "freq:{}:{}",
            ctx.recipient_id,
            ctx.kind.as_str()
        );
        let threshold = self.config.frequency_threshold_for(ctx.kind.as_str());
        match self
            .store
            .increment(&key, self.config.frequency_window_secs)
            .await
        {
            Ok(count) if count > u64::from(threshold) => {
                Some(BlockReason::FrequencyLimitExceeded)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(recipient = %ctx.recipient_id, error = %e, "Frequency check failed, admitting");
                None
            }
        }
    }

    /// Stage 3: sender reputation and per-pair abuse detection.
    ///
    /// The pair's send history is a timestamp-scored sorted set; entries
    /// roll off as the window slides.
    async fn check_reputation(&self, ctx: &NotificationContext) -> Option<BlockReason> {
        let Some(sender_id) = &ctx.sender_id else {
            // System notifications have no sender to judge.
            return None;
        };

        match self.profiles.is_blacklisted(sender_id).await {
            Ok(true) => return Some(BlockReason::SpamOrAbuse),
            Ok(false) => {}
            Err(e) => {
                warn!(sender = %sender_id, error = %e, "Blacklist lookup failed, admitting");
            }
        }

        let key = format!("sends:{}:{}", sender_id, ctx.recipient_id);
        let now = Utc::now().timestamp() as f64;
        let window_start = now - self.config.abuse_window_secs as f64;
        let member = format!("{}:{}", now, uuid::Uuid::new_v4());

        if let Err(e) = self.store.sorted_set_add(&key, &member, now).await {
            warn!(sender = %sender_id, error = %e, "Send tracking failed, admitting");
            return None;
        }
        if let Err(e) = self.store.sorted_set_trim_below(&key, window_start).await {
            warn!(sender = %sender_id, error = %e, "Send window trim failed");
        }
        match self.store.sorted_set_count(&key, window_start, now).await {
            Ok(count) if count > u64::from(self.config.abuse_threshold) => {
                Some(BlockReason::SpamOrAbuse)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(sender = %sender_id, error = %e, "Abuse count failed, admitting");
                None
            }
        }
    }

    /// Stage 4: importance heuristic.
    ///
    /// A follower's action matters more than a stranger's, and a recipient
    /// who rarely opens notifications drags the score down. Never blocks;
    /// only suggests batching.
    async fn importance_score(&self, ctx: &NotificationContext) -> f64 {
        let mut score: f64 = match ctx.kind {
            NotificationKind::Mention => 0.9,
            NotificationKind::Comment => 0.7,
            NotificationKind::Follow => 0.6,
            NotificationKind::Like => 0.4,
            NotificationKind::Recommendation => 0.3,
            NotificationKind::System => 0.8,
        };

        if let Some(sender_id) = &ctx.sender_id {
            match self.profiles.follows(&ctx.recipient_id, sender_id).await {
                Ok(true) => score += 0.2,
                Ok(false) => score -= 0.1,
                Err(_) => {}
            }
        }

        let engagement = match self.profiles.interaction_history(&ctx.recipient_id).await {
            Ok(InteractionHistory { engagement_rate, .. }) => engagement_rate,
            Err(_) => 0.5,
        };
        score += (engagement - 0.5) * 0.4;
        score.clamp(0.0, 1.0)
    }
}
