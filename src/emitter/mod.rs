//! Event emitter: the single entry point for all domain events.
//!
//! Every live update flows through here, in order: derive the dedupe key,
//! claim it atomically, run the notification filter where the event class
//! calls for it, resolve delivery targets through the registry, push.
//!
//! Delivery is at-most-once and best-effort. There is no durable queue: if
//! nobody is connected the event is simply not delivered. Per-target
//! failures are collected and logged, never raised — one dead socket must
//! not block a broadcast to the rest.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::EventCacheService;
use crate::config::DedupConfig;
use crate::domain::{
    BlockReason, CommentEvent, Event, FeedUpdateEvent, FilterDecision, LikeEvent,
    NotificationEvent, NotificationKind, PresenceEvent, PresenceStatus, RecommendationEvent,
    RecommendationItem, TopicKey, TrendingEvent, UserId,
};
use crate::filter::{NotificationContext, NotificationFilter};
use crate::gateway::ServerMessage;
use crate::registry::ConnectionRegistry;

/// What happened to one emitted event.
#[derive(Debug, Clone, Default)]
pub struct EmitReport {
    /// Local deliveries that succeeded.
    pub delivered: usize,
    /// The dedupe key was already claimed; the event was dropped silently.
    pub deduped: bool,
    /// The notification filter blocked delivery.
    pub blocked: Option<BlockReason>,
    /// The filter admitted the event but flagged it for future batching.
    pub batch_suggested: bool,
}

impl EmitReport {
    fn deduped() -> Self {
        Self {
            deduped: true,
            ..Self::default()
        }
    }

    fn blocked(reason: BlockReason) -> Self {
        Self {
            blocked: Some(reason),
            ..Self::default()
        }
    }
}

/// Counters exposed for observability.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmitterMetrics {
    pub emitted: u64,
    pub deduplicated: u64,
    pub filtered: u64,
    pub batch_suggestions: u64,
}

/// Normalizes, deduplicates, filters and fans out domain events.
///
/// Constructed explicitly at startup and passed by handle to every caller;
/// there is no global instance.
pub struct EventEmitter {
    cache: Arc<EventCacheService>,
    filter: Arc<NotificationFilter>,
    registry: Arc<ConnectionRegistry>,
    dedup: DedupConfig,
    emitted: AtomicU64,
    deduplicated: AtomicU64,
    filtered: AtomicU64,
    batch_suggestions: AtomicU64,
}

impl EventEmitter {
    #[must_use]
    pub fn new(
        cache: Arc<EventCacheService>,
        filter: Arc<NotificationFilter>,
        registry: Arc<ConnectionRegistry>,
        dedup: DedupConfig,
    ) -> Self {
        Self {
            cache,
            filter,
            registry,
            dedup,
            emitted: AtomicU64::new(0),
            deduplicated: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            batch_suggestions: AtomicU64::new(0),
        }
    }

    /// A like was added or removed.
    ///
    /// Fans out to the content topic; the content author additionally gets
    /// a filtered direct delivery (their devices may not be on the topic).
    pub async fn emit_like(&self, event: LikeEvent) -> EmitReport {
        let wrapped = Event::Like(event.clone());
        if self.is_duplicate(&wrapped).await {
            return self.record_dedupe(&wrapped);
        }

        let message = ServerMessage::PostLiked {
            content_id: event.content_id.clone(),
            liker_id: event.liker_id.clone(),
            liker_username: event.liker_username.clone(),
            is_liked: event.is_liked,
            total_likes: event.total_likes,
        };

        let topic = TopicKey::content(event.content_type, event.content_id.clone());
        let mut delivered = self.registry.broadcast_topic(&topic, &message).await;

        // Keep the cached like total current for cold reads.
        self.cache
            .warm_content_likes(event.content_type, &event.content_id, event.total_likes)
            .await;

        let mut report = EmitReport::default();
        // Self-likes never notify.
        if event.author_id != event.liker_id {
            let decision = self
                .filter
                .evaluate(&NotificationContext {
                    recipient_id: event.author_id.clone(),
                    kind: NotificationKind::Like,
                    sender_id: Some(event.liker_id.clone()),
                })
                .await;
            match decision {
                FilterDecision::Block(reason) => {
                    self.filtered.fetch_add(1, Ordering::Relaxed);
                    report.blocked = Some(reason);
                }
                admitted => {
                    if matches!(admitted, FilterDecision::AdmitWithBatchingSuggested) {
                        self.batch_suggestions.fetch_add(1, Ordering::Relaxed);
                        report.batch_suggested = true;
                    }
                    delivered += self.registry.broadcast_user(&event.author_id, &message).await;
                }
            }
        }

        self.emitted.fetch_add(1, Ordering::Relaxed);
        report.delivered = delivered;
        report
    }

    /// A comment was created.
    pub async fn emit_comment(&self, event: CommentEvent) -> EmitReport {
        let wrapped = Event::Comment(event.clone());
        if self.is_duplicate(&wrapped).await {
            return self.record_dedupe(&wrapped);
        }

        let message = ServerMessage::CommentCreated {
            comment_id: event.comment_id.clone(),
            content_id: event.content_id.clone(),
            commenter_id: event.commenter_id.clone(),
            commenter_username: event.commenter_username.clone(),
            content: event.content.clone(),
        };

        let topic = TopicKey::content(crate::domain::ContentType::Post, event.content_id.clone());
        let mut delivered = self.registry.broadcast_topic(&topic, &message).await;

        let mut report = EmitReport::default();
        if event.author_id != event.commenter_id {
            let decision = self
                .filter
                .evaluate(&NotificationContext {
                    recipient_id: event.author_id.clone(),
                    kind: NotificationKind::Comment,
                    sender_id: Some(event.commenter_id.clone()),
                })
                .await;
            match decision {
                FilterDecision::Block(reason) => {
                    self.filtered.fetch_add(1, Ordering::Relaxed);
                    report.blocked = Some(reason);
                }
                admitted => {
                    if matches!(admitted, FilterDecision::AdmitWithBatchingSuggested) {
                        self.batch_suggestions.fetch_add(1, Ordering::Relaxed);
                        report.batch_suggested = true;
                    }
                    delivered += self.registry.broadcast_user(&event.author_id, &message).await;
                }
            }
        }

        self.emitted.fetch_add(1, Ordering::Relaxed);
        report.delivered = delivered;
        report
    }

    /// A user's presence changed; push to each follower.
    pub async fn emit_presence(&self, follower_ids: &[UserId], event: PresenceEvent) -> EmitReport {
        let wrapped = Event::Presence(event.clone());
        if self.is_duplicate(&wrapped).await {
            return self.record_dedupe(&wrapped);
        }

        let message = match event.status {
            PresenceStatus::Online => ServerMessage::UserOnline {
                user_id: event.user_id.clone(),
                username: event.username.clone(),
            },
            PresenceStatus::Offline => ServerMessage::UserOffline {
                user_id: event.user_id.clone(),
                username: event.username.clone(),
            },
        };

        let mut delivered = 0;
        for follower in follower_ids {
            delivered += self.registry.broadcast_user(follower, &message).await;
        }

        self.emitted.fetch_add(1, Ordering::Relaxed);
        EmitReport {
            delivered,
            ..EmitReport::default()
        }
    }

    /// Feed changed for a set of users.
    pub async fn emit_feed_update(
        &self,
        target_user_ids: &[UserId],
        event: FeedUpdateEvent,
    ) -> EmitReport {
        let wrapped = Event::FeedUpdate(event.clone());
        if self.is_duplicate(&wrapped).await {
            return self.record_dedupe(&wrapped);
        }

        let message = ServerMessage::FeedUpdate {
            reason: event.reason.clone(),
            payload: event.payload.clone(),
        };

        let mut delivered = 0;
        for user_id in target_user_ids {
            delivered += self.registry.broadcast_user(user_id, &message).await;
        }

        self.emitted.fetch_add(1, Ordering::Relaxed);
        EmitReport {
            delivered,
            ..EmitReport::default()
        }
    }

    /// A generic application notification for one user.
    pub async fn emit_notification(&self, event: NotificationEvent) -> EmitReport {
        let wrapped = Event::Notification(event.clone());
        if self.is_duplicate(&wrapped).await {
            return self.record_dedupe(&wrapped);
        }

        let decision = self
            .filter
            .evaluate(&NotificationContext {
                recipient_id: event.recipient_id.clone(),
                kind: NotificationKind::from_label(&event.kind),
                sender_id: event.sender_id.clone(),
            })
            .await;

        let mut report = EmitReport::default();
        match decision {
            FilterDecision::Block(reason) => {
                self.filtered.fetch_add(1, Ordering::Relaxed);
                return EmitReport::blocked(reason);
            }
            FilterDecision::AdmitWithBatchingSuggested => {
                self.batch_suggestions.fetch_add(1, Ordering::Relaxed);
                report.batch_suggested = true;
            }
            FilterDecision::Admit => {}
        }

        let message = ServerMessage::NotificationNew {
            kind: event.kind.clone(),
            sender_id: event.sender_id.clone(),
            payload: event.payload.clone(),
        };
        report.delivered = self
            .registry
            .broadcast_user(&event.recipient_id, &message)
            .await;
        self.emitted.fetch_add(1, Ordering::Relaxed);
        report
    }

    /// Push one trending item to a set of users.
    pub async fn emit_trending(&self, user_ids: &[UserId], event: TrendingEvent) -> EmitReport {
        let wrapped = Event::Trending(event.clone());
        if self.is_duplicate(&wrapped).await {
            return self.record_dedupe(&wrapped);
        }

        let message = ServerMessage::TrendingContent {
            content_id: event.content_id.clone(),
            content_type: event.content_type,
            engagement_score: event.engagement_score,
            rank: event.rank,
        };

        let mut delivered = 0;
        for user_id in user_ids {
            delivered += self.registry.broadcast_user(user_id, &message).await;
        }

        self.emitted.fetch_add(1, Ordering::Relaxed);
        EmitReport {
            delivered,
            ..EmitReport::default()
        }
    }

    /// Push a personalized recommendation to one user, filtered like any
    /// other notification.
    pub async fn emit_recommendation(&self, event: RecommendationEvent) -> EmitReport {
        let wrapped = Event::Recommendation(event.clone());
        if self.is_duplicate(&wrapped).await {
            return self.record_dedupe(&wrapped);
        }

        let decision = self
            .filter
            .evaluate(&NotificationContext {
                recipient_id: event.user_id.clone(),
                kind: NotificationKind::Recommendation,
                sender_id: None,
            })
            .await;

        let mut report = EmitReport::default();
        match decision {
            FilterDecision::Block(reason) => {
                self.filtered.fetch_add(1, Ordering::Relaxed);
                return EmitReport::blocked(reason);
            }
            FilterDecision::AdmitWithBatchingSuggested => {
                self.batch_suggestions.fetch_add(1, Ordering::Relaxed);
                report.batch_suggested = true;
            }
            FilterDecision::Admit => {}
        }

        let message = ServerMessage::Personalized {
            items: vec![RecommendationItem {
                content_id: event.content_id.clone(),
                author_id: event.author_id.clone(),
                personalized_score: event.personalized_score,
                reason: event.reason.clone(),
            }],
        };
        report.delivered = self.registry.broadcast_user(&event.user_id, &message).await;
        self.emitted.fetch_add(1, Ordering::Relaxed);
        report
    }

    /// Broadcast a recommendation list to many users.
    ///
    /// Processes every target even when some fail; one user's filter block
    /// or dead socket never stops the rest. Completes in time bounded by
    /// the target count, not by any single target's misbehavior.
    pub async fn batch_emit_recommendations(
        &self,
        user_ids: &[UserId],
        items: &[RecommendationItem],
    ) -> Vec<(UserId, EmitReport)> {
        let mut reports = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            let decision = self
                .filter
                .evaluate(&NotificationContext {
                    recipient_id: user_id.clone(),
                    kind: NotificationKind::Recommendation,
                    sender_id: None,
                })
                .await;

            let report = match decision {
                FilterDecision::Block(reason) => {
                    self.filtered.fetch_add(1, Ordering::Relaxed);
                    EmitReport::blocked(reason)
                }
                admitted => {
                    let batch_suggested =
                        matches!(admitted, FilterDecision::AdmitWithBatchingSuggested);
                    if batch_suggested {
                        self.batch_suggestions.fetch_add(1, Ordering::Relaxed);
                    }
                    let message = ServerMessage::Personalized {
                        items: items.to_vec(),
                    };
                    let delivered = self.registry.broadcast_user(user_id, &message).await;
                    EmitReport {
                        delivered,
                        batch_suggested,
                        ..EmitReport::default()
                    }
                }
            };
            reports.push((user_id.clone(), report));
        }
        self.emitted.fetch_add(1, Ordering::Relaxed);
        info!(targets = user_ids.len(), "Recommendation batch emitted");
        reports
    }

    #[must_use]
    pub fn metrics(&self) -> EmitterMetrics {
        EmitterMetrics {
            emitted: self.emitted.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            batch_suggestions: self.batch_suggestions.load(Ordering::Relaxed),
        }
    }

    /// Claim the event's dedupe key.
    ///
    /// A failed claim only counts as a duplicate when the key actually
    /// exists; with the store down both checks come back false and the
    /// event proceeds. Losing the cache disables dedup, never delivery.
    async fn is_duplicate(&self, event: &Event) -> bool {
        let key = event.dedupe_key();
        let ttl = self.dedup.ttl_for(event.class());
        if self.cache.cache_event(&key, event.class().as_str(), ttl).await {
            return false;
        }
        if self.cache.is_event_duplicate(&key).await {
            return true;
        }
        warn!(key = %key, "Dedup claim inconclusive, delivering without dedup");
        false
    }

    fn record_dedupe(&self, event: &Event) -> EmitReport {
        self.deduplicated.fetch_add(1, Ordering::Relaxed);
        debug!(key = %event.dedupe_key(), "Duplicate event dropped");
        EmitReport::deduped()
    }
}
