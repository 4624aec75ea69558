//! Typed domain events.
//!
//! Every live update flowing through the system is one of these variants.
//! Events are immutable: a caller constructs one at the moment a domain fact
//! occurs, the emitter delivers it (or drops it), and it is discarded.
//!
//! Each variant derives a deterministic [`dedupe_key`](Event::dedupe_key)
//! from its identity so that a retried mutation cannot fan out twice within
//! the dedup TTL window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ContentId, ContentType, UserId};

/// Presence status carried by presence events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// A like was added or removed on a piece of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeEvent {
    pub content_type: ContentType,
    pub content_id: ContentId,
    /// Author of the liked content; receives the `post:liked` notification.
    pub author_id: UserId,
    pub liker_id: UserId,
    pub liker_username: String,
    pub is_liked: bool,
    pub total_likes: u64,
    pub occurred_at: DateTime<Utc>,
}

/// A comment was created on a piece of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentEvent {
    pub comment_id: ContentId,
    pub content_id: ContentId,
    /// Author of the commented content; receives the notification.
    pub author_id: UserId,
    pub commenter_id: UserId,
    pub commenter_username: String,
    /// Snippet of the comment body for display in the notification.
    pub content: String,
    pub occurred_at: DateTime<Utc>,
}

/// A user's presence changed; broadcast to their followers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub user_id: UserId,
    pub username: String,
    pub status: PresenceStatus,
    pub occurred_at: DateTime<Utc>,
}

/// A user's feed changed and connected devices should refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedUpdateEvent {
    /// Stable id of this update, assigned by the producer.
    pub update_id: String,
    pub reason: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

/// Content entered the trending ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingEvent {
    pub content_type: ContentType,
    pub content_id: ContentId,
    pub engagement_score: f64,
    pub rank: usize,
    pub occurred_at: DateTime<Utc>,
}

/// A personalized recommendation for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationEvent {
    pub user_id: UserId,
    pub content_id: ContentId,
    pub author_id: UserId,
    pub personalized_score: f64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// A generic notification produced by the surrounding application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub recipient_id: UserId,
    /// Producer-side kind, e.g. "follow", "mention", "system".
    pub kind: String,
    pub sender_id: Option<UserId>,
    /// Id of the entity the notification refers to, if any.
    pub reference_id: Option<String>,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

/// Every event kind the emitter accepts, as a tagged variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Like(LikeEvent),
    Comment(CommentEvent),
    Presence(PresenceEvent),
    FeedUpdate(FeedUpdateEvent),
    Trending(TrendingEvent),
    Recommendation(RecommendationEvent),
    Notification(NotificationEvent),
}

/// Coarse classification used for dedup TTLs and frequency windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    Like,
    Comment,
    Presence,
    FeedUpdate,
    Trending,
    Recommendation,
    Notification,
}

impl EventClass {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Comment => "comment",
            Self::Presence => "presence",
            Self::FeedUpdate => "feed_update",
            Self::Trending => "trending",
            Self::Recommendation => "recommendation",
            Self::Notification => "notification",
        }
    }
}

impl Event {
    #[must_use]
    pub fn class(&self) -> EventClass {
        match self {
            Self::Like(_) => EventClass::Like,
            Self::Comment(_) => EventClass::Comment,
            Self::Presence(_) => EventClass::Presence,
            Self::FeedUpdate(_) => EventClass::FeedUpdate,
            Self::Trending(_) => EventClass::Trending,
            Self::Recommendation(_) => EventClass::Recommendation,
            Self::Notification(_) => EventClass::Notification,
        }
    }

    /// Deterministic key identifying this logical occurrence.
    ///
    /// Two events describing the same domain fact produce the same key, so
    /// the cache's set-if-absent claim suppresses the second delivery.
    /// Presence, trending and recommendation keys are time-bucketed: the
    /// same fact may legitimately recur once the bucket rolls over.
    #[must_use]
    pub fn dedupe_key(&self) -> String {
        match self {
            Self::Like(e) => format!(
                "event:like:{}:{}:{}:{}",
                e.content_type, e.content_id, e.liker_id, e.is_liked
            ),
            Self::Comment(e) => format!("event:comment:{}", e.comment_id),
            Self::Presence(e) => format!(
                "event:presence:{}:{}:{}",
                e.user_id,
                e.status.as_str(),
                minute_bucket(e.occurred_at)
            ),
            Self::FeedUpdate(e) => format!("event:feed:{}", e.update_id),
            Self::Trending(e) => format!(
                "event:trending:{}:{}:{}",
                e.content_type,
                e.content_id,
                hour_bucket(e.occurred_at)
            ),
            Self::Recommendation(e) => format!(
                "event:rec:{}:{}:{}",
                e.user_id,
                e.content_id,
                day_bucket(e.occurred_at)
            ),
            Self::Notification(e) => format!(
                "event:notif:{}:{}:{}:{}",
                e.recipient_id,
                e.kind,
                e.sender_id
                    .as_ref()
                    .map_or("system", super::id::UserId::as_str),
                e.reference_id.as_deref().unwrap_or("-")
            ),
        }
    }
}

fn minute_bucket(at: DateTime<Utc>) -> i64 {
    at.timestamp() / 60
}

fn hour_bucket(at: DateTime<Utc>) -> i64 {
    at.timestamp() / 3600
}

fn day_bucket(at: DateTime<Utc>) -> i64 {
    at.timestamp() / 86_400
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn like_at(ts: i64) -> Event {
        Event::Like(LikeEvent {
            content_type: ContentType::Post,
            content_id: ContentId::new("p1"),
            author_id: UserId::new("author"),
            liker_id: UserId::new("liker"),
            liker_username: "liker".into(),
            is_liked: true,
            total_likes: 3,
            occurred_at: Utc.timestamp_opt(ts, 0).unwrap(),
        })
    }

    #[test]
    fn like_key_is_stable_across_time() {
        // A like retried a minute later is still the same fact.
        assert_eq!(like_at(1_000).dedupe_key(), like_at(1_060).dedupe_key());
    }

    #[test]
    fn unlike_gets_a_distinct_key() {
        let like = like_at(0);
        let unlike = match like_at(0) {
            Event::Like(mut e) => {
                e.is_liked = false;
                Event::Like(e)
            }
            other => other,
        };
        assert_ne!(like.dedupe_key(), unlike.dedupe_key());
    }

    #[test]
    fn presence_key_rolls_with_minute_bucket() {
        let mk = |ts| {
            Event::Presence(PresenceEvent {
                user_id: UserId::new("u1"),
                username: "u1".into(),
                status: PresenceStatus::Online,
                occurred_at: Utc.timestamp_opt(ts, 0).unwrap(),
            })
        };
        assert_eq!(mk(0).dedupe_key(), mk(59).dedupe_key());
        assert_ne!(mk(0).dedupe_key(), mk(61).dedupe_key());
    }

    #[test]
    fn notification_key_includes_sender_and_reference() {
        let mk = |sender: Option<&str>| {
            Event::Notification(NotificationEvent {
                recipient_id: UserId::new("r"),
                kind: "follow".into(),
                sender_id: sender.map(UserId::new),
                reference_id: Some("f-9".into()),
                payload: serde_json::json!({}),
                occurred_at: Utc::now(),
            })
        };
        assert_ne!(mk(Some("a")).dedupe_key(), mk(Some("b")).dedupe_key());
        assert_ne!(mk(Some("a")).dedupe_key(), mk(None).dedupe_key());
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let json = serde_json::to_value(like_at(0)).unwrap();
        assert_eq!(json["kind"], "like");
        assert_eq!(json["total_likes"], 3);
    }
}
