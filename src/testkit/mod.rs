//! Test doubles and fixture builders.
//!
//! Compiled for unit tests and behind the `testkit` feature so the
//! integration suite can drive services without sockets or a live
//! account service.

mod transport;
mod verifier;

pub use transport::RecordingTransport;
pub use verifier::StaticVerifier;

use chrono::Utc;

use crate::domain::{
    CommentEvent, ContentId, ContentType, EngagementAggregate, LikeEvent, NotificationEvent,
    UserId,
};

/// A like from `liker` on `author`'s post `content`, liked state on.
#[must_use]
pub fn like(liker: &str, author: &str, content: &str) -> LikeEvent {
    LikeEvent {
        content_type: ContentType::Post,
        content_id: ContentId::new(content),
        author_id: UserId::new(author),
        liker_id: UserId::new(liker),
        liker_username: liker.to_string(),
        is_liked: true,
        total_likes: 1,
        occurred_at: Utc::now(),
    }
}

/// A comment from `commenter` on `author`'s post `content`.
#[must_use]
pub fn comment(commenter: &str, author: &str, comment_id: &str, content: &str) -> CommentEvent {
    CommentEvent {
        comment_id: ContentId::new(comment_id),
        content_id: ContentId::new(content),
        author_id: UserId::new(author),
        commenter_id: UserId::new(commenter),
        commenter_username: commenter.to_string(),
        content: "nice post".into(),
        occurred_at: Utc::now(),
    }
}

/// A notification of the given kind from `sender` to `recipient`.
#[must_use]
pub fn notification(sender: &str, recipient: &str, kind: &str) -> NotificationEvent {
    NotificationEvent {
        recipient_id: UserId::new(recipient),
        kind: kind.to_string(),
        sender_id: Some(UserId::new(sender)),
        reference_id: Some("ref-1".into()),
        payload: serde_json::json!({}),
        occurred_at: Utc::now(),
    }
}

/// Engagement counters for a post created now.
#[must_use]
pub fn engagement(content: &str, likes: u64, comments: u64, views: u64) -> EngagementAggregate {
    EngagementAggregate {
        content_id: ContentId::new(content),
        content_type: ContentType::Post,
        likes,
        comments,
        views,
        created_at: Utc::now(),
    }
}
