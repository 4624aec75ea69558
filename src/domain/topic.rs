//! Topic keys for grouped broadcast.
//!
//! A topic is a pure lookup grouping: connections join it to receive events
//! for one piece of content (`post:123`) or one user's stream (`user:456`).
//! Topics carry no ownership semantics.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::id::{ContentId, ContentType, UserId};

/// A named grouping that connections subscribe to for targeted broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TopicKey {
    /// Content-scoped topic, e.g. everyone watching a post.
    Content {
        content_type: ContentType,
        content_id: ContentId,
    },
    /// User-scoped topic: the user's own devices plus interested followers.
    User { user_id: UserId },
}

impl TopicKey {
    #[must_use]
    pub fn content(content_type: ContentType, content_id: ContentId) -> Self {
        Self::Content {
            content_type,
            content_id,
        }
    }

    #[must_use]
    pub fn user(user_id: UserId) -> Self {
        Self::User { user_id }
    }

    /// Whether unauthenticated connections may join this topic.
    ///
    /// Content topics are read-only streams and open to anyone; user topics
    /// require an authenticated identity.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Content { .. })
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Content {
                content_type,
                content_id,
            } => write!(f, "{content_type}:{content_id}"),
            Self::User { user_id } => write!(f, "user:{user_id}"),
        }
    }
}

/// Error parsing a topic key from its `scope:id` string form.
#[derive(Debug, thiserror::Error)]
#[error("invalid topic key: {0}")]
pub struct ParseTopicError(pub String);

impl FromStr for TopicKey {
    type Err = ParseTopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scope, id) = s
            .split_once(':')
            .ok_or_else(|| ParseTopicError(s.to_string()))?;
        if id.is_empty() {
            return Err(ParseTopicError(s.to_string()));
        }
        let key = match scope {
            "user" => Self::user(UserId::new(id)),
            "post" => Self::content(ContentType::Post, ContentId::new(id)),
            "video" => Self::content(ContentType::Video, ContentId::new(id)),
            "comment" => Self::content(ContentType::Comment, ContentId::new(id)),
            _ => return Err(ParseTopicError(s.to_string())),
        };
        Ok(key)
    }
}

impl TryFrom<String> for TopicKey {
    type Error = ParseTopicError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TopicKey> for String {
    fn from(key: TopicKey) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_topic_round_trips() {
        let key = TopicKey::content(ContentType::Post, ContentId::new("123"));
        assert_eq!(key.to_string(), "post:123");
        assert_eq!("post:123".parse::<TopicKey>().unwrap(), key);
    }

    #[test]
    fn user_topic_round_trips() {
        let key = TopicKey::user(UserId::new("456"));
        assert_eq!(key.to_string(), "user:456");
        assert_eq!("user:456".parse::<TopicKey>().unwrap(), key);
    }

    #[test]
    fn rejects_unknown_scope_and_empty_id() {
        assert!("likes:1".parse::<TopicKey>().is_err());
        assert!("post:".parse::<TopicKey>().is_err());
        assert!("justastring".parse::<TopicKey>().is_err());
    }

    #[test]
    fn only_content_topics_are_read_only() {
        assert!(TopicKey::content(ContentType::Video, ContentId::new("v1")).is_read_only());
        assert!(!TopicKey::user(UserId::new("u1")).is_read_only());
    }
}
