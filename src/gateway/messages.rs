//! Wire messages exchanged with connected clients.
//!
//! Commands and server pushes are tagged JSON objects. Parse failures on
//! inbound frames are per-command errors, never connection-fatal.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ContentId, Feedback, TopicKey, UserId};

/// Commands a client may send over the socket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Deferred authentication after connect.
    Authenticate { token: String },
    JoinTopic { topic: TopicKey },
    LeaveTopic { topic: TopicKey },
    RequestFeed,
    RequestRecommendations { limit: Option<usize> },
    SubmitFeedback {
        user_id: UserId,
        content_id: ContentId,
        feedback: Feedback,
    },
}

/// Error codes carried by `error` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AuthenticationRequired,
    UnauthorizedFeedback,
    RateLimitExceeded,
    InvalidCommand,
}

/// Messages pushed to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "authenticated")]
    Authenticated { user_id: UserId, username: String },

    #[serde(rename = "unauthenticated")]
    Unauthenticated { reason: String },

    #[serde(rename = "error")]
    Error { code: ErrorCode, message: String },

    #[serde(rename = "post:liked")]
    PostLiked {
        content_id: ContentId,
        liker_id: UserId,
        liker_username: String,
        is_liked: bool,
        total_likes: u64,
    },

    #[serde(rename = "comment:created")]
    CommentCreated {
        comment_id: ContentId,
        content_id: ContentId,
        commenter_id: UserId,
        commenter_username: String,
        content: String,
    },

    #[serde(rename = "user:online")]
    UserOnline { user_id: UserId, username: String },

    #[serde(rename = "user:offline")]
    UserOffline { user_id: UserId, username: String },

    #[serde(rename = "feed:update")]
    FeedUpdate { reason: String, payload: Value },

    #[serde(rename = "notification:new")]
    NotificationNew {
        kind: String,
        sender_id: Option<UserId>,
        payload: Value,
    },

    #[serde(rename = "recommendation:trending_content")]
    TrendingContent {
        content_id: ContentId,
        content_type: crate::domain::ContentType,
        engagement_score: f64,
        rank: usize,
    },

    #[serde(rename = "recommendation:personalized")]
    Personalized {
        items: Vec<crate::domain::RecommendationItem>,
    },
}

impl ServerMessage {
    /// Serialize for the wire. Serialization of these variants cannot fail.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            // Unreachable with these variants; keep the socket alive anyway.
            r#"{"type":"error","code":"INVALID_COMMAND","message":"serialization"}"#.to_string()
        })
    }

    #[must_use]
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_from_tagged_json() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"type":"join_topic","topic":"post:42"}"#).unwrap();
        assert!(matches!(cmd, ClientCommand::JoinTopic { .. }));

        let cmd: ClientCommand =
            serde_json::from_str(r#"{"type":"authenticate","token":"abc"}"#).unwrap();
        assert!(matches!(cmd, ClientCommand::Authenticate { .. }));
    }

    #[test]
    fn malformed_command_is_an_err_not_a_panic() {
        assert!(serde_json::from_str::<ClientCommand>(r#"{"type":"warp"}"#).is_err());
        assert!(serde_json::from_str::<ClientCommand>("not json").is_err());
    }

    #[test]
    fn server_messages_use_named_types() {
        let msg = ServerMessage::PostLiked {
            content_id: ContentId::new("42"),
            liker_id: UserId::new("u9"),
            liker_username: "niko".into(),
            is_liked: true,
            total_likes: 7,
        };
        let value: Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(value["type"], "post:liked");
        assert_eq!(value["total_likes"], 7);
    }

    #[test]
    fn error_codes_serialize_screaming() {
        let msg = ServerMessage::error(ErrorCode::RateLimitExceeded, "slow down");
        let value: Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(value["code"], "RATE_LIMIT_EXCEEDED");
    }
}
