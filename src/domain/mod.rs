//! Domain types: events, topics, identifiers, preferences, recommendations.
//!
//! Everything here is plain data with no I/O. Ports and services depend on
//! this module, never the other way around.

mod event;
mod id;
mod notification;
mod recommend;
mod topic;

pub use event::{
    CommentEvent, Event, EventClass, FeedUpdateEvent, LikeEvent, NotificationEvent, PresenceEvent,
    PresenceStatus, RecommendationEvent, TrendingEvent,
};
pub use id::{ConnectionId, ContentId, ContentType, UserId};
pub use notification::{BlockReason, FilterDecision, NotificationKind, NotificationPreference};
pub use recommend::{
    EngagementAggregate, Feedback, InteractionHistory, RecommendationFeedback, RecommendationItem,
    TrendingItem,
};
pub use topic::{ParseTopicError, TopicKey};
