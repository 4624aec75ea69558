//! Profile/history store port (read-only).
//!
//! Preferences, interaction history and engagement aggregates are owned by
//! the surrounding application; this subsystem only reads them.

use async_trait::async_trait;
use chrono::Duration;

use crate::domain::{
    EngagementAggregate, InteractionHistory, NotificationPreference, UserId,
};
use crate::error::Result;

/// Port for the profile and engagement data this subsystem consumes.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// The user's notification switches. `None` when the user is unknown;
    /// callers fall back to defaults.
    async fn notification_preference(
        &self,
        user_id: &UserId,
    ) -> Result<Option<NotificationPreference>>;

    /// Whether the sender is globally blacklisted.
    async fn is_blacklisted(&self, sender_id: &UserId) -> Result<bool>;

    /// Interaction history used for personalization.
    async fn interaction_history(&self, user_id: &UserId) -> Result<InteractionHistory>;

    /// Whether the recipient follows the given user.
    async fn follows(&self, follower_id: &UserId, followee_id: &UserId) -> Result<bool>;

    /// Engagement counters for content created within the window.
    async fn engagement_aggregates(&self, window: Duration) -> Result<Vec<EngagementAggregate>>;

    /// Users active within the window (candidates for trending pushes).
    async fn active_users(&self, window: Duration) -> Result<Vec<UserId>>;
}
