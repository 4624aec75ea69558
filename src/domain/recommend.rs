//! Trending and recommendation domain types.
//!
//! These are derived values: the engine recomputes them from engagement
//! signals and interaction history, nothing here is persisted by this
//! subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ContentId, ContentType, UserId};

/// One entry in the trending ranking for a time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingItem {
    pub content_id: ContentId,
    pub content_type: ContentType,
    pub engagement_score: f64,
    pub rank: usize,
    /// The rolling window (in hours) the score was computed over.
    pub window_hours: u32,
}

/// A personalized recommendation for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationItem {
    pub content_id: ContentId,
    pub author_id: UserId,
    pub personalized_score: f64,
    pub reason: String,
}

/// Raw engagement counters for one piece of content within a window.
#[derive(Debug, Clone)]
pub struct EngagementAggregate {
    pub content_id: ContentId,
    pub content_type: ContentType,
    pub likes: u64,
    pub comments: u64,
    pub views: u64,
    pub created_at: DateTime<Utc>,
}

/// A user's interaction history, as supplied by the profile store.
#[derive(Debug, Clone, Default)]
pub struct InteractionHistory {
    pub liked_content_types: Vec<ContentType>,
    pub followed_authors: Vec<UserId>,
    /// Engagement rate in [0, 1]; how often this user opens notifications.
    pub engagement_rate: f64,
}

impl InteractionHistory {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.liked_content_types.is_empty() && self.followed_authors.is_empty()
    }
}

/// User reaction to a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    Liked,
    Dismissed,
    Clicked,
    NotInterested,
}

impl Feedback {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Liked => "liked",
            Self::Dismissed => "dismissed",
            Self::Clicked => "clicked",
            Self::NotInterested => "not_interested",
        }
    }

    /// Contribution of this feedback to a category's weight multiplier.
    #[must_use]
    pub fn weight_delta(&self) -> f64 {
        match self {
            Self::Liked => 0.10,
            Self::Clicked => 0.05,
            Self::Dismissed => -0.05,
            Self::NotInterested => -0.10,
        }
    }
}

/// A recorded feedback fact, aggregated later by the weight-update job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationFeedback {
    pub user_id: UserId,
    pub content_id: ContentId,
    pub feedback: Feedback,
    pub recorded_at: DateTime<Utc>,
}
