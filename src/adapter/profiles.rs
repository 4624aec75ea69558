//! In-memory profile store.
//!
//! Serves tests and standalone deployments where no upstream profile
//! service is wired in. Production deployments replace this with an
//! adapter over the profile service; the engine and filter only see the
//! [`ProfileStore`] port either way.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::domain::{
    EngagementAggregate, InteractionHistory, NotificationPreference, UserId,
};
use crate::error::Result;
use crate::port::ProfileStore;

#[derive(Default)]
struct Inner {
    preferences: HashMap<UserId, NotificationPreference>,
    blacklisted: HashSet<UserId>,
    histories: HashMap<UserId, InteractionHistory>,
    follows: HashSet<(UserId, UserId)>,
    aggregates: Vec<EngagementAggregate>,
    last_active: HashMap<UserId, DateTime<Utc>>,
}

/// Mutable in-memory [`ProfileStore`].
#[derive(Default)]
pub struct StaticProfiles {
    inner: RwLock<Inner>,
}

impl StaticProfiles {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_preference(&self, user_id: UserId, preference: NotificationPreference) {
        self.inner.write().preferences.insert(user_id, preference);
    }

    pub fn blacklist(&self, user_id: UserId) {
        self.inner.write().blacklisted.insert(user_id);
    }

    pub fn set_history(&self, user_id: UserId, history: InteractionHistory) {
        self.inner.write().histories.insert(user_id, history);
    }

    /// Record that `follower` follows `followee`.
    pub fn add_follow(&self, follower: UserId, followee: UserId) {
        self.inner.write().follows.insert((follower, followee));
    }

    pub fn add_aggregate(&self, aggregate: EngagementAggregate) {
        self.inner.write().aggregates.push(aggregate);
    }

    pub fn mark_active(&self, user_id: UserId, at: DateTime<Utc>) {
        self.inner.write().last_active.insert(user_id, at);
    }
}

#[async_trait]
impl ProfileStore for StaticProfiles {
    async fn notification_preference(
        &self,
        user_id: &UserId,
    ) -> Result<Option<NotificationPreference>> {
        Ok(self.inner.read().preferences.get(user_id).cloned())
    }

    async fn is_blacklisted(&self, sender_id: &UserId) -> Result<bool> {
        Ok(self.inner.read().blacklisted.contains(sender_id))
    }

    async fn interaction_history(&self, user_id: &UserId) -> Result<InteractionHistory> {
        Ok(self
            .inner
            .read()
            .histories
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn follows(&self, follower_id: &UserId, followee_id: &UserId) -> Result<bool> {
        Ok(self
            .inner
            .read()
            .follows
            .contains(&(follower_id.clone(), followee_id.clone())))
    }

    async fn engagement_aggregates(&self, window: Duration) -> Result<Vec<EngagementAggregate>> {
        let cutoff = Utc::now() - window;
        Ok(self
            .inner
            .read()
            .aggregates
            .iter()
            .filter(|agg| agg.created_at >= cutoff)
            .cloned()
            .collect())
    }

    async fn active_users(&self, window: Duration) -> Result<Vec<UserId>> {
        let cutoff = Utc::now() - window;
        Ok(self
            .inner
            .read()
            .last_active
            .iter()
            .filter(|(_, at)| **at >= cutoff)
            .map(|(user_id, _)| user_id.clone())
            .collect())
    }
}
