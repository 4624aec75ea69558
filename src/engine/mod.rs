//! Recommendation and trending engine.
//!
//! Computes trending content from engagement signals, personalized
//! recommendations from interaction history, and drives the event emitter
//! to notify users. Runs from scheduled jobs and from gateway commands;
//! never on the mutation hot path.

use std::sync::Arc;

use chrono::{Duration, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::cache::EventCacheService;
use crate::config::EngineConfig;
use uuid::Uuid;

use crate::domain::{
    ContentId, EngagementAggregate, Feedback, RecommendationFeedback, RecommendationItem,
    TrendingEvent, TrendingItem, UserId,
};
use crate::emitter::EventEmitter;
use crate::port::{CacheStore, ProfileStore};

/// Weight multipliers aggregated from recent feedback.
///
/// Feedback facts carry no content category (resolving a content id to its
/// type belongs to the content service), so aggregation is currently
/// global: one multiplier applied to all personalized scores. The
/// structure leaves room for per-category multipliers once attribution is
/// available.
#[derive(Debug, Clone)]
struct Weights {
    multiplier: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self { multiplier: 1.0 }
    }
}

/// Engagement score composition: comments weigh most, views least.
const LIKE_WEIGHT: f64 = 3.0;
const COMMENT_WEIGHT: f64 = 5.0;
const VIEW_WEIGHT: f64 = 0.5;

pub struct RecommendationEngine {
    profiles: Arc<dyn ProfileStore>,
    store: Arc<dyn CacheStore>,
    cache: Arc<EventCacheService>,
    emitter: Arc<EventEmitter>,
    config: EngineConfig,
    weights: RwLock<Weights>,
}

impl RecommendationEngine {
    #[must_use]
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        store: Arc<dyn CacheStore>,
        cache: Arc<EventCacheService>,
        emitter: Arc<EventEmitter>,
        config: EngineConfig,
    ) -> Self {
        Self {
            profiles,
            store,
            cache,
            emitter,
            config,
            weights: RwLock::new(Weights::default()),
        }
    }

    /// Rank recent content by composite engagement score.
    ///
    /// Ties break by recency, newer content first. The ranking is warmed
    /// into the cache's trending sorted set for cheap reads.
    pub async fn detect_trending_content(&self) -> Vec<TrendingItem> {
        let window = Duration::hours(i64::from(self.config.trending_window_hours));
        let aggregates = match self.profiles.engagement_aggregates(window).await {
            Ok(aggregates) => aggregates,
            Err(e) => {
                warn!(error = %e, "Engagement aggregates unavailable");
                return Vec::new();
            }
        };

        let mut scored: Vec<(f64, EngagementAggregate)> = aggregates
            .into_iter()
            .map(|agg| (engagement_score(&agg), agg))
            .collect();
        scored.sort_by(|(score_a, agg_a), (score_b, agg_b)| {
            score_b
                .partial_cmp(score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| agg_b.created_at.cmp(&agg_a.created_at))
        });

        let items: Vec<TrendingItem> = scored
            .into_iter()
            .take(self.config.trending_size)
            .enumerate()
            .map(|(idx, (score, agg))| TrendingItem {
                content_id: agg.content_id,
                content_type: agg.content_type,
                engagement_score: score,
                rank: idx + 1,
                window_hours: self.config.trending_window_hours,
            })
            .collect();

        self.cache.warm_trending_content(&items).await;
        debug!(entries = items.len(), "Trending ranking computed");
        items
    }

    /// Push trending items to currently active users.
    ///
    /// Zero active users is a normal outcome, logged and done.
    pub async fn notify_trending_content(&self, items: &[TrendingItem]) {
        if items.is_empty() {
            return;
        }
        let window = Duration::seconds(self.config.active_window_secs as i64);
        let active = match self.profiles.active_users(window).await {
            Ok(users) => users,
            Err(e) => {
                warn!(error = %e, "Active user lookup failed, skipping trending push");
                return;
            }
        };
        if active.is_empty() {
            info!("No active users, trending push skipped");
            return;
        }

        for item in items {
            let report = self
                .emitter
                .emit_trending(
                    &active,
                    TrendingEvent {
                        content_type: item.content_type,
                        content_id: item.content_id.clone(),
                        engagement_score: item.engagement_score,
                        rank: item.rank,
                        occurred_at: Utc::now(),
                    },
                )
                .await;
            debug!(
                content_id = %item.content_id,
                rank = item.rank,
                delivered = report.delivered,
                "Trending item pushed"
            );
        }
    }

    /// Personalized recommendations from interaction history.
    ///
    /// The caller-supplied limit is clamped to the configured maximum.
    /// Empty history falls back to a bounded trending-derived list rather
    /// than unbounded computation.
    pub async fn generate_recommendations(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Vec<RecommendationItem> {
        let limit = limit.clamp(1, self.config.max_recommendations);
        let multiplier = self.weights.read().multiplier;

        let history = match self.profiles.interaction_history(user_id).await {
            Ok(history) => history,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "History unavailable, using trending fallback");
                return self.trending_fallback(limit, multiplier).await;
            }
        };
        if history.is_empty() {
            return self.trending_fallback(limit, multiplier).await;
        }

        let mut items = Vec::with_capacity(limit);
        // Followed authors rank above content-type affinity.
        for (idx, author) in history.followed_authors.iter().enumerate() {
            if items.len() >= limit {
                break;
            }
            let base = 0.9 - idx as f64 * 0.05;
            items.push(RecommendationItem {
                content_id: ContentId::new(format!("author-latest:{author}")),
                author_id: author.clone(),
                personalized_score: (base.max(0.1) * multiplier).min(1.0),
                reason: "from an author you follow".into(),
            });
        }
        if items.len() < limit {
            let trending = self.trending_fallback(limit - items.len(), multiplier).await;
            let liked_types = &history.liked_content_types;
            for mut item in trending {
                if items.len() >= limit {
                    break;
                }
                item.reason = "popular in topics you like".into();
                // Affinity bump when the type matches the user's history.
                if item
                    .content_id
                    .as_str()
                    .split(':')
                    .next()
                    .map_or(false, |t| liked_types.iter().any(|lt| lt.as_str() == t))
                {
                    item.personalized_score = (item.personalized_score + 0.1).min(1.0);
                }
                items.push(item);
            }
        }
        items.truncate(limit);
        items
    }

    /// Record recommendation feedback as a fact for later aggregation.
    ///
    /// Does not recompute anything synchronously; the weight-update job
    /// picks the facts up on its own schedule.
    pub async fn process_recommendation_feedback(
        &self,
        user_id: &UserId,
        content_id: &ContentId,
        feedback: Feedback,
    ) {
        let fact = RecommendationFeedback {
            user_id: user_id.clone(),
            content_id: content_id.clone(),
            feedback,
            recorded_at: Utc::now(),
        };
        let payload = match serde_json::to_string(&fact) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Feedback fact not serializable");
                return;
            }
        };
        let key = format!("rec:feedback:{}", Uuid::new_v4());
        // Facts expire after two aggregation windows; the job only reads
        // recent ones.
        let ttl = self.config.weight_update_interval_secs * 2;
        if let Err(e) = self.store.set(&key, &payload, ttl).await {
            warn!(user_id = %user_id, error = %e, "Feedback recording failed");
            return;
        }
        debug!(
            user_id = %user_id,
            content_id = %content_id,
            feedback = feedback.as_str(),
            "Recommendation feedback recorded"
        );
    }

    /// Periodic batch job: fold recent feedback facts into the weight
    /// multiplier. Runs off the request-serving path.
    pub async fn update_recommendation_algorithm(&self) {
        let keys = match self.store.scan_keys("rec:feedback:*").await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Feedback facts unavailable, keeping weights");
                return;
            }
        };
        let mut total: u64 = 0;
        let mut delta_sum = 0.0;
        for key in keys {
            let raw = match self.store.get(&key).await {
                Ok(Some(raw)) => raw,
                // Expired between scan and read.
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "Feedback facts unavailable, keeping weights");
                    return;
                }
            };
            let Ok(fact) = serde_json::from_str::<RecommendationFeedback>(&raw) else {
                warn!(key = %key, "Undecodable feedback fact skipped");
                continue;
            };
            total += 1;
            delta_sum += fact.feedback.weight_delta();
        }
        if total == 0 {
            debug!("No recent feedback, weights unchanged");
            return;
        }
        let multiplier = (1.0 + delta_sum / total as f64).clamp(0.5, 1.5);
        self.weights.write().multiplier = multiplier;
        info!(multiplier, samples = total, "Recommendation weights updated");
    }

    /// Current weight multiplier (observability and tests).
    #[must_use]
    pub fn weight_multiplier(&self) -> f64 {
        self.weights.read().multiplier
    }

    async fn trending_fallback(&self, limit: usize, multiplier: f64) -> Vec<RecommendationItem> {
        let ranking = self.cache.trending_ranking().await;
        ranking
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(idx, member)| RecommendationItem {
                content_id: ContentId::new(member),
                author_id: UserId::new("unknown"),
                personalized_score: ((0.8 - idx as f64 * 0.05).max(0.1) * multiplier).min(1.0),
                reason: "trending now".into(),
            })
            .collect()
    }
}

fn engagement_score(agg: &EngagementAggregate) -> f64 {
    agg.likes as f64 * LIKE_WEIGHT
        + agg.comments as f64 * COMMENT_WEIGHT
        + agg.views as f64 * VIEW_WEIGHT
}
