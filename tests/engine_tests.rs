//! Trending detection and recommendation generation.

mod support;

use chrono::Utc;
use ripple::config::Config;
use ripple::domain::{ContentId, Feedback, InteractionHistory, RecommendationFeedback, UserId};
use ripple::port::CacheStore;
use ripple::testkit;
use support::TestApp;

#[tokio::test]
async fn trending_ranks_by_composite_engagement() {
    let app = TestApp::new();
    // Comments weigh more than likes, likes more than views.
    app.profiles.add_aggregate(testkit::engagement("viral", 10, 40, 100));
    app.profiles.add_aggregate(testkit::engagement("liked", 50, 0, 0));
    app.profiles.add_aggregate(testkit::engagement("seen", 0, 0, 200));

    let items = app.engine.detect_trending_content().await;

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].content_id.as_str(), "viral");
    assert_eq!(items[0].rank, 1);
    assert_eq!(items[1].content_id.as_str(), "liked");
    assert_eq!(items[2].content_id.as_str(), "seen");
}

#[tokio::test]
async fn trending_is_capped_at_the_configured_size() {
    let mut config = Config::default();
    config.engine.trending_size = 2;
    let app = TestApp::with_config(config);
    for n in 0..5 {
        app.profiles
            .add_aggregate(testkit::engagement(&format!("p{n}"), n, 0, 0));
    }

    let items = app.engine.detect_trending_content().await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].content_id.as_str(), "p4");
}

#[tokio::test]
async fn trending_push_reaches_active_users_only() {
    let app = TestApp::new();
    app.profiles.add_aggregate(testkit::engagement("p1", 5, 5, 5));
    let (_s1, active) = app.connect_as("active").await;
    let (_s2, idle) = app.connect_as("idle").await;
    app.profiles.mark_active(UserId::new("active"), Utc::now());
    app.profiles
        .mark_active(UserId::new("idle"), Utc::now() - chrono::Duration::hours(2));

    let items = app.engine.detect_trending_content().await;
    app.engine.notify_trending_content(&items).await;

    assert_eq!(active.sent_of_type("recommendation:trending_content").len(), 1);
    assert!(idle.sent_of_type("recommendation:trending_content").is_empty());
}

#[tokio::test]
async fn trending_push_with_no_active_users_is_a_noop() {
    let app = TestApp::new();
    app.profiles.add_aggregate(testkit::engagement("p1", 5, 5, 5));

    let items = app.engine.detect_trending_content().await;
    app.engine.notify_trending_content(&items).await;

    assert_eq!(app.emitter.metrics().emitted, 0);
}

#[tokio::test]
async fn recommendations_prefer_followed_authors() {
    let app = TestApp::new();
    app.profiles.set_history(
        UserId::new("alice"),
        InteractionHistory {
            followed_authors: vec![UserId::new("ann"), UserId::new("ben")],
            engagement_rate: 0.8,
            ..Default::default()
        },
    );

    let items = app.engine.generate_recommendations(&UserId::new("alice"), 5).await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].author_id, UserId::new("ann"));
    assert!(items[0].personalized_score > items[1].personalized_score);
}

#[tokio::test]
async fn empty_history_falls_back_to_trending() {
    let app = TestApp::new();
    app.profiles.add_aggregate(testkit::engagement("p1", 5, 5, 5));
    app.engine.detect_trending_content().await;

    let items = app.engine.generate_recommendations(&UserId::new("new-user"), 5).await;

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].reason, "trending now");
}

#[tokio::test]
async fn requested_limit_is_clamped_to_the_configured_maximum() {
    let app = TestApp::new();
    let many_authors = (0..100).map(|n| UserId::new(format!("a{n}"))).collect();
    app.profiles.set_history(
        UserId::new("alice"),
        InteractionHistory {
            followed_authors: many_authors,
            engagement_rate: 0.8,
            ..Default::default()
        },
    );

    let items = app
        .engine
        .generate_recommendations(&UserId::new("alice"), 10_000)
        .await;
    assert_eq!(items.len(), app.config.engine.max_recommendations);

    // Zero clamps up to one, never to nothing.
    let items = app.engine.generate_recommendations(&UserId::new("alice"), 0).await;
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn feedback_is_recorded_as_an_attributed_fact() {
    let app = TestApp::new();

    app.engine
        .process_recommendation_feedback(&UserId::new("ann"), &ContentId::new("p1"), Feedback::Liked)
        .await;

    let keys = app.store.scan_keys("rec:feedback:*").await.unwrap();
    assert_eq!(keys.len(), 1);
    let raw = app.store.get(&keys[0]).await.unwrap().unwrap();
    let fact: RecommendationFeedback = serde_json::from_str(&raw).unwrap();
    assert_eq!(fact.user_id, UserId::new("ann"));
    assert_eq!(fact.content_id, ContentId::new("p1"));
    assert_eq!(fact.feedback, Feedback::Liked);
}

#[tokio::test]
async fn positive_feedback_raises_the_weight_multiplier() {
    let app = TestApp::new();
    let user = UserId::new("alice");
    let content = ContentId::new("p1");

    for _ in 0..3 {
        app.engine
            .process_recommendation_feedback(&user, &content, Feedback::Liked)
            .await;
    }
    app.engine.update_recommendation_algorithm().await;
    assert!((app.engine.weight_multiplier() - 1.1).abs() < 1e-9);

    for _ in 0..9 {
        app.engine
            .process_recommendation_feedback(&user, &content, Feedback::NotInterested)
            .await;
    }
    app.engine.update_recommendation_algorithm().await;
    assert!(app.engine.weight_multiplier() < 1.0);
}

#[tokio::test]
async fn weights_are_untouched_without_feedback() {
    let app = TestApp::new();
    app.engine.update_recommendation_algorithm().await;
    assert!((app.engine.weight_multiplier() - 1.0).abs() < f64::EPSILON);
}
