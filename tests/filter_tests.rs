//! Notification filter behavior, driven through the emitter.

mod support;

use ripple::config::Config;
use ripple::domain::{BlockReason, InteractionHistory, UserId};
use ripple::testkit;
use support::TestApp;

fn app_with_thresholds(frequency: u32, abuse: u32) -> TestApp {
    let mut config = Config::default();
    config.filter.frequency_threshold = frequency;
    config.filter.abuse_threshold = abuse;
    TestApp::with_config(config)
}

/// Distinct notifications so only the frequency counter trips, not dedup.
fn mention(n: usize) -> ripple::domain::NotificationEvent {
    let mut event = testkit::notification("sender", "dana", "mention");
    event.reference_id = Some(format!("ref-{n}"));
    event
}

#[tokio::test]
async fn frequency_budget_blocks_the_overflow_notification() {
    let app = app_with_thresholds(2, 100);

    assert!(app.emitter.emit_notification(mention(1)).await.blocked.is_none());
    assert!(app.emitter.emit_notification(mention(2)).await.blocked.is_none());
    let third = app.emitter.emit_notification(mention(3)).await;

    assert_eq!(third.blocked, Some(BlockReason::FrequencyLimitExceeded));
}

#[tokio::test]
async fn per_kind_override_beats_the_default_threshold() {
    let mut config = Config::default();
    config.filter.frequency_threshold = 100;
    config.filter.frequency_overrides.insert("mention".into(), 1);
    let app = TestApp::with_config(config);

    assert!(app.emitter.emit_notification(mention(1)).await.blocked.is_none());
    let second = app.emitter.emit_notification(mention(2)).await;

    assert_eq!(second.blocked, Some(BlockReason::FrequencyLimitExceeded));
}

#[tokio::test]
async fn frequency_window_rollover_readmits() {
    let mut config = Config::default();
    config.filter.frequency_threshold = 1;
    config.filter.frequency_window_secs = 1;
    let app = TestApp::with_config(config);

    assert!(app.emitter.emit_notification(mention(1)).await.blocked.is_none());
    assert_eq!(
        app.emitter.emit_notification(mention(2)).await.blocked,
        Some(BlockReason::FrequencyLimitExceeded)
    );

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    assert!(app.emitter.emit_notification(mention(3)).await.blocked.is_none());
}

#[tokio::test]
async fn blacklisted_sender_is_blocked_as_spam() {
    let app = TestApp::new();
    app.profiles.blacklist(UserId::new("sender"));

    let report = app.emitter.emit_notification(mention(1)).await;

    assert_eq!(report.blocked, Some(BlockReason::SpamOrAbuse));
}

#[tokio::test]
async fn burst_from_one_sender_to_one_recipient_trips_abuse() {
    let app = app_with_thresholds(100, 2);

    let mut last = None;
    for n in 0..3 {
        last = Some(app.emitter.emit_notification(mention(n)).await);
    }

    assert_eq!(
        last.and_then(|r| r.blocked),
        Some(BlockReason::SpamOrAbuse)
    );
}

#[tokio::test]
async fn system_notifications_have_no_sender_to_judge() {
    let app = app_with_thresholds(100, 1);
    app.profiles.blacklist(UserId::new("sender"));

    let mut event = testkit::notification("sender", "dana", "system");
    event.sender_id = None;
    let report = app.emitter.emit_notification(event).await;

    assert!(report.blocked.is_none());
}

#[tokio::test]
async fn store_outage_fails_open() {
    let app = app_with_thresholds(1, 1);
    app.store.set_unavailable(true);

    // Every stage that needs the store errors out; all of them admit.
    for n in 0..5 {
        let report = app.emitter.emit_notification(mention(n)).await;
        assert!(report.blocked.is_none(), "notification {n} was blocked");
    }
}

#[tokio::test]
async fn preference_block_still_applies_during_store_outage() {
    let app = TestApp::new();
    app.store.set_unavailable(true);
    app.profiles.blacklist(UserId::new("sender"));

    let report = app.emitter.emit_notification(mention(1)).await;

    assert_eq!(report.blocked, Some(BlockReason::SpamOrAbuse));
}

#[tokio::test]
async fn low_importance_admits_with_batching_suggested() {
    let app = TestApp::new();

    // A like from a stranger to a disengaged recipient scores low.
    let report = app
        .emitter
        .emit_notification(testkit::notification("sender", "dana", "like"))
        .await;

    assert!(report.blocked.is_none());
    assert!(report.batch_suggested);
    assert_eq!(app.emitter.metrics().batch_suggestions, 1);
}

#[tokio::test]
async fn followed_engaged_recipient_admits_without_batching() {
    let app = TestApp::new();
    app.profiles.add_follow(UserId::new("dana"), UserId::new("sender"));
    app.profiles.set_history(
        UserId::new("dana"),
        InteractionHistory {
            engagement_rate: 0.9,
            ..Default::default()
        },
    );

    let report = app
        .emitter
        .emit_notification(testkit::notification("sender", "dana", "mention"))
        .await;

    assert!(report.blocked.is_none());
    assert!(!report.batch_suggested);
}
