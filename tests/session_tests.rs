//! Gateway session behavior: authentication, command gating, rate limits.

mod support;

use ripple::config::Config;
use ripple::domain::{TopicKey, UserId};
use support::TestApp;

#[tokio::test]
async fn valid_token_binds_identity_and_replies_authenticated() {
    let app = TestApp::new();
    app.verifier.allow("good-token", "alice");
    let (session, transport) = app.connect();

    session.authenticate("good-token").await;

    let replies = transport.sent_of_type("authenticated");
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["user_id"], "alice");
    assert_eq!(
        app.registry.identity(session.connection_id()),
        Some((UserId::new("alice"), "alice".into()))
    );
}

#[tokio::test]
async fn bad_token_leaves_the_connection_open_and_unauthenticated() {
    let app = TestApp::new();
    let (session, transport) = app.connect();

    session.authenticate("unknown-token").await;

    assert_eq!(transport.sent_of_type("unauthenticated").len(), 1);
    assert!(app.registry.identity(session.connection_id()).is_none());
    assert!(!transport.was_closed());

    // The client may retry on the same socket.
    app.verifier.allow("retry-token", "alice");
    session.authenticate("retry-token").await;
    assert_eq!(transport.sent_of_type("authenticated").len(), 1);
}

#[tokio::test]
async fn repeat_authenticate_sends_no_second_reply() {
    let app = TestApp::new();
    let (session, transport) = app.connect_as("alice").await;

    session.authenticate("token-alice").await;

    assert_eq!(transport.sent_of_type("authenticated").len(), 1);
}

#[tokio::test]
async fn privileged_commands_require_authentication() {
    let app = TestApp::new();
    let (session, transport) = app.connect();

    session.handle_frame(r#"{"type":"request_feed"}"#).await;
    session
        .handle_frame(r#"{"type":"request_recommendations","limit":5}"#)
        .await;
    session
        .handle_frame(r#"{"type":"join_topic","topic":"user:alice"}"#)
        .await;

    let errors = transport.sent_of_type("error");
    assert_eq!(errors.len(), 3);
    for error in &errors {
        assert_eq!(error["code"], "AUTHENTICATION_REQUIRED");
    }
}

#[tokio::test]
async fn content_topics_are_open_to_unauthenticated_connections() {
    let app = TestApp::new();
    let (session, transport) = app.connect();

    session
        .handle_frame(r#"{"type":"join_topic","topic":"post:42"}"#)
        .await;

    assert!(transport.sent_of_type("error").is_empty());
    let topic: TopicKey = "post:42".parse().unwrap();
    assert_eq!(app.registry.resolve_topic(&topic).len(), 1);
}

#[tokio::test]
async fn feedback_for_another_user_is_rejected() {
    let app = TestApp::new();
    let (session, transport) = app.connect_as("alice").await;

    session
        .handle_frame(
            r#"{"type":"submit_feedback","user_id":"mallory","content_id":"p1","feedback":"liked"}"#,
        )
        .await;

    let errors = transport.sent_of_type("error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["code"], "UNAUTHORIZED_FEEDBACK");
}

#[tokio::test]
async fn malformed_frames_error_without_dropping_the_connection() {
    let app = TestApp::new();
    let (session, transport) = app.connect();

    session.handle_frame("not json at all").await;
    session.handle_frame(r#"{"type":"warp_drive"}"#).await;

    let errors = transport.sent_of_type("error");
    assert_eq!(errors.len(), 2);
    for error in &errors {
        assert_eq!(error["code"], "INVALID_COMMAND");
    }
    assert!(!transport.was_closed());
}

#[tokio::test]
async fn failed_replies_do_not_wedge_the_session() {
    let app = TestApp::new();
    let (session, transport) = app.connect();

    transport.fail_sends(true);
    session.handle_frame("not json at all").await;
    assert!(transport.sent_of_type("error").is_empty());

    transport.fail_sends(false);
    session.handle_frame(r#"{"type":"warp_drive"}"#).await;
    assert_eq!(transport.sent_of_type("error").len(), 1);
}

#[tokio::test]
async fn command_flood_hits_the_rate_limit() {
    let mut config = Config::default();
    config.gateway.rate_limit_max_commands = 2;
    let app = TestApp::with_config(config);
    let (session, transport) = app.connect();

    for _ in 0..3 {
        session
            .handle_frame(r#"{"type":"join_topic","topic":"post:42"}"#)
            .await;
    }

    let errors = transport.sent_of_type("error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["code"], "RATE_LIMIT_EXCEEDED");
}

#[tokio::test]
async fn authenticated_feed_request_serves_the_warmed_snapshot() {
    let app = TestApp::new();
    let (session, transport) = app.connect_as("alice").await;
    app.cache
        .warm_user_feed(&UserId::new("alice"), r#"{"posts":["p1","p2"]}"#)
        .await;

    session.handle_frame(r#"{"type":"request_feed"}"#).await;

    let updates = transport.sent_of_type("feed:update");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["payload"]["posts"][0], "p1");
}

#[tokio::test]
async fn recommendations_request_replies_even_with_empty_history() {
    let app = TestApp::new();
    let (session, transport) = app.connect_as("alice").await;

    session
        .handle_frame(r#"{"type":"request_recommendations","limit":5}"#)
        .await;

    // Cold caches and empty history still produce a (possibly empty) reply.
    assert_eq!(transport.sent_of_type("recommendation:personalized").len(), 1);
}

#[tokio::test]
async fn last_disconnect_broadcasts_offline_to_topic_watchers() {
    let app = TestApp::new();
    let (watcher_session, watcher) = app.connect_as("bob").await;
    app.registry.join_topic(
        watcher_session.connection_id(),
        "user:alice".parse().unwrap(),
    );

    let (alice_session, _t) = app.connect_as("alice").await;
    assert_eq!(watcher.sent_of_type("user:online").len(), 1);

    alice_session.disconnect().await;
    assert_eq!(watcher.sent_of_type("user:offline").len(), 1);
}
