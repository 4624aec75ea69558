//! Connection registry: identity binding, topic membership, broadcast.

mod support;

use std::sync::Arc;

use ripple::domain::{ConnectionId, ContentId, ContentType, TopicKey, UserId};
use ripple::gateway::ServerMessage;
use ripple::port::{BroadcastEnvelope, BroadcastTarget};
use ripple::registry::AuthOutcome;
use ripple::testkit::RecordingTransport;
use support::TestApp;

fn ping(user: &str) -> ServerMessage {
    ServerMessage::UserOnline {
        user_id: UserId::new(user),
        username: user.to_string(),
    }
}

#[tokio::test]
async fn broadcast_reaches_every_device_of_a_user() {
    let app = TestApp::new();
    let (_s1, phone) = app.connect_as("alice").await;
    let (_s2, laptop) = app.connect_as("alice").await;

    let delivered = app
        .registry
        .broadcast_user(&UserId::new("alice"), &ping("bob"))
        .await;

    assert_eq!(delivered, 2);
    assert_eq!(phone.sent_of_type("user:online").len(), 1);
    assert_eq!(laptop.sent_of_type("user:online").len(), 1);
}

#[tokio::test]
async fn first_authentication_is_flagged_per_user() {
    let app = TestApp::new();
    let transport = Arc::new(RecordingTransport::new());
    let c1 = ConnectionId::generate();
    app.registry.register(c1.clone(), transport.clone());

    let outcome = app
        .registry
        .authenticate(&c1, UserId::new("alice"), "alice".into());
    assert_eq!(
        outcome,
        AuthOutcome::Authenticated { first_for_user: true }
    );

    // Second device: bound, but not first.
    let c2 = ConnectionId::generate();
    app.registry.register(c2.clone(), transport.clone());
    let outcome = app
        .registry
        .authenticate(&c2, UserId::new("alice"), "alice".into());
    assert_eq!(
        outcome,
        AuthOutcome::Authenticated { first_for_user: false }
    );

    // Rebinding the same connection is rejected.
    let outcome = app
        .registry
        .authenticate(&c1, UserId::new("mallory"), "mallory".into());
    assert_eq!(outcome, AuthOutcome::AlreadyAuthenticated);
    assert_eq!(
        app.registry.identity(&c1),
        Some((UserId::new("alice"), "alice".into()))
    );
}

#[tokio::test]
async fn topic_membership_is_idempotent() {
    let app = TestApp::new();
    let (session, transport) = app.connect_as("alice").await;
    let topic = TopicKey::content(ContentType::Post, ContentId::new("p1"));

    app.registry.join_topic(session.connection_id(), topic.clone());
    app.registry.join_topic(session.connection_id(), topic.clone());

    let delivered = app.registry.broadcast_topic(&topic, &ping("bob")).await;
    assert_eq!(delivered, 1);
    assert_eq!(transport.sent_of_type("user:online").len(), 1);

    app.registry.leave_topic(session.connection_id(), &topic);
    app.registry.leave_topic(session.connection_id(), &topic);
    let delivered = app.registry.broadcast_topic(&topic, &ping("bob")).await;
    assert_eq!(delivered, 0);
}

#[tokio::test]
async fn disconnect_cleans_every_index() {
    let app = TestApp::new();
    let (session, _transport) = app.connect_as("alice").await;
    let topic = TopicKey::content(ContentType::Post, ContentId::new("p1"));
    app.registry.join_topic(session.connection_id(), topic.clone());

    let outcome = app.registry.disconnect(session.connection_id());

    assert_eq!(
        outcome.last_connection_of,
        Some((UserId::new("alice"), "alice".into()))
    );
    assert!(app.registry.resolve_connections(&UserId::new("alice")).is_empty());
    assert!(app.registry.resolve_topic(&topic).is_empty());
    assert_eq!(app.registry.connection_count(), 0);
}

#[tokio::test]
async fn disconnect_of_one_device_is_not_the_last() {
    let app = TestApp::new();
    let (s1, _t1) = app.connect_as("alice").await;
    let (_s2, _t2) = app.connect_as("alice").await;

    let outcome = app.registry.disconnect(s1.connection_id());

    assert!(outcome.last_connection_of.is_none());
    assert_eq!(
        app.registry.resolve_connections(&UserId::new("alice")).len(),
        1
    );
}

#[tokio::test]
async fn peer_envelopes_deliver_verbatim_but_own_origin_is_skipped() {
    let app = TestApp::new();
    let (_session, transport) = app.connect_as("alice").await;

    let foreign = BroadcastEnvelope {
        origin: "peer-process".into(),
        target: BroadcastTarget::User {
            user_id: UserId::new("alice"),
        },
        message: r#"{"type":"feed:update","reason":"peer","payload":null}"#.into(),
    };
    app.registry.apply_envelope(&foreign).await;
    assert_eq!(transport.sent_of_type("feed:update").len(), 1);

    let own = BroadcastEnvelope {
        origin: app.registry.origin().to_string(),
        ..foreign
    };
    app.registry.apply_envelope(&own).await;
    assert_eq!(transport.sent_of_type("feed:update").len(), 1);
}

#[tokio::test]
async fn delivery_to_unknown_connection_fails_softly() {
    let app = TestApp::new();
    let result = app
        .registry
        .deliver(&ConnectionId::generate(), &ping("bob"))
        .await;
    assert!(!result.is_delivered());
}
