//! Per-connection command handling and authentication state machine.
//!
//! A session moves `Connecting -> Connected(Unauthenticated) ->
//! Connected(Authenticated) -> Disconnected`. Authentication happens inline
//! (token in the connect request) or later via the `authenticate` command;
//! both converge on the registry's single bind. Bad credentials leave the
//! socket open and unauthenticated — the transport connection is cheap to
//! keep and the client may retry.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::EventCacheService;
use crate::config::{AuthConfig, GatewayConfig};
use crate::domain::{ConnectionId, TopicKey, UserId};
use crate::engine::RecommendationEngine;
use crate::error::AuthError;
use crate::port::{ClientTransport, DeliveryResult, TokenVerifier};
use crate::registry::{AuthOutcome, ConnectionRegistry};

use super::messages::{ClientCommand, ErrorCode, ServerMessage};
use super::rate_limit::RateLimiter;

/// One client connection's command handler.
pub struct Session {
    connection_id: ConnectionId,
    transport: Arc<dyn ClientTransport>,
    registry: Arc<ConnectionRegistry>,
    verifier: Arc<dyn TokenVerifier>,
    engine: Arc<RecommendationEngine>,
    cache: Arc<EventCacheService>,
    limiter: RateLimiter,
    auth_config: AuthConfig,
}

impl Session {
    #[must_use]
    pub fn new(
        connection_id: ConnectionId,
        transport: Arc<dyn ClientTransport>,
        registry: Arc<ConnectionRegistry>,
        verifier: Arc<dyn TokenVerifier>,
        engine: Arc<RecommendationEngine>,
        cache: Arc<EventCacheService>,
        gateway_config: &GatewayConfig,
        auth_config: AuthConfig,
    ) -> Self {
        Self {
            connection_id,
            transport,
            registry,
            verifier,
            engine,
            cache,
            limiter: RateLimiter::new(
                gateway_config.rate_limit_max_commands,
                Duration::from_secs(gateway_config.rate_limit_window_secs),
            ),
            auth_config,
        }
    }

    #[must_use]
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Register the connection with the registry (pending state).
    pub fn register(&self) {
        self.registry
            .register(self.connection_id.clone(), Arc::clone(&self.transport));
    }

    /// Handle one inbound text frame.
    pub async fn handle_frame(&self, raw: &str) {
        if !self.limiter.check() {
            self.reply(ServerMessage::error(
                ErrorCode::RateLimitExceeded,
                "command rate limit exceeded, retry later",
            ))
            .await;
            return;
        }

        let command: ClientCommand = match serde_json::from_str(raw) {
            Ok(command) => command,
            Err(e) => {
                debug!(connection_id = %self.connection_id, error = %e, "Malformed command");
                self.reply(ServerMessage::error(
                    ErrorCode::InvalidCommand,
                    "malformed command payload",
                ))
                .await;
                return;
            }
        };

        match command {
            ClientCommand::Authenticate { token } => self.authenticate(&token).await,
            ClientCommand::JoinTopic { topic } => self.join_topic(topic).await,
            ClientCommand::LeaveTopic { topic } => self.leave_topic(&topic).await,
            ClientCommand::RequestFeed => self.request_feed().await,
            ClientCommand::RequestRecommendations { limit } => {
                self.request_recommendations(limit).await;
            }
            ClientCommand::SubmitFeedback {
                user_id,
                content_id,
                feedback,
            } => self.submit_feedback(user_id, content_id, feedback).await,
        }
    }

    /// Verify a token and bind the identity, inline or deferred.
    ///
    /// Verification is bounded by the configured timeout; a hung identity
    /// provider leaves the connection unauthenticated instead of wedging
    /// the handshake.
    pub async fn authenticate(&self, token: &str) {
        let verified = tokio::time::timeout(
            Duration::from_secs(self.auth_config.verify_timeout_secs),
            self.verifier.verify(token),
        )
        .await
        .unwrap_or(Err(AuthError::Timeout));

        let claims = match verified {
            Ok(claims) => claims,
            Err(e) => {
                debug!(connection_id = %self.connection_id, error = %e, "Authentication failed");
                self.reply(ServerMessage::Unauthenticated {
                    reason: e.to_string(),
                })
                .await;
                return;
            }
        };

        match self.registry.authenticate(
            &self.connection_id,
            claims.user_id.clone(),
            claims.username.clone(),
        ) {
            AuthOutcome::Authenticated { first_for_user } => {
                info!(connection_id = %self.connection_id, user_id = %claims.user_id, "Connection authenticated");
                self.reply(ServerMessage::Authenticated {
                    user_id: claims.user_id.clone(),
                    username: claims.username.clone(),
                })
                .await;
                if first_for_user {
                    // Presence for topic subscribers; follower-directed
                    // presence comes through the emitter's presence path.
                    self.registry
                        .broadcast_topic(
                            &TopicKey::user(claims.user_id.clone()),
                            &ServerMessage::UserOnline {
                                user_id: claims.user_id,
                                username: claims.username,
                            },
                        )
                        .await;
                }
            }
            AuthOutcome::AlreadyAuthenticated => {
                // Second valid authenticate on the same connection: no-op,
                // no second `authenticated` message.
                debug!(connection_id = %self.connection_id, "Repeat authenticate ignored");
            }
            AuthOutcome::UnknownConnection => {
                warn!(connection_id = %self.connection_id, "Authenticate raced disconnect");
            }
        }
    }

    /// Disconnect cleanup; emits the offline presence signal when this was
    /// the user's last connection.
    pub async fn disconnect(&self) {
        let outcome = self.registry.disconnect(&self.connection_id);
        if let Some((user_id, username)) = outcome.last_connection_of {
            self.registry
                .broadcast_topic(
                    &TopicKey::user(user_id.clone()),
                    &ServerMessage::UserOffline { user_id, username },
                )
                .await;
        }
    }

    async fn join_topic(&self, topic: TopicKey) {
        if !topic.is_read_only() && self.identity().is_none() {
            self.require_auth().await;
            return;
        }
        self.registry.join_topic(&self.connection_id, topic);
    }

    async fn leave_topic(&self, topic: &TopicKey) {
        self.registry.leave_topic(&self.connection_id, topic);
    }

    async fn request_feed(&self) {
        let Some((user_id, _)) = self.identity() else {
            self.require_auth().await;
            return;
        };
        let payload = match self.cache.cached_user_feed(&user_id).await {
            Some(snapshot) => {
                serde_json::from_str(&snapshot).unwrap_or(serde_json::Value::Null)
            }
            None => serde_json::Value::Null,
        };
        self.reply(ServerMessage::FeedUpdate {
            reason: "requested".into(),
            payload,
        })
        .await;
    }

    async fn request_recommendations(&self, limit: Option<usize>) {
        let Some((user_id, _)) = self.identity() else {
            self.require_auth().await;
            return;
        };
        let items = self
            .engine
            .generate_recommendations(&user_id, limit.unwrap_or(10))
            .await;
        self.reply(ServerMessage::Personalized { items }).await;
    }

    async fn submit_feedback(
        &self,
        user_id: UserId,
        content_id: crate::domain::ContentId,
        feedback: crate::domain::Feedback,
    ) {
        let Some((session_user, _)) = self.identity() else {
            self.require_auth().await;
            return;
        };
        // Feedback attribution must match the authenticated identity.
        if session_user != user_id {
            self.reply(ServerMessage::error(
                ErrorCode::UnauthorizedFeedback,
                "feedback may only be submitted for the authenticated user",
            ))
            .await;
            return;
        }
        self.engine
            .process_recommendation_feedback(&user_id, &content_id, feedback)
            .await;
    }

    fn identity(&self) -> Option<(UserId, String)> {
        self.registry.identity(&self.connection_id)
    }

    async fn require_auth(&self) {
        self.reply(ServerMessage::error(
            ErrorCode::AuthenticationRequired,
            "authenticate before using this command",
        ))
        .await;
    }

    async fn reply(&self, message: ServerMessage) {
        if let DeliveryResult::Failed(reason) = self.transport.send(message.to_json()).await {
            debug!(connection_id = %self.connection_id, reason = %reason, "Reply delivery failed");
        }
    }
}
