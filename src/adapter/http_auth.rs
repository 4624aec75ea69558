//! Token verification against the account service.
//!
//! Token issuance (login, refresh, registration) lives elsewhere; this
//! adapter only asks the account service whether a presented token is
//! valid. A token that was already consumed or rotated is strictly
//! invalid — there is no environment-dependent leniency for re-use.

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::UserId;
use crate::error::AuthError;
use crate::port::{TokenClaims, TokenVerifier};

#[derive(Debug, Deserialize)]
struct IntrospectResponse {
    valid: bool,
    user_id: Option<String>,
    username: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// [`TokenVerifier`] backed by the account service's introspection endpoint.
pub struct HttpVerifier {
    client: reqwest::Client,
    url: String,
}

impl HttpVerifier {
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl TokenVerifier for HttpVerifier {
    async fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Malformed);
        }

        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::Timeout
                } else {
                    AuthError::Unavailable(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(AuthError::Unavailable(format!(
                "introspection returned {}",
                response.status()
            )));
        }

        let body: IntrospectResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        if !body.valid {
            return Err(match body.reason.as_deref() {
                Some("expired") => AuthError::Expired,
                Some("bad_signature") => AuthError::InvalidSignature,
                Some("malformed") => AuthError::Malformed,
                Some(other) => AuthError::Rejected(other.to_string()),
                None => AuthError::Rejected("invalid token".into()),
            });
        }

        match (body.user_id, body.username) {
            (Some(user_id), Some(username)) => Ok(TokenClaims {
                user_id: UserId::new(user_id),
                username,
            }),
            _ => Err(AuthError::Rejected("introspection omitted identity".into())),
        }
    }
}
