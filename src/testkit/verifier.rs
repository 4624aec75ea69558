use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::UserId;
use crate::error::AuthError;
use crate::port::{TokenClaims, TokenVerifier};

/// [`TokenVerifier`] over a fixed token table.
#[derive(Default)]
pub struct StaticVerifier {
    tokens: RwLock<HashMap<String, TokenClaims>>,
}

impl StaticVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as belonging to `user_id`.
    pub fn allow(&self, token: &str, user_id: &str) {
        self.tokens.write().insert(
            token.to_string(),
            TokenClaims {
                user_id: UserId::new(user_id),
                username: user_id.to_string(),
            },
        );
    }

    /// Forget a previously allowed token.
    pub fn revoke(&self, token: &str) {
        self.tokens.write().remove(token);
    }
}

#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Malformed);
        }
        self.tokens
            .read()
            .get(token)
            .cloned()
            .ok_or_else(|| AuthError::Rejected("unknown token".into()))
    }
}
