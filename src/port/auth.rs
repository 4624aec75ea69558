//! Token verification port.
//!
//! Credential issuance lives in the account service; this subsystem only
//! verifies presented tokens through a narrow interface.

use async_trait::async_trait;

use crate::domain::UserId;
use crate::error::AuthError;

/// Verified identity extracted from a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub user_id: UserId,
    pub username: String,
}

/// Port for verifying a client-supplied access token.
///
/// Implementations: `HttpVerifier` (introspection call against the account
/// service) and the testkit's `StaticVerifier`.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify a token and return its claims.
    ///
    /// Every failure mode (malformed, expired, bad signature, upstream
    /// unreachable, timeout) maps to an [`AuthError`]; the gateway leaves
    /// the connection open and unauthenticated on any of them.
    async fn verify(&self, token: &str) -> Result<TokenClaims, AuthError>;
}
