//! Session validation port used by the `AUTH` command.
//!
//! Resolves a session token to the user it belongs to. Only standalone
//! deployments use it; plugin hosts bind the user at connect time.

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, UserId};

/// Resolves session tokens to users.
///
/// # Contract
///
/// Implementations must:
/// - Return `AuthError::InvalidToken` for unknown tokens
/// - Return `AuthError::TokenExpired` for sessions past their lifetime
/// - Return `AuthError::ServiceUnavailable` for transient store errors
#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// Look up the user owning `token`.
    async fn validate(&self, token: &str) -> Result<UserId, AuthError>;
}
