//! Mock session validator for testing.
//!
//! Implements the `SessionValidator` port without a session store.
//!
//! # Example
//!
//! ```ignore
//! use boards_realtime::adapters::auth::MockSessionValidator;
//! use boards_realtime::domain::foundation::UserId;
//!
//! let validator = MockSessionValidator::new()
//!     .with_user("valid-token", UserId::new("user-123").unwrap());
//!
//! assert!(validator.validate("valid-token").await.is_ok());
//! ```

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, UserId};
use crate::ports::SessionValidator;

/// Stores a map of tokens to users. Tokens not in the map return `InvalidToken`.
#[derive(Debug, Default)]
pub struct MockSessionValidator {
    tokens: RwLock<HashMap<String, UserId>>,
    /// Optional error to return for all validations (for error testing)
    force_error: RwLock<Option<AuthError>>,
}

impl MockSessionValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, token: impl Into<String>, user_id: UserId) -> Self {
        self.tokens.write().unwrap().insert(token.into(), user_id);
        self
    }

    /// Forces all validations to return the specified error.
    pub fn with_error(self, error: AuthError) -> Self {
        *self.force_error.write().unwrap() = Some(error);
        self
    }

    /// Removes a token, as if its session were revoked.
    pub fn revoke(&self, token: &str) {
        self.tokens.write().unwrap().remove(token);
    }
}

#[async_trait]
impl SessionValidator for MockSessionValidator {
    async fn validate(&self, token: &str) -> Result<UserId, AuthError> {
        if let Some(error) = self.force_error.read().unwrap().clone() {
            return Err(error);
        }

        self.tokens
            .read()
            .unwrap()
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_token_resolves_user() {
        let validator =
            MockSessionValidator::new().with_user("t1", UserId::new("user-1").unwrap());

        let user = validator.validate("t1").await.unwrap();
        assert_eq!(user.as_str(), "user-1");
    }

    #[tokio::test]
    async fn revoked_token_is_invalid() {
        let validator =
            MockSessionValidator::new().with_user("t1", UserId::new("user-1").unwrap());
        validator.revoke("t1");

        assert_eq!(validator.validate("t1").await, Err(AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn forced_error_wins() {
        let validator = MockSessionValidator::new()
            .with_user("t1", UserId::new("user-1").unwrap())
            .with_error(AuthError::TokenExpired);

        assert_eq!(validator.validate("t1").await, Err(AuthError::TokenExpired));
    }
}
