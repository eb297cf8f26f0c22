//! Authentication errors for the session lookup performed by `AUTH`.
//!
//! These errors are **domain-centric**: they describe what went wrong from
//! the realtime core's perspective, not the session store's.

use subtle::ConstantTimeEq;
use thiserror::Error;

/// Errors that can occur while resolving a session token to a user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The token is missing, unknown, or malformed.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// The session exists but is past its expiry.
    #[error("Token expired")]
    TokenExpired,

    /// The session store is unavailable (network, pool exhaustion, ...).
    #[error("Auth service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AuthError {
    /// Creates a service unavailable error with a message.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Returns true if this is a transient error that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::ServiceUnavailable(_))
    }
}

/// Compares two tokens in constant time.
///
/// Prevents timing attacks that could leak a share or single-user token.
pub fn tokens_match(expected: &str, provided: &str) -> bool {
    let (a, b) = (expected.as_bytes(), provided.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
