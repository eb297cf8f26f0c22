//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers and error types that form the
//! vocabulary of the realtime core.

mod auth;
mod errors;
mod ids;
mod timestamp;

pub use auth::{tokens_match, AuthError};
pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{BlockId, ConnectionId, TeamId, UserId, SINGLE_USER_ID};
pub use timestamp::Timestamp;
