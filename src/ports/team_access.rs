//! Team access port.
//!
//! The dispatcher asks this before letting a user listen to a team's
//! updates. Implementations may hit storage; they are always called
//! outside the listener hub's lock.
//!
//! # Design
//!
//! Callers treat `Err` exactly like `Ok(false)`: on any error, access is
//! denied.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, TeamId, UserId};

/// Predicate: may `user_id` see updates for `team_id`?
#[async_trait]
pub trait TeamAccessChecker: Send + Sync {
    async fn has_access(&self, user_id: &UserId, team_id: &TeamId) -> Result<bool, DomainError>;
}
