//! Team access for standalone deployments.
//!
//! A standalone server hosts exactly one team; every authenticated user may
//! watch it and no other team exists.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, TeamId, UserId};
use crate::ports::TeamAccessChecker;

/// ID of the only team on a standalone server.
pub const DEFAULT_TEAM_ID: &str = "0";

#[derive(Debug, Clone)]
pub struct SingleTeamAccess {
    team_id: String,
}

impl SingleTeamAccess {
    pub fn new(team_id: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
        }
    }
}

impl Default for SingleTeamAccess {
    fn default() -> Self {
        Self::new(DEFAULT_TEAM_ID)
    }
}

#[async_trait]
impl TeamAccessChecker for SingleTeamAccess {
    async fn has_access(&self, _user_id: &UserId, team_id: &TeamId) -> Result<bool, DomainError> {
        Ok(team_id.as_str() == self.team_id)
    }
}
