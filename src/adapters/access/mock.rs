//! Static access collaborators for testing.
//!
//! Grants are fixed at construction; a `failing()` variant returns storage
//! errors so the deny-on-error path can be exercised.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::domain::foundation::{tokens_match, BlockId, DomainError, TeamId, UserId};
use crate::ports::{ReadTokenValidator, TeamAccessChecker};

/// Grants team access to an explicit list of (user, team) pairs.
#[derive(Debug, Default)]
pub struct StaticTeamAccess {
    grants: HashSet<(UserId, TeamId)>,
    failing: bool,
}

impl StaticTeamAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, user_id: UserId, team_id: TeamId) -> Self {
        self.grants.insert((user_id, team_id));
        self
    }

    /// Every check fails with a database error.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl TeamAccessChecker for StaticTeamAccess {
    async fn has_access(&self, user_id: &UserId, team_id: &TeamId) -> Result<bool, DomainError> {
        if self.failing {
            return Err(DomainError::database("team access store unavailable"));
        }
        Ok(self.grants.contains(&(user_id.clone(), team_id.clone())))
    }
}

/// Accepts one share token per block.
#[derive(Debug, Default)]
pub struct StaticReadTokens {
    tokens: HashMap<BlockId, String>,
    failing: bool,
}

impl StaticReadTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, block_id: BlockId, token: impl Into<String>) -> Self {
        self.tokens.insert(block_id, token.into());
        self
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ReadTokenValidator for StaticReadTokens {
    async fn is_valid_read_token(
        &self,
        _scope: &TeamId,
        block_id: &BlockId,
        token: &str,
    ) -> Result<bool, DomainError> {
        if self.failing {
            return Err(DomainError::database("sharing store unavailable"));
        }
        Ok(self
            .tokens
            .get(block_id)
            .is_some_and(|expected| tokens_match(expected, token)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn grants_are_exact_pairs() {
        let u1 = UserId::new("u1").unwrap();
        let t1 = TeamId::new("t1").unwrap();
        let access = StaticTeamAccess::new().grant(u1.clone(), t1.clone());

        assert!(access.has_access(&u1, &t1).await.unwrap());
        assert!(!access
            .has_access(&UserId::new("u2").unwrap(), &t1)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn read_token_must_match_block() {
        let t = TeamId::new("t1").unwrap();
        let b1 = BlockId::new("b1").unwrap();
        let tokens = StaticReadTokens::new().allow(b1.clone(), "share");

        assert!(tokens.is_valid_read_token(&t, &b1, "share").await.unwrap());
        assert!(!tokens.is_valid_read_token(&t, &b1, "other").await.unwrap());
        assert!(!tokens
            .is_valid_read_token(&t, &BlockId::new("b2").unwrap(), "share")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn failing_variants_return_errors() {
        let t = TeamId::new("t1").unwrap();
        let u = UserId::new("u1").unwrap();

        assert!(StaticTeamAccess::failing().has_access(&u, &t).await.is_err());
        assert!(StaticReadTokens::failing()
            .is_valid_read_token(&t, &BlockId::new("b").unwrap(), "x")
            .await
            .is_err());
    }
}
