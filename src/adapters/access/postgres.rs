//! PostgreSQL implementation of ReadTokenValidator.
//!
//! A read token is the share token of a board. Validation resolves the
//! block to its root board, then checks that board's `sharing` row is
//! enabled and carries the same token.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{tokens_match, BlockId, DomainError, ErrorCode, TeamId};
use crate::ports::ReadTokenValidator;

pub struct PostgresReadTokenValidator {
    pool: PgPool,
    blocks_table: String,
    sharing_table: String,
}

impl PostgresReadTokenValidator {
    pub fn new(pool: PgPool, table_prefix: &str) -> Self {
        Self {
            pool,
            blocks_table: format!("{}blocks", table_prefix),
            sharing_table: format!("{}sharing", table_prefix),
        }
    }

    /// The block's root board ID; a block without a root is its own root.
    async fn root_id(&self, block_id: &BlockId) -> Result<Option<String>, DomainError> {
        let query = format!("SELECT root_id FROM {} WHERE id = $1", self.blocks_table);
        let row: Option<(Option<String>,)> = sqlx::query_as(&query)
            .bind(block_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::DatabaseError,
                    format!("Failed to resolve block root: {}", e),
                )
            })?;

        Ok(row.map(|(root,)| {
            root.filter(|r| !r.is_empty())
                .unwrap_or_else(|| block_id.as_str().to_string())
        }))
    }
}

#[async_trait]
impl ReadTokenValidator for PostgresReadTokenValidator {
    async fn is_valid_read_token(
        &self,
        scope: &TeamId,
        block_id: &BlockId,
        token: &str,
    ) -> Result<bool, DomainError> {
        let Some(root_id) = self.root_id(block_id).await? else {
            tracing::debug!(team_id = %scope, block_id = %block_id, "Read token for unknown block");
            return Ok(false);
        };

        let query = format!("SELECT enabled, token FROM {} WHERE id = $1", self.sharing_table);
        let row: Option<(bool, String)> = sqlx::query_as(&query)
            .bind(&root_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::DatabaseError,
                    format!("Failed to load sharing: {}", e),
                )
                .with_detail("root_id", root_id.clone())
            })?;

        Ok(matches!(row, Some((true, expected)) if tokens_match(&expected, token)))
    }
}
