//! PostgreSQL implementation of SessionValidator.
//!
//! Looks the token up in the boards `sessions` table. A session whose last
//! update is older than the expiry window is treated as expired.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{AuthError, Timestamp, UserId};
use crate::ports::SessionValidator;

/// Default session lifetime: 30 days.
pub const DEFAULT_SESSION_EXPIRY: Duration = Duration::from_secs(60 * 60 * 24 * 30);

pub struct PostgresSessionValidator {
    pool: PgPool,
    table: String,
    expiry: Duration,
}

impl PostgresSessionValidator {
    /// `table_prefix` is prepended to `sessions` (e.g. `focalboard_sessions`).
    pub fn new(pool: PgPool, table_prefix: &str) -> Self {
        Self {
            pool,
            table: format!("{}sessions", table_prefix),
            expiry: DEFAULT_SESSION_EXPIRY,
        }
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }
}

#[async_trait]
impl SessionValidator for PostgresSessionValidator {
    async fn validate(&self, token: &str) -> Result<UserId, AuthError> {
        let query = format!("SELECT user_id, update_at FROM {} WHERE token = $1", self.table);

        let row: Option<(String, i64)> = sqlx::query_as(&query)
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuthError::service_unavailable(format!("Session lookup failed: {}", e)))?;

        let Some((user_id, update_at)) = row else {
            return Err(AuthError::InvalidToken);
        };

        let cutoff = Timestamp::now().minus(self.expiry).as_millis();
        if update_at < cutoff {
            return Err(AuthError::TokenExpired);
        }

        UserId::new(user_id).map_err(|_| AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_expiry_is_thirty_days() {
        assert_eq!(DEFAULT_SESSION_EXPIRY.as_secs(), 2_592_000);
    }
}
