//! Read-token validation port.
//!
//! A read token is a capability granting anonymous access to one shared
//! board's blocks. The dispatcher checks it once per block ID in a
//! `SUBSCRIBE_BLOCKS`/`UNSUBSCRIBE_BLOCKS` batch.

use async_trait::async_trait;

use crate::domain::foundation::{BlockId, DomainError, TeamId};

/// Checks whether `token` grants read access to `block_id` within `scope`.
#[async_trait]
pub trait ReadTokenValidator: Send + Sync {
    async fn is_valid_read_token(
        &self,
        scope: &TeamId,
        block_id: &BlockId,
        token: &str,
    ) -> Result<bool, DomainError>;
}
