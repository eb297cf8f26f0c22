//! RealtimeNotifier port - how mutation code announces changes.
//!
//! Callers invoke these after the mutation has committed. Every method is
//! fire-and-forget: delivery failures are handled (and logged) inside the
//! adapter and never surface to the caller.
//!
//! # Example
//!
//! ```ignore
//! repo.save(&block).await?;
//! notifier.broadcast_block_change(&team_id, &block).await;
//! ```

use async_trait::async_trait;

use crate::domain::foundation::{BlockId, TeamId, Timestamp};
use crate::domain::realtime::{Block, ClientConfig};

#[async_trait]
pub trait RealtimeNotifier: Send + Sync {
    /// Notify listeners of `team_id`, of `block.id` and of `block.parent_id`.
    async fn broadcast_block_change(&self, team_id: &TeamId, block: &Block);

    /// One `UPDATE_BLOCK` per block, in order.
    async fn broadcast_block_changes(&self, team_id: &TeamId, blocks: &[Block]) {
        for block in blocks {
            self.broadcast_block_change(team_id, block).await;
        }
    }

    /// A delete travels as an update whose `updateAt == deleteAt == now`.
    async fn broadcast_block_delete(
        &self,
        team_id: &TeamId,
        block_id: &BlockId,
        parent_id: Option<&BlockId>,
    ) {
        let marker = Block::deletion_marker(block_id.clone(), parent_id.cloned(), Timestamp::now());
        self.broadcast_block_change(team_id, &marker).await;
    }

    /// Send the snapshot to every registered connection.
    async fn broadcast_config_change(&self, config: &ClientConfig);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingNotifier {
        blocks: Mutex<Vec<(TeamId, Block)>>,
    }

    #[async_trait]
    impl RealtimeNotifier for CapturingNotifier {
        async fn broadcast_block_change(&self, team_id: &TeamId, block: &Block) {
            self.blocks
                .lock()
                .unwrap()
                .push((team_id.clone(), block.clone()));
        }

        async fn broadcast_config_change(&self, _config: &ClientConfig) {}
    }

    #[tokio::test]
    async fn delete_is_routed_through_change_path() {
        let notifier = CapturingNotifier::default();
        let team = TeamId::new("team-1").unwrap();
        let block = BlockId::new("card-1").unwrap();
        let parent = BlockId::new("board-1").unwrap();

        notifier
            .broadcast_block_delete(&team, &block, Some(&parent))
            .await;

        let captured = notifier.blocks.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let (t, marker) = &captured[0];
        assert_eq!(t, &team);
        assert_eq!(marker.id, block);
        assert_eq!(marker.parent_id.as_ref(), Some(&parent));
        assert!(marker.is_deleted());
        assert_eq!(marker.update_at, marker.delete_at);
    }

    #[tokio::test]
    async fn batched_changes_preserve_order() {
        let notifier = CapturingNotifier::default();
        let team = TeamId::new("team-1").unwrap();
        let blocks = vec![
            Block::new(BlockId::new("a").unwrap()),
            Block::new(BlockId::new("b").unwrap()),
        ];

        notifier.broadcast_block_changes(&team, &blocks).await;

        let ids: Vec<String> = notifier
            .blocks
            .lock()
            .unwrap()
            .iter()
            .map(|(_, b)| b.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
