//! Local fan-out of broadcast messages.
//!
//! Resolves recipients under the hub's read lock, releases it, then writes
//! to every recipient concurrently. A failed write closes and purges that
//! one connection, unless a reconnect replaced its sink in the meantime;
//! the rest of the fan-out is unaffected.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;

use crate::domain::foundation::{ConnectionId, TeamId, UserId};
use crate::domain::realtime::{Block, BroadcastScope, ClientConfig, ClusterMessage, OutboundMessage};

use super::hub::ListenerHub;

/// Outcome of one local fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Successful writes, counting duplicates.
    pub delivered: usize,
    /// Connections closed and purged because their write failed.
    pub evicted: Vec<ConnectionId>,
}

/// Builds the replicated form of a block change, or logs why it can't.
pub fn block_change_message(
    team_id: &TeamId,
    block: &Block,
    ensure_users: Vec<UserId>,
) -> Option<ClusterMessage> {
    match OutboundMessage::update_block(block) {
        Ok(message) => Some(ClusterMessage {
            scope: BroadcastScope::for_block(team_id.clone(), block),
            message,
            ensure_users,
        }),
        Err(e) => {
            tracing::warn!(
                team_id = %team_id,
                block_id = %block.id,
                error = %e,
                "Failed to serialize block update; broadcast skipped"
            );
            None
        }
    }
}

pub fn config_change_message(config: &ClientConfig) -> Option<ClusterMessage> {
    match OutboundMessage::client_config(config) {
        Ok(message) => Some(ClusterMessage {
            scope: BroadcastScope::Everyone,
            message,
            ensure_users: Vec::new(),
        }),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize client config; broadcast skipped");
            None
        }
    }
}

/// Pushes messages to the listeners attached to this node only.
#[derive(Clone)]
pub struct LocalBroadcaster {
    hub: Arc<ListenerHub>,
}

impl LocalBroadcaster {
    pub fn new(hub: Arc<ListenerHub>) -> Self {
        Self { hub }
    }

    pub fn hub(&self) -> &Arc<ListenerHub> {
        &self.hub
    }

    pub async fn deliver_cluster_message(&self, message: &ClusterMessage) -> DeliveryReport {
        self.deliver(&message.scope, &message.message, &message.ensure_users)
            .await
    }

    pub async fn deliver(
        &self,
        scope: &BroadcastScope,
        message: &OutboundMessage,
        ensure_users: &[UserId],
    ) -> DeliveryReport {
        let listeners = self.hub.listeners_for_scope(scope, ensure_users).await;
        if listeners.is_empty() {
            return DeliveryReport::default();
        }

        let results = join_all(listeners.iter().map(|listener| async move {
            let result = listener.sink.send(message).await;
            (listener, result)
        }))
        .await;

        let mut report = DeliveryReport::default();
        let mut failed = HashSet::new();
        for (listener, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    if failed.insert(listener.connection_id.clone()) {
                        tracing::warn!(
                            connection_id = %listener.connection_id,
                            action = %message.action,
                            error = %e,
                            "Write failed; evicting connection"
                        );
                        listener.sink.close().await;
                        let purged = self
                            .hub
                            .purge_if_sink(&listener.connection_id, &listener.sink)
                            .await;
                        if purged.is_some() {
                            report.evicted.push(listener.connection_id.clone());
                        }
                    }
                }
            }
        }

        tracing::debug!(
            action = %message.action,
            delivered = report.delivered,
            evicted = report.evicted.len(),
            "Local fan-out complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::adapters::realtime::RecordingSink;
    use crate::domain::foundation::BlockId;
    use crate::ports::{ConnectionSink, TransportError};

    /// Fails its write after a reconnect has swapped in `replacement`.
    struct ReplacedDuringWrite {
        hub: Arc<ListenerHub>,
        connection_id: ConnectionId,
        replacement: Arc<RecordingSink>,
    }

    #[async_trait]
    impl ConnectionSink for ReplacedDuringWrite {
        async fn send(&self, _message: &OutboundMessage) -> Result<(), TransportError> {
            self.hub
                .register(self.connection_id.clone(), None, self.replacement.clone())
                .await;
            Err(TransportError::Closed)
        }

        async fn close(&self) {}
    }

    fn conn(s: &str) -> ConnectionId {
        ConnectionId::new(s).unwrap()
    }

    fn team(s: &str) -> TeamId {
        TeamId::new(s).unwrap()
    }

    fn block(s: &str) -> BlockId {
        BlockId::new(s).unwrap()
    }

    #[tokio::test]
    async fn block_change_reaches_union_only() {
        let hub = Arc::new(ListenerHub::new());
        let team_sink = RecordingSink::new();
        let block_sink = RecordingSink::new();
        let parent_sink = RecordingSink::new();
        let outsider = RecordingSink::new();
        hub.register(conn("team"), None, team_sink.clone()).await;
        hub.register(conn("block"), None, block_sink.clone()).await;
        hub.register(conn("parent"), None, parent_sink.clone()).await;
        hub.register(conn("outsider"), None, outsider.clone()).await;
        hub.subscribe_team(&conn("team"), &team("t1")).await;
        hub.subscribe_blocks(&conn("block"), &[block("card")]).await;
        hub.subscribe_blocks(&conn("parent"), &[block("board")]).await;
        hub.subscribe_team(&conn("outsider"), &team("t2")).await;

        let card = Block::new(block("card")).with_parent(block("board"));
        let message = block_change_message(&team("t1"), &card, vec![]).unwrap();
        let report = LocalBroadcaster::new(hub)
            .deliver_cluster_message(&message)
            .await;

        assert_eq!(report.delivered, 3);
        assert_eq!(team_sink.actions(), vec!["UPDATE_BLOCK"]);
        assert_eq!(block_sink.message_count(), 1);
        assert_eq!(parent_sink.message_count(), 1);
        assert_eq!(outsider.message_count(), 0);
    }

    #[tokio::test]
    async fn failing_listener_is_evicted_without_blocking_others() {
        let hub = Arc::new(ListenerHub::new());
        let healthy = RecordingSink::new();
        let dead = RecordingSink::failing();
        hub.register(conn("healthy"), None, healthy.clone()).await;
        hub.register(conn("dead"), None, dead.clone()).await;
        for id in ["healthy", "dead"] {
            hub.subscribe_team(&conn(id), &team("t1")).await;
        }
        hub.subscribe_blocks(&conn("dead"), &[block("b1")]).await;

        let msg = block_change_message(&team("t1"), &Block::new(block("b1")), vec![]).unwrap();
        let report = LocalBroadcaster::new(hub.clone())
            .deliver_cluster_message(&msg)
            .await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.evicted, vec![conn("dead")]);
        assert_eq!(healthy.message_count(), 1);
        assert!(dead.is_closed());
        assert!(hub.lookup(&conn("dead")).await.is_none());
        hub.verify_consistency().await.unwrap();
    }

    #[tokio::test]
    async fn failed_write_on_a_replaced_sink_keeps_the_reconnected_listener() {
        let hub = Arc::new(ListenerHub::new());
        let replacement = RecordingSink::new();
        let stale = Arc::new(ReplacedDuringWrite {
            hub: Arc::clone(&hub),
            connection_id: conn("c1"),
            replacement: replacement.clone(),
        });
        hub.register(conn("c1"), None, stale).await;
        hub.subscribe_team(&conn("c1"), &team("t1")).await;

        let msg = block_change_message(&team("t1"), &Block::new(block("b1")), vec![]).unwrap();
        let report = LocalBroadcaster::new(hub.clone())
            .deliver_cluster_message(&msg)
            .await;
        assert_eq!(report.delivered, 0);
        assert!(report.evicted.is_empty());
        assert!(hub.lookup(&conn("c1")).await.is_some());
        assert_eq!(hub.listeners_for_team(&team("t1")).await.len(), 1);

        let report = LocalBroadcaster::new(hub.clone())
            .deliver_cluster_message(&msg)
            .await;
        assert_eq!(report.delivered, 1);
        assert_eq!(replacement.message_count(), 1);
        hub.verify_consistency().await.unwrap();
    }

    #[tokio::test]
    async fn config_change_reaches_everyone() {
        let hub = Arc::new(ListenerHub::new());
        let a = RecordingSink::new();
        let b = RecordingSink::new();
        hub.register(conn("a"), None, a.clone()).await;
        hub.register(conn("b"), None, b.clone()).await;
        hub.subscribe_team(&conn("a"), &team("t1")).await;

        let msg = config_change_message(&ClientConfig::default()).unwrap();
        let report = LocalBroadcaster::new(hub).deliver_cluster_message(&msg).await;

        assert_eq!(report.delivered, 2);
        assert_eq!(b.actions(), vec!["UPDATE_CLIENT_CONFIG"]);
    }

    #[tokio::test]
    async fn empty_scope_delivers_nothing() {
        let hub = Arc::new(ListenerHub::new());
        let msg = block_change_message(&team("t1"), &Block::new(block("b1")), vec![]).unwrap();

        let report = LocalBroadcaster::new(hub).deliver_cluster_message(&msg).await;

        assert_eq!(report, DeliveryReport::default());
    }
}
