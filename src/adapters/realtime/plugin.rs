//! Plugin surface: running inside a host that owns the sockets.
//!
//! The host tells us when a connection opens (with its user already bound),
//! closes, or sends a message; we publish back through [`PluginHost`].
//! Differences from the standalone surface:
//!
//! - Connections are authenticated from the start; `AUTH` is a no-op
//! - A close only marks the connection inactive; a reopen with the same ID
//!   keeps its subscriptions and the reaper purges the rest later
//! - Inbound actions carry a prefix; unprefixed actions belong to someone
//!   else and are ignored
//! - Every broadcast is also queued for peer nodes

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::foundation::{ConnectionId, TeamId, UserId};
use crate::domain::realtime::{Block, ClientConfig, ClusterMessage, Command, OutboundMessage};
use crate::ports::{ClusterEventHandler, ConnectionSink, PluginHost, RealtimeNotifier, TransportError};

use super::broadcaster::{block_change_message, config_change_message, LocalBroadcaster};
use super::cluster::{ClusterInbound, ClusterPublisher};
use super::dispatcher::{CommandDispatcher, DispatchOutcome};
use super::hub::{ListenerHub, RegisterOutcome};
use super::reaper::StaleConnectionReaper;

/// Publishes to one host connection as `<prefix><ACTION>`.
pub struct PluginConnectionSink {
    host: Arc<dyn PluginHost>,
    connection_id: ConnectionId,
    event_prefix: String,
}

#[async_trait]
impl ConnectionSink for PluginConnectionSink {
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let event = format!("{}{}", self.event_prefix, message.action);
        self.host
            .send_to_connection(&self.connection_id, &event, &message.payload)
            .await
    }

    async fn close(&self) {
        // the host owns the socket
    }
}

#[derive(Debug, Clone)]
pub struct PluginSettings {
    pub message_prefix: String,
    pub stale_threshold: Duration,
    pub reap_interval: Duration,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            message_prefix: "custom_boards_".to_string(),
            stale_threshold: Duration::from_secs(300),
            reap_interval: Duration::from_secs(60),
        }
    }
}

pub struct PluginAdapter {
    dispatcher: Arc<CommandDispatcher>,
    broadcaster: LocalBroadcaster,
    host: Arc<dyn PluginHost>,
    reaper: Arc<StaleConnectionReaper>,
    inbound: Arc<ClusterInbound>,
    cluster: Option<ClusterPublisher>,
    message_prefix: String,
}

impl PluginAdapter {
    pub fn new(
        dispatcher: Arc<CommandDispatcher>,
        host: Arc<dyn PluginHost>,
        settings: PluginSettings,
    ) -> Self {
        let hub = Arc::clone(dispatcher.hub());
        let broadcaster = LocalBroadcaster::new(Arc::clone(&hub));
        let reaper = Arc::new(StaleConnectionReaper::new(
            hub,
            settings.stale_threshold,
            settings.reap_interval,
        ));
        let inbound = Arc::new(ClusterInbound::new(broadcaster.clone()));
        Self {
            dispatcher,
            broadcaster,
            host,
            reaper,
            inbound,
            cluster: None,
            message_prefix: settings.message_prefix,
        }
    }

    /// Replicate broadcasts to peer nodes through `publisher`.
    pub fn with_cluster(mut self, publisher: ClusterPublisher) -> Self {
        self.cluster = Some(publisher);
        self
    }

    pub fn hub(&self) -> &Arc<ListenerHub> {
        self.dispatcher.hub()
    }

    /// For spawning the periodic sweep.
    pub fn reaper(&self) -> Arc<StaleConnectionReaper> {
        Arc::clone(&self.reaper)
    }

    /// The handler to register with the cluster transport.
    pub fn cluster_handler(&self) -> Arc<dyn ClusterEventHandler> {
        self.inbound.clone()
    }

    fn sink_for(&self, connection_id: &ConnectionId) -> Arc<dyn ConnectionSink> {
        Arc::new(PluginConnectionSink {
            host: Arc::clone(&self.host),
            connection_id: connection_id.clone(),
            event_prefix: self.message_prefix.clone(),
        })
    }

    pub async fn on_web_connection_opened(&self, connection_id: &ConnectionId, user_id: &UserId) {
        let outcome = self
            .hub()
            .register(
                connection_id.clone(),
                Some(user_id.clone()),
                self.sink_for(connection_id),
            )
            .await;
        if outcome == RegisterOutcome::Reactivated {
            tracing::debug!(connection_id = %connection_id, "Plugin connection resumed");
        }
        self.reaper.on_user_connected(user_id, connection_id).await;
    }

    pub async fn on_web_connection_closed(&self, connection_id: &ConnectionId) {
        self.hub().mark_inactive(connection_id).await;
    }

    /// Handles one host websocket message. Foreign actions return `Ignored`.
    pub async fn on_web_socket_message(
        &self,
        connection_id: &ConnectionId,
        user_id: &UserId,
        action: &str,
        data: &Value,
    ) -> DispatchOutcome {
        let command = match Command::from_plugin_message(action, data, &self.message_prefix) {
            Ok(Some(command)) => command,
            Ok(None) => return DispatchOutcome::Ignored,
            Err(e) => {
                tracing::warn!(connection_id = %connection_id, action, error = %e, "Dropping malformed plugin command");
                return DispatchOutcome::Ignored;
            }
        };

        if self.hub().lookup(connection_id).await.is_none() {
            self.on_web_connection_opened(connection_id, user_id).await;
        }
        self.dispatcher.dispatch(connection_id, command).await
    }

    /// Replays a peer node's broadcast locally. Never republishes.
    pub async fn on_cluster_event(&self, data: Vec<u8>) {
        self.inbound.handle(data).await;
    }

    /// Block change that also reaches every connection of `ensure_users`.
    pub async fn broadcast_block_change_to(
        &self,
        team_id: &TeamId,
        block: &Block,
        ensure_users: Vec<UserId>,
    ) {
        if let Some(message) = block_change_message(team_id, block, ensure_users) {
            self.broadcast(message).await;
        }
    }

    async fn broadcast(&self, message: ClusterMessage) {
        self.broadcaster.deliver_cluster_message(&message).await;
        if let Some(cluster) = &self.cluster {
            cluster.enqueue(message);
        }
    }
}

#[async_trait]
impl RealtimeNotifier for PluginAdapter {
    async fn broadcast_block_change(&self, team_id: &TeamId, block: &Block) {
        self.broadcast_block_change_to(team_id, block, Vec::new())
            .await;
    }

    async fn broadcast_config_change(&self, config: &ClientConfig) {
        if let Some(message) = config_change_message(config) {
            self.broadcast(message).await;
        }
    }
}
