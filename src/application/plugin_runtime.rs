//! Plugin-mode bootstrap.
//!
//! Builds a [`PluginAdapter`] from [`AppConfig`], connects the cluster bus
//! and starts the background tasks:
//!
//! - Redis subscriber (when the cluster transport is Redis), which
//!   resubscribes on its own after a dropped connection
//! - Cluster publish queue
//! - Periodic stale-connection sweep
//!
//! All of them stop on [`PluginRuntime::shutdown`].

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::adapters::cluster::RedisClusterTransport;
use crate::adapters::realtime::{
    ClusterPublisher, ClusterPublisherConfig, CommandDispatcher, ListenerHub, PluginAdapter,
    PluginSettings, CLUSTER_EVENT_ID,
};
use crate::config::{AppConfig, RealtimeConfig, RealtimeMode, ValidationError};
use crate::ports::{
    ClusterError, ClusterTransport, PluginHost, ReadTokenValidator, ServerId, TeamAccessChecker,
};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("realtime mode must be 'plugin' to start a plugin runtime")]
    NotPluginMode,

    #[error("invalid configuration: {0}")]
    Config(#[from] ValidationError),

    #[error("cluster transport unavailable: {0}")]
    Cluster(#[from] ClusterError),

    #[error("timed out connecting to the cluster bus")]
    ConnectTimeout,
}

fn plugin_settings(realtime: &RealtimeConfig) -> PluginSettings {
    PluginSettings {
        message_prefix: realtime.message_prefix.clone(),
        stale_threshold: realtime.stale_threshold(),
        reap_interval: realtime.reap_interval(),
    }
}

fn publisher_config(realtime: &RealtimeConfig) -> ClusterPublisherConfig {
    ClusterPublisherConfig {
        queue_capacity: realtime.cluster_queue_capacity,
        workers: realtime.cluster_workers,
    }
}

/// A running plugin-mode realtime engine.
pub struct PluginRuntime {
    adapter: Arc<PluginAdapter>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    publisher_task: Option<JoinHandle<()>>,
}

impl PluginRuntime {
    /// Starts the engine.
    ///
    /// `host_transport` takes precedence over the configured Redis bus. With
    /// neither, the node runs without cluster fan-out.
    pub async fn start(
        config: &AppConfig,
        host: Arc<dyn PluginHost>,
        team_access: Arc<dyn TeamAccessChecker>,
        read_tokens: Arc<dyn ReadTokenValidator>,
        host_transport: Option<Arc<dyn ClusterTransport>>,
    ) -> Result<Self, RuntimeError> {
        if config.realtime.mode != RealtimeMode::Plugin {
            return Err(RuntimeError::NotPluginMode);
        }
        config.validate()?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        let transport: Option<Arc<dyn ClusterTransport>> = match (host_transport, &config.redis) {
            (Some(transport), _) => Some(transport),
            (None, Some(redis)) => {
                let server_id = ServerId::new(format!("{}-{}", ServerId::from_env(), Uuid::new_v4().simple()));
                let transport = tokio::time::timeout(
                    redis.timeout(),
                    RedisClusterTransport::connect(&redis.url, redis.channel_prefix.clone(), server_id),
                )
                .await
                .map_err(|_| RuntimeError::ConnectTimeout)??;
                let transport = Arc::new(transport);

                let subscriber = Arc::clone(&transport);
                let rx = shutdown_rx.clone();
                tasks.push(tokio::spawn(async move { subscriber.run(rx).await }));
                Some(transport as Arc<dyn ClusterTransport>)
            }
            (None, None) => {
                tracing::warn!("No cluster transport configured; broadcasts stay on this node");
                None
            }
        };

        let dispatcher = CommandDispatcher::new(Arc::new(ListenerHub::new()), team_access, read_tokens);
        let mut adapter = PluginAdapter::new(Arc::new(dispatcher), host, plugin_settings(&config.realtime));

        let mut publisher_task = None;
        if let Some(transport) = transport {
            transport.register_handler(CLUSTER_EVENT_ID, adapter.cluster_handler());
            let (publisher, handle) =
                ClusterPublisher::spawn(transport, publisher_config(&config.realtime));
            adapter = adapter.with_cluster(publisher);
            publisher_task = Some(handle);
        }

        let reaper = adapter.reaper();
        tasks.push(tokio::spawn(async move { reaper.run(shutdown_rx).await }));

        tracing::info!(
            prefix = %config.realtime.message_prefix,
            clustered = publisher_task.is_some(),
            "Plugin realtime engine started"
        );

        Ok(Self {
            adapter: Arc::new(adapter),
            shutdown,
            tasks,
            publisher_task,
        })
    }

    /// The adapter to route host callbacks and broadcasts through.
    pub fn adapter(&self) -> &Arc<PluginAdapter> {
        &self.adapter
    }

    /// Signals every background task and waits for them to finish.
    ///
    /// Broadcasts still queued for peer nodes are dropped.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Some(publisher) = self.publisher_task {
            publisher.abort();
            let _ = publisher.await;
        }
        for task in self.tasks {
            let _ = task.await;
        }
        tracing::info!("Plugin realtime engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    use crate::adapters::access::{StaticReadTokens, StaticTeamAccess};
    use crate::adapters::cluster::InMemoryClusterNetwork;
    use crate::adapters::realtime::RecordingPluginHost;
    use crate::domain::foundation::{BlockId, ConnectionId, TeamId, UserId};
    use crate::domain::realtime::Block;
    use crate::ports::RealtimeNotifier;

    fn plugin_config() -> AppConfig {
        AppConfig {
            realtime: RealtimeConfig {
                mode: RealtimeMode::Plugin,
                host_cluster_transport: true,
                ..RealtimeConfig::default()
            },
            ..AppConfig::default()
        }
    }

    fn access() -> Arc<StaticTeamAccess> {
        Arc::new(StaticTeamAccess::new().grant(UserId::new("u1").unwrap(), TeamId::new("t1").unwrap()))
    }

    async fn start(
        host: Arc<RecordingPluginHost>,
        transport: Option<Arc<dyn ClusterTransport>>,
    ) -> PluginRuntime {
        PluginRuntime::start(
            &plugin_config(),
            host,
            access(),
            Arc::new(StaticReadTokens::new()),
            transport,
        )
        .await
        .unwrap()
    }

    #[test]
    fn plugin_settings_follow_config() {
        let config = RealtimeConfig {
            stale_threshold_secs: 30,
            reap_interval_secs: 5,
            message_prefix: "boards_".to_string(),
            ..Default::default()
        };
        let settings = plugin_settings(&config);
        assert_eq!(settings.message_prefix, "boards_");
        assert_eq!(settings.stale_threshold, Duration::from_secs(30));
        assert_eq!(settings.reap_interval, Duration::from_secs(5));
    }

    #[test]
    fn publisher_config_follows_config() {
        let config = RealtimeConfig {
            cluster_queue_capacity: 16,
            cluster_workers: 4,
            ..Default::default()
        };
        let publisher = publisher_config(&config);
        assert_eq!(publisher.queue_capacity, 16);
        assert_eq!(publisher.workers, 4);
    }

    #[tokio::test]
    async fn standalone_mode_is_rejected() {
        let result = PluginRuntime::start(
            &AppConfig::default(),
            RecordingPluginHost::new(),
            access(),
            Arc::new(StaticReadTokens::new()),
            None,
        )
        .await;

        assert!(matches!(result, Err(RuntimeError::NotPluginMode)));
    }

    #[tokio::test]
    async fn plugin_mode_without_bus_or_host_transport_is_rejected() {
        let config = AppConfig {
            realtime: RealtimeConfig {
                mode: RealtimeMode::Plugin,
                ..RealtimeConfig::default()
            },
            ..AppConfig::default()
        };

        let result = PluginRuntime::start(
            &config,
            RecordingPluginHost::new(),
            access(),
            Arc::new(StaticReadTokens::new()),
            None,
        )
        .await;

        assert!(matches!(
            result,
            Err(RuntimeError::Config(ValidationError::MissingRequired("REDIS_URL")))
        ));
    }

    #[tokio::test]
    async fn host_transport_carries_broadcasts_between_runtimes() {
        let network = InMemoryClusterNetwork::new();
        let host_a = RecordingPluginHost::new();
        let host_b = RecordingPluginHost::new();
        let a = start(host_a.clone(), Some(network.node(ServerId::new("a")))).await;
        let b = start(host_b.clone(), Some(network.node(ServerId::new("b")))).await;

        let conn = ConnectionId::new("b1").unwrap();
        let user = UserId::new("u1").unwrap();
        b.adapter().on_web_connection_opened(&conn, &user).await;
        b.adapter()
            .on_web_socket_message(&conn, &user, "custom_boards_SUBSCRIBE_TEAM", &json!({"teamId": "t1"}))
            .await;

        a.adapter()
            .broadcast_block_change(&TeamId::new("t1").unwrap(), &Block::new(BlockId::new("x").unwrap()))
            .await;

        for _ in 0..200 {
            if !host_b.deliveries().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(host_b.deliveries_to(&conn).len(), 1);
        assert!(host_a.deliveries().is_empty());

        a.shutdown().await;
        b.shutdown().await;
    }
}
