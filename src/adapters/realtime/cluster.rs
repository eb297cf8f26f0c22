//! Cluster fan-out: replicate local broadcasts to peer nodes.
//!
//! # Outbound
//!
//! [`ClusterPublisher::enqueue`] never blocks the mutation path. Messages go
//! into a bounded queue; a dispatcher task drains it and runs each publish
//! on a task gated by a semaphore, so at most `workers` publishes are in
//! flight. A full queue drops the message with a warning.
//!
//! # Inbound
//!
//! [`ClusterInbound`] decodes a peer's bytes and runs the *local-only*
//! fan-out. It never publishes, which is what keeps a broadcast from
//! bouncing between nodes forever.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::domain::realtime::ClusterMessage;
use crate::ports::{ClusterEventHandler, ClusterTransport, PublishOptions};

use super::broadcaster::LocalBroadcaster;

/// Event kind under which broadcasts travel between nodes.
pub const CLUSTER_EVENT_ID: &str = "websocket_message";

/// Configuration for the outbound publish pipeline.
///
/// | Setting | Default | Description |
/// |---------|---------|-------------|
/// | `queue_capacity` | 1024 | Messages buffered before new ones are dropped |
/// | `workers` | 2 | Concurrent publishes to the transport |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterPublisherConfig {
    pub queue_capacity: usize,
    pub workers: usize,
}

impl Default for ClusterPublisherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            workers: 2,
        }
    }
}

/// Producer handle for outbound cluster messages.
///
/// Dropping every clone closes the queue; the dispatcher task then drains
/// what is buffered and exits.
#[derive(Clone)]
pub struct ClusterPublisher {
    sender: mpsc::Sender<ClusterMessage>,
}

impl ClusterPublisher {
    /// Starts the dispatcher task on the current runtime.
    pub fn spawn(
        transport: Arc<dyn ClusterTransport>,
        config: ClusterPublisherConfig,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let workers = Arc::new(Semaphore::new(config.workers.max(1)));
        let handle = tokio::spawn(dispatch_loop(receiver, transport, workers));
        (Self { sender }, handle)
    }

    /// Queues `message` for publication. Returns false if it was dropped.
    pub fn enqueue(&self, message: ClusterMessage) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                tracing::warn!(
                    action = %message.message.action,
                    "Cluster publish queue full; dropping broadcast for peer nodes"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Cluster publisher stopped; dropping broadcast for peer nodes");
                false
            }
        }
    }
}

async fn dispatch_loop(
    mut receiver: mpsc::Receiver<ClusterMessage>,
    transport: Arc<dyn ClusterTransport>,
    workers: Arc<Semaphore>,
) {
    while let Some(message) = receiver.recv().await {
        let Ok(permit) = Arc::clone(&workers).acquire_owned().await else {
            break;
        };
        let transport = Arc::clone(&transport);
        tokio::spawn(async move {
            let _permit = permit;
            publish_one(transport.as_ref(), &message).await;
        });
    }
    tracing::debug!("Cluster publish queue closed");
}

/// Serialize and publish with reliable delivery requested; failures are
/// logged and swallowed.
pub async fn publish_one(transport: &dyn ClusterTransport, message: &ClusterMessage) {
    let bytes = match message.to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode cluster message");
            return;
        }
    };
    if let Err(e) = transport
        .publish(CLUSTER_EVENT_ID, bytes, PublishOptions::reliable())
        .await {
        tracing::warn!(
            action = %message.message.action,
            error = %e,
            "Cluster publish failed"
        );
    }
}

/// Receives peer broadcasts and replays them locally.
pub struct ClusterInbound {
    broadcaster: LocalBroadcaster,
}

impl ClusterInbound {
    pub fn new(broadcaster: LocalBroadcaster) -> Self {
        Self { broadcaster }
    }
}

#[async_trait]
impl ClusterEventHandler for ClusterInbound {
    async fn handle(&self, data: Vec<u8>) {
        match ClusterMessage::from_bytes(&data) {
            Ok(message) => {
                self.broadcaster.deliver_cluster_message(&message).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, bytes = data.len(), "Dropping undecodable cluster event");
            }
        }
    }

    fn name(&self) -> &'static str {
        "ClusterInbound"
    }
}
