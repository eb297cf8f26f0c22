//! In-memory cluster network for testing.
//!
//! Simulates several nodes in one process: each [`InMemoryClusterTransport`]
//! is one node; a publish from one node invokes the handlers registered by
//! every *other* node, inline.
//!
//! # Security Note
//!
//! This adapter is for **testing only**. It uses `.expect()` on lock
//! operations which will panic if locks are poisoned.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::ports::{ClusterError, ClusterEventHandler, ClusterTransport, PublishOptions, ServerId};

/// One publish observed on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub origin: ServerId,
    pub event_id: String,
    pub data: Vec<u8>,
    pub options: PublishOptions,
}

type HandlerMap = HashMap<(ServerId, String), Vec<Arc<dyn ClusterEventHandler>>>;

/// Shared medium connecting in-memory nodes.
///
/// # Example
///
/// ```ignore
/// let network = InMemoryClusterNetwork::new();
/// let node_a = network.node(ServerId::new("a"));
/// let node_b = network.node(ServerId::new("b"));
/// node_b.register_handler("websocket_message", inbound_b);
/// node_a.publish("websocket_message", bytes, PublishOptions::default()).await?;
/// assert_eq!(network.publications_from(&ServerId::new("b")).len(), 0);
/// ```
#[derive(Default)]
pub struct InMemoryClusterNetwork {
    handlers: RwLock<HandlerMap>,
    published: RwLock<Vec<Publication>>,
}

impl InMemoryClusterNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A transport attached to this network as node `server_id`.
    pub fn node(self: &Arc<Self>, server_id: ServerId) -> Arc<InMemoryClusterTransport> {
        Arc::new(InMemoryClusterTransport {
            network: Arc::clone(self),
            server_id,
        })
    }

    // === Test Helpers ===

    pub fn publications(&self) -> Vec<Publication> {
        self.published
            .read()
            .expect("InMemoryClusterNetwork: published lock poisoned")
            .clone()
    }

    pub fn publications_from(&self, origin: &ServerId) -> Vec<Publication> {
        self.publications()
            .into_iter()
            .filter(|p| &p.origin == origin)
            .collect()
    }

    pub fn publication_count(&self) -> usize {
        self.published
            .read()
            .expect("InMemoryClusterNetwork: published lock poisoned")
            .len()
    }

    fn peers_for(&self, origin: &ServerId, event_id: &str) -> Vec<Arc<dyn ClusterEventHandler>> {
        self.handlers
            .read()
            .expect("InMemoryClusterNetwork: handlers lock poisoned")
            .iter()
            .filter(|((node, event), _)| node != origin && event == event_id)
            .flat_map(|(_, handlers)| handlers.iter().cloned())
            .collect()
    }
}

/// One node's view of an [`InMemoryClusterNetwork`].
pub struct InMemoryClusterTransport {
    network: Arc<InMemoryClusterNetwork>,
    server_id: ServerId,
}

impl InMemoryClusterTransport {
    pub fn server_id(&self) -> &ServerId {
        &self.server_id
    }
}

#[async_trait]
impl ClusterTransport for InMemoryClusterTransport {
    async fn publish(
        &self,
        event_id: &str,
        data: Vec<u8>,
        options: PublishOptions,
    ) -> Result<(), ClusterError> {
        self.network
            .published
            .write()
            .expect("InMemoryClusterNetwork: published lock poisoned")
            .push(Publication {
                origin: self.server_id.clone(),
                event_id: event_id.to_string(),
                data: data.clone(),
                options,
            });

        for handler in self.network.peers_for(&self.server_id, event_id) {
            tracing::trace!(handler = handler.name(), event_id, "Delivering cluster event");
            handler.handle(data.clone()).await;
        }
        Ok(())
    }

    fn register_handler(&self, event_id: &str, handler: Arc<dyn ClusterEventHandler>) {
        self.network
            .handlers
            .write()
            .expect("InMemoryClusterNetwork: handlers lock poisoned")
            .entry((self.server_id.clone(), event_id.to_string()))
            .or_default()
            .push(handler);
    }
}
