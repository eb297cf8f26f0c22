//! ClusterTransport port - cross-node propagation of broadcasts.
//!
//! In a multi-node deployment each node only knows the connections attached
//! to it. A node that broadcasts also publishes the broadcast through this
//! port; every *other* node receives it and replays it locally.
//!
//! ## Flow
//!
//! 1. Mutation lands on Node A
//! 2. Node A fans out to its own listeners
//! 3. Node A publishes `{scope, payload}` as a cluster event
//! 4. Node B's registered handler receives the bytes
//! 5. Node B fans out to its listeners (and does NOT re-publish)

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique identifier for a node in a multi-node deployment.
///
/// Format is typically hostname:port or container/pod ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerId(String);

impl ServerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Create server ID from environment (hostname + port).
    pub fn from_env() -> Self {
        let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
        Self(format!("{}:{}", hostname, port))
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ServerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Errors from the cluster transport.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Redis communication error
    #[error("Redis error: {0}")]
    Redis(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Malformed frame received from a peer
    #[error("Malformed cluster frame: {0}")]
    MalformedFrame(&'static str),
}

/// Per-publish delivery options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Ask the transport for reliable delivery where it can provide it.
    pub reliable: bool,
}

impl PublishOptions {
    pub fn reliable() -> Self {
        Self { reliable: true }
    }
}

/// Receives cluster events published by peer nodes.
#[async_trait]
pub trait ClusterEventHandler: Send + Sync {
    async fn handle(&self, data: Vec<u8>);

    /// Handler name for logging.
    fn name(&self) -> &'static str;
}

/// Best-effort, at-least-once delivery to every other node.
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    /// Publish `data` under `event_id` to every peer node (never this one).
    async fn publish(
        &self,
        event_id: &str,
        data: Vec<u8>,
        options: PublishOptions,
    ) -> Result<(), ClusterError>;

    /// Register the handler invoked for inbound events tagged `event_id`.
    fn register_handler(&self, event_id: &str, handler: Arc<dyn ClusterEventHandler>);
}
