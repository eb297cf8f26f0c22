//! ConnectionSink port - the outbound half of one connection's transport.
//!
//! Standalone deployments back it with a WebSocket; plugin deployments with
//! the host's per-connection event publisher.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::realtime::OutboundMessage;

/// Errors writing to a connection's transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport was already closed.
    #[error("Connection closed")]
    Closed,

    /// The message could not be encoded for this transport.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The underlying write failed.
    #[error("Transport write failed: {0}")]
    Write(String),
}

/// Outbound side of one connection.
///
/// Implementations must serialize concurrent `send` calls so that messages
/// reach the client in the order the sends were issued.
#[async_trait]
pub trait ConnectionSink: Send + Sync {
    /// Write one message. May block on I/O; never called under the hub lock.
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError>;

    /// Close the transport. Idempotent.
    async fn close(&self);
}
