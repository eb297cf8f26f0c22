//! PluginHost port - the embedding host's per-connection event publisher.
//!
//! When embedded as a plugin, the host owns the sockets. This core only
//! names a connection and an event; the host delivers it.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::foundation::ConnectionId;

use super::connection_sink::TransportError;

#[async_trait]
pub trait PluginHost: Send + Sync {
    /// Publish `event` with `payload` to exactly one host connection.
    async fn send_to_connection(
        &self,
        connection_id: &ConnectionId,
        event: &str,
        payload: &Value,
    ) -> Result<(), TransportError>;
}
