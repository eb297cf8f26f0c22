//! Redis pub/sub cluster transport for multi-node deployments.
//!
//! Every node publishes to `{prefix}:{event_id}` and pattern-subscribes to
//! `{prefix}:*`. Redis echoes a publication back to its sender, so every
//! payload is framed with the origin node ID and a node drops its own
//! frames on receipt.
//!
//! # Frame
//!
//! ```text
//! ┌──────────────┬────────────────┬─────────────┐
//! │ origin_len   │ origin (utf-8) │ data        │
//! │ u16 BE       │ origin_len B   │ remainder   │
//! └──────────────┴────────────────┴─────────────┘
//! ```
//!
//! The subscriber reconnects and re-subscribes on its own after a dropped
//! connection, so peers missed during the gap are the only loss.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::watch;

use crate::ports::{ClusterError, ClusterEventHandler, ClusterTransport, PublishOptions, ServerId};

use super::reconnect::{run_with_reconnect, ReconnectBackoff, SessionEnd};

/// Prepends the origin header to `data`.
pub fn encode_frame(origin: &ServerId, data: &[u8]) -> Result<Vec<u8>, ClusterError> {
    let origin = origin.as_str().as_bytes();
    let len = u16::try_from(origin.len())
        .map_err(|_| ClusterError::MalformedFrame("origin id too long"))?;
    let mut frame = Vec::with_capacity(2 + origin.len() + data.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(origin);
    frame.extend_from_slice(data);
    Ok(frame)
}

/// Splits a frame into `(origin, data)`.
pub fn decode_frame(frame: &[u8]) -> Result<(&str, &[u8]), ClusterError> {
    if frame.len() < 2 {
        return Err(ClusterError::MalformedFrame("truncated header"));
    }
    let len = u16::from_be_bytes([frame[0], frame[1]]) as usize;
    let rest = &frame[2..];
    if rest.len() < len {
        return Err(ClusterError::MalformedFrame("truncated origin"));
    }
    let (origin, data) = rest.split_at(len);
    let origin =
        std::str::from_utf8(origin).map_err(|_| ClusterError::MalformedFrame("origin not utf-8"))?;
    Ok((origin, data))
}

type Handlers = HashMap<String, Vec<Arc<dyn ClusterEventHandler>>>;

pub struct RedisClusterTransport {
    client: redis::Client,
    conn: MultiplexedConnection,
    channel_prefix: String,
    server_id: ServerId,
    handlers: RwLock<Handlers>,
}

impl RedisClusterTransport {
    /// Opens the publish connection. Inbound delivery starts with [`run`].
    ///
    /// [`run`]: RedisClusterTransport::run
    pub async fn connect(
        url: &str,
        channel_prefix: impl Into<String>,
        server_id: ServerId,
    ) -> Result<Self, ClusterError> {
        let client = redis::Client::open(url).map_err(|e| ClusterError::Redis(e.to_string()))?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| ClusterError::Redis(e.to_string()))?;
        Ok(Self {
            client,
            conn,
            channel_prefix: channel_prefix.into(),
            server_id,
            handlers: RwLock::new(HashMap::new()),
        })
    }

    pub fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    fn channel(&self, event_id: &str) -> String {
        format!("{}:{}", self.channel_prefix, event_id)
    }

    fn handlers_for(&self, event_id: &str) -> Vec<Arc<dyn ClusterEventHandler>> {
        match self.handlers.read() {
            Ok(handlers) => handlers.get(event_id).cloned().unwrap_or_default(),
            Err(poisoned) => poisoned
                .into_inner()
                .get(event_id)
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Receive peer events until shutdown is signalled, resubscribing with
    /// backoff whenever the subscription connection fails or drops.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        run_with_reconnect(|rx| self.listen(rx), ReconnectBackoff::default(), shutdown).await;
        tracing::info!(server_id = %self.server_id, "Cluster subscriber stopped");
    }

    async fn listen(&self, mut shutdown: watch::Receiver<bool>) -> Result<SessionEnd, ClusterError> {
        let mut pubsub = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| ClusterError::Redis(e.to_string()))?
            .into_pubsub();
        let pattern = format!("{}:*", self.channel_prefix);
        pubsub
            .psubscribe(&pattern)
            .await
            .map_err(|e| ClusterError::Redis(e.to_string()))?;
        tracing::info!(pattern = %pattern, server_id = %self.server_id, "Cluster subscriber started");

        let prefix = format!("{}:", self.channel_prefix);
        let mut messages = pubsub.on_message();

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Cluster subscriber stopping");
                        return Ok(SessionEnd::Shutdown);
                    }
                }

                msg = messages.next() => {
                    let Some(msg) = msg else {
                        return Ok(SessionEnd::Lost(ClusterError::Redis(
                            "subscription stream ended".to_string(),
                        )));
                    };
                    let channel = msg.get_channel_name().to_string();
                    let Some(event_id) = channel.strip_prefix(&prefix) else {
                        continue;
                    };
                    let frame: Vec<u8> = match msg.get_payload() {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::warn!(channel = %channel, error = %e, "Unreadable cluster payload");
                            continue;
                        }
                    };
                    self.deliver(event_id, &frame).await;
                }
            }
        }
    }

    async fn deliver(&self, event_id: &str, frame: &[u8]) {
        let (origin, data) = match decode_frame(frame) {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!(event_id, error = %e, "Dropping malformed cluster frame");
                return;
            }
        };
        if origin == self.server_id.as_str() {
            return;
        }
        for handler in self.handlers_for(event_id) {
            handler.handle(data.to_vec()).await;
        }
    }
}

#[async_trait]
impl ClusterTransport for RedisClusterTransport {
    /// Redis pub/sub is fire-and-forget; `options.reliable` cannot be
    /// honoured and is ignored.
    async fn publish(
        &self,
        event_id: &str,
        data: Vec<u8>,
        _options: PublishOptions,
    ) -> Result<(), ClusterError> {
        let frame = encode_frame(&self.server_id, &data)?;
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(self.channel(event_id), frame)
            .await
            .map_err(|e: redis::RedisError| ClusterError::Redis(e.to_string()))
    }

    fn register_handler(&self, event_id: &str, handler: Arc<dyn ClusterEventHandler>) {
        let mut handlers = match self.handlers.write() {
            Ok(handlers) => handlers,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.entry(event_id.to_string()).or_default().push(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_carries_origin_and_data() {
        let frame = encode_frame(&ServerId::new("node-a:8000"), b"{\"x\":1}").unwrap();
        let (origin, data) = decode_frame(&frame).unwrap();

        assert_eq!(origin, "node-a:8000");
        assert_eq!(data, b"{\"x\":1}");
    }

    #[test]
    fn empty_data_is_allowed() {
        let frame = encode_frame(&ServerId::new("n"), &[]).unwrap();
        let (origin, data) = decode_frame(&frame).unwrap();
        assert_eq!(origin, "n");
        assert!(data.is_empty());
    }

    #[test]
    fn truncated_frames_are_rejected() {
        assert!(matches!(
            decode_frame(&[0]),
            Err(ClusterError::MalformedFrame(_))
        ));
        assert!(matches!(
            decode_frame(&[0, 5, b'a']),
            Err(ClusterError::MalformedFrame(_))
        ));
    }

    #[test]
    fn non_utf8_origin_is_rejected() {
        assert!(decode_frame(&[0, 1, 0xff]).is_err());
    }

    #[test]
    fn oversized_origin_is_rejected() {
        let origin = ServerId::new("x".repeat(70_000));
        assert!(encode_frame(&origin, b"").is_err());
    }
}
