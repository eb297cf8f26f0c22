//! Standalone server surface: WebSocket clients talking to this node directly.
//!
//! Connection lifecycle:
//! 1. `GET /ws` upgrades; the socket gets a fresh UUID connection ID
//! 2. Text frames go through the command dispatcher
//! 3. A failed `AUTH` closes the socket
//! 4. On close the connection is purged immediately (no reconnect window)
//!
//! Broadcasts stay on this node; there is no cluster fan-out.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;

use crate::domain::foundation::{ConnectionId, TeamId};
use crate::domain::realtime::{Block, ClientConfig, OutboundMessage};
use crate::ports::{ConnectionSink, RealtimeNotifier, TransportError};

use super::broadcaster::{block_change_message, config_change_message, LocalBroadcaster};
use super::dispatcher::{CommandDispatcher, DispatchOutcome};
use super::hub::ListenerHub;

/// Outbound half of an axum WebSocket.
///
/// The mutex serializes concurrent broadcasts to the same socket.
pub struct WebSocketSink {
    sender: Mutex<SplitSink<WebSocket, Message>>,
}

impl WebSocketSink {
    pub fn new(sender: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sender: Mutex::new(sender),
        }
    }
}

#[async_trait]
impl ConnectionSink for WebSocketSink {
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let text = message
            .to_text()
            .map_err(|e| TransportError::Serialization(e.to_string()))?;
        self.sender
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    async fn close(&self) {
        let mut sender = self.sender.lock().await;
        let _ = sender.send(Message::Close(None)).await;
        let _ = sender.close().await;
    }
}

/// Realtime core for a single standalone node.
pub struct StandaloneServer {
    dispatcher: Arc<CommandDispatcher>,
    broadcaster: LocalBroadcaster,
}

impl StandaloneServer {
    pub fn new(dispatcher: Arc<CommandDispatcher>) -> Self {
        let broadcaster = LocalBroadcaster::new(Arc::clone(dispatcher.hub()));
        Self {
            dispatcher,
            broadcaster,
        }
    }

    pub fn hub(&self) -> &Arc<ListenerHub> {
        self.dispatcher.hub()
    }

    /// Registers a fresh unauthenticated connection.
    pub async fn open_connection(&self, sink: Arc<dyn ConnectionSink>) -> ConnectionId {
        let connection_id = ConnectionId::generate();
        self.hub().register(connection_id.clone(), None, sink).await;
        tracing::debug!(connection_id = %connection_id, "WebSocket client connected");
        connection_id
    }

    pub async fn handle_text(&self, connection_id: &ConnectionId, text: &str) -> DispatchOutcome {
        self.dispatcher.handle_text(connection_id, text).await
    }

    pub async fn close_connection(&self, connection_id: &ConnectionId) {
        self.hub().purge(connection_id).await;
        tracing::debug!(connection_id = %connection_id, "WebSocket client disconnected");
    }
}

#[async_trait]
impl RealtimeNotifier for StandaloneServer {
    async fn broadcast_block_change(&self, team_id: &TeamId, block: &Block) {
        if let Some(message) = block_change_message(team_id, block, Vec::new()) {
            self.broadcaster.deliver_cluster_message(&message).await;
        }
    }

    async fn broadcast_config_change(&self, config: &ClientConfig) {
        if let Some(message) = config_change_message(config) {
            self.broadcaster.deliver_cluster_message(&message).await;
        }
    }
}

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /ws`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(server): State<Arc<StandaloneServer>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, server))
}

async fn handle_socket(socket: WebSocket, server: Arc<StandaloneServer>) {
    let (sender, mut receiver) = socket.split();
    let sink = Arc::new(WebSocketSink::new(sender));
    let connection_id = server.open_connection(sink.clone()).await;

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if server.handle_text(&connection_id, &text).await
                    == DispatchOutcome::CloseConnection
                {
                    sink.close().await;
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                tracing::debug!(connection_id = %connection_id, "Ignoring binary frame");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // handled by axum
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "Receive error");
                break;
            }
        }
    }

    server.close_connection(&connection_id).await;
}

/// Route: `GET /health`
pub async fn health() -> &'static str {
    "ok"
}

/// Router exposing `/ws` and `/health`.
pub fn realtime_router(server: Arc<StandaloneServer>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(server)
}
