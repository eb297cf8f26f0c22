//! Recording transports for testing.
//!
//! # Security Note
//!
//! These adapters are for **testing only**. They use `.expect()` on lock
//! operations which will panic if locks are poisoned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::foundation::ConnectionId;
use crate::domain::realtime::OutboundMessage;
use crate::ports::{ConnectionSink, PluginHost, TransportError};

/// A connection sink that remembers everything written to it.
///
/// # Example
///
/// ```ignore
/// let sink = RecordingSink::new();
/// hub.register(conn_id, None, sink.clone()).await;
/// // ... broadcast ...
/// assert_eq!(sink.actions(), vec!["UPDATE_BLOCK"]);
/// ```
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<OutboundMessage>>,
    closed: AtomicBool,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A sink whose every write fails, like a dead socket.
    pub fn failing() -> Arc<Self> {
        let sink = Self::new();
        sink.set_failing(true);
        sink
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    // === Test Helpers ===

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages
            .lock()
            .expect("RecordingSink: messages lock poisoned")
            .clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.action).collect()
    }

    pub fn message_count(&self) -> usize {
        self.messages
            .lock()
            .expect("RecordingSink: messages lock poisoned")
            .len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionSink for RecordingSink {
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Write("simulated write failure".to_string()));
        }
        self.messages
            .lock()
            .expect("RecordingSink: messages lock poisoned")
            .push(message.clone());
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// One event published through [`RecordingPluginHost`].
#[derive(Debug, Clone, PartialEq)]
pub struct HostDelivery {
    pub connection_id: ConnectionId,
    pub event: String,
    pub payload: Value,
}

/// A plugin host that records per-connection publications.
#[derive(Default)]
pub struct RecordingPluginHost {
    deliveries: Mutex<Vec<HostDelivery>>,
}

impl RecordingPluginHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn deliveries(&self) -> Vec<HostDelivery> {
        self.deliveries
            .lock()
            .expect("RecordingPluginHost: deliveries lock poisoned")
            .clone()
    }

    pub fn deliveries_to(&self, connection_id: &ConnectionId) -> Vec<HostDelivery> {
        self.deliveries()
            .into_iter()
            .filter(|d| &d.connection_id == connection_id)
            .collect()
    }
}

#[async_trait]
impl PluginHost for RecordingPluginHost {
    async fn send_to_connection(
        &self,
        connection_id: &ConnectionId,
        event: &str,
        payload: &Value,
    ) -> Result<(), TransportError> {
        self.deliveries
            .lock()
            .expect("RecordingPluginHost: deliveries lock poisoned")
            .push(HostDelivery {
                connection_id: connection_id.clone(),
                event: event.to_string(),
                payload: payload.clone(),
            });
        Ok(())
    }
}
