//! Realtime subscription and broadcast engine.
//!
//! # Architecture
//!
//! ```text
//!   client frames / host callbacks          domain mutations
//!              │                                   │
//!              ▼                                   ▼
//! ┌──────────────────────────┐        ┌──────────────────────────┐
//! │    CommandDispatcher     │        │  RealtimeNotifier impl   │
//! │  parse + authorize       │        │  StandaloneServer /      │
//! └────────────┬─────────────┘        │  PluginAdapter           │
//!              │ mutate               └──────┬─────────────┬─────┘
//!              ▼                             │ resolve     │ enqueue
//! ┌──────────────────────────┐               │             ▼
//! │       ListenerHub        │◄──────────────┘   ┌──────────────────┐
//! │ connections + by_team +  │  LocalBroadcaster │ ClusterPublisher │
//! │ by_block + by_user       │                   └────────┬─────────┘
//! └──────────────────────────┘                            │ publish
//!              ▲                                           ▼
//!              │ purge stale                     ClusterTransport (peers)
//! ┌──────────────────────────┐                            │
//! │  StaleConnectionReaper   │        ClusterInbound ◄────┘ (local-only)
//! └──────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`hub`] - Connection registry and subscription indexes
//! - [`dispatcher`] - Inbound command authorization and application
//! - [`broadcaster`] - Local fan-out with per-recipient failure isolation
//! - [`cluster`] - Bounded outbound queue and inbound replay for peer nodes
//! - [`reaper`] - Purge of connections that never reconnected
//! - [`standalone`] - axum WebSocket surface
//! - [`plugin`] - Embedding-host surface

pub mod broadcaster;
pub mod cluster;
pub mod dispatcher;
pub mod hub;
pub mod plugin;
pub mod reaper;
pub mod recording;
pub mod standalone;

pub use broadcaster::{DeliveryReport, LocalBroadcaster};
pub use cluster::{
    ClusterInbound, ClusterPublisher, ClusterPublisherConfig, CLUSTER_EVENT_ID,
};
pub use dispatcher::{CommandDispatcher, DispatchOutcome};
pub use hub::{AuthenticateOutcome, HubStats, InvariantViolation, Listener, ListenerHub, RegisterOutcome};
pub use plugin::{PluginAdapter, PluginConnectionSink, PluginSettings};
pub use reaper::StaleConnectionReaper;
pub use recording::{HostDelivery, RecordingPluginHost, RecordingSink};
pub use standalone::{realtime_router, StandaloneServer, WebSocketSink};
