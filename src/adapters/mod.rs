//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the realtime core to external systems:
//! - `realtime` - Listener hub, dispatcher, fan-out and the two server surfaces
//! - `cluster` - Node-to-node transports (Redis, in-memory)
//! - `auth` - Session validation (Postgres, mock)
//! - `access` - Team access and share-token checks (Postgres, static)

pub mod access;
pub mod auth;
pub mod cluster;
pub mod realtime;

pub use realtime::{
    CommandDispatcher, ListenerHub, PluginAdapter, RecordingSink, StandaloneServer,
};
