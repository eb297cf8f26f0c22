//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the realtime core and the outside world. Adapters implement these ports.
//!
//! ## Collaborator Ports
//!
//! - `SessionValidator` - Session token → user (standalone `AUTH`)
//! - `TeamAccessChecker` - May this user watch this team?
//! - `ReadTokenValidator` - Does this share token cover this block?
//!
//! ## Transport Ports
//!
//! - `ConnectionSink` - Outbound half of one client connection
//! - `PluginHost` - Embedding host's per-connection publisher
//! - `ClusterTransport` / `ClusterEventHandler` - Node-to-node propagation
//!
//! ## Inbound Port
//!
//! - `RealtimeNotifier` - Mutation code announces committed changes

mod cluster_transport;
mod connection_sink;
mod plugin_host;
mod read_token_validator;
mod realtime_notifier;
mod session_validator;
mod team_access;

pub use cluster_transport::{
    ClusterError, ClusterEventHandler, ClusterTransport, PublishOptions, ServerId,
};
pub use connection_sink::{ConnectionSink, TransportError};
pub use plugin_host::PluginHost;
pub use read_token_validator::ReadTokenValidator;
pub use realtime_notifier::RealtimeNotifier;
pub use session_validator::SessionValidator;
pub use team_access::TeamAccessChecker;
