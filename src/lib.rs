//! Boards Realtime - subscription and broadcast engine for board clients.
//!
//! Clients subscribe to teams and blocks over a websocket (or through an
//! embedding host); block and config changes fan out to every matching
//! connection, and in clustered deployments to every peer node.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
