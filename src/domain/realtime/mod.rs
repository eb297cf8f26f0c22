//! Realtime domain - connections, commands and the messages they exchange.

mod block;
mod command;
mod connection;
mod messages;

pub use block::Block;
pub use command::{Command, CommandAction, CommandError};
pub use connection::Connection;
pub use messages::{
    BroadcastScope, ClientConfig, ClusterMessage, OutboundMessage, ACTION_UPDATE_BLOCK,
    ACTION_UPDATE_CLIENT_CONFIG,
};
