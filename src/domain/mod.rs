//! Domain layer containing the realtime core's types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors)
//! - `realtime` - Connections, inbound commands, blocks and outbound messages

pub mod foundation;
pub mod realtime;
