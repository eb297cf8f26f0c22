//! Cluster transport adapters.
//!
//! - `redis` - Production transport over Redis pub/sub
//! - `in_memory` - Multi-node simulation inside one process (tests)
//! - `reconnect` - Backoff loop that keeps the Redis subscription alive

mod in_memory;
mod reconnect;
mod redis;

pub use in_memory::{InMemoryClusterNetwork, InMemoryClusterTransport, Publication};
pub use self::redis::{decode_frame, encode_frame, RedisClusterTransport};
pub use reconnect::{run_with_reconnect, ReconnectBackoff, SessionEnd};
