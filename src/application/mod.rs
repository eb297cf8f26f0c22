//! Application layer - wiring of the realtime core.
//!
//! The standalone binary serves a [`StandaloneRuntime`]; a host that owns
//! the sockets starts a [`PluginRuntime`] instead.

pub mod plugin_runtime;
pub mod standalone_runtime;

pub use plugin_runtime::{PluginRuntime, RuntimeError};
pub use standalone_runtime::StandaloneRuntime;
