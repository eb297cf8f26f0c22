//! Realtime engine configuration

use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Which surface owns the client sockets.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RealtimeMode {
    /// This process accepts websocket upgrades itself.
    #[default]
    Standalone,
    /// An embedding host owns the sockets and forwards callbacks.
    Plugin,
}

/// Realtime engine configuration
#[derive(Debug, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default)]
    pub mode: RealtimeMode,

    /// Seconds an inactive plugin connection may linger before it is purged
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold_secs: u64,

    /// Seconds between periodic stale sweeps
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,

    /// Prefix on plugin action names, both inbound and outbound
    #[serde(default = "default_message_prefix")]
    pub message_prefix: String,

    /// Token accepted by `AUTH` as the single local user
    #[serde(default)]
    pub single_user_token: Option<SecretString>,

    /// Outbound cluster messages buffered before new ones are dropped
    #[serde(default = "default_cluster_queue_capacity")]
    pub cluster_queue_capacity: usize,

    /// Concurrent cluster publish tasks
    #[serde(default = "default_cluster_workers")]
    pub cluster_workers: usize,

    /// The embedding host supplies its own cluster transport
    #[serde(default)]
    pub host_cluster_transport: bool,
}

impl RealtimeConfig {
    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    /// Validate realtime configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.message_prefix.is_empty() {
            return Err(ValidationError::EmptyMessagePrefix);
        }
        if self.cluster_queue_capacity == 0 {
            return Err(ValidationError::InvalidQueueCapacity);
        }
        if self.cluster_workers == 0 || self.cluster_workers > 64 {
            return Err(ValidationError::InvalidWorkerCount);
        }
        if self.reap_interval_secs == 0 {
            return Err(ValidationError::InvalidReapInterval);
        }
        Ok(())
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            mode: RealtimeMode::default(),
            stale_threshold_secs: default_stale_threshold(),
            reap_interval_secs: default_reap_interval(),
            message_prefix: default_message_prefix(),
            single_user_token: None,
            cluster_queue_capacity: default_cluster_queue_capacity(),
            cluster_workers: default_cluster_workers(),
            host_cluster_transport: false,
        }
    }
}

fn default_stale_threshold() -> u64 {
    300
}

fn default_reap_interval() -> u64 {
    60
}

fn default_message_prefix() -> String {
    "custom_boards_".to_string()
}

fn default_cluster_queue_capacity() -> usize {
    1024
}

fn default_cluster_workers() -> usize {
    2
}
