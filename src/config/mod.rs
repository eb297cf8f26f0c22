//! Application configuration module
//!
//! Configuration is loaded from environment variables with the `BOARDS_RT`
//! prefix; nested values use double underscores as separators. Every section
//! has usable defaults, so a bare process starts a standalone node with no
//! database and no cluster.
//!
//! # Example
//!
//! ```no_run
//! use boards_realtime::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod database;
mod error;
mod realtime;
mod redis;
mod server;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use realtime::{RealtimeConfig, RealtimeMode};
pub use self::redis::RedisConfig;
pub use server::{Environment, LogFormat, ServerConfig};

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment, logging)
    #[serde(default)]
    pub server: ServerConfig,

    /// Realtime engine tuning
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Boards database; without it only the single-user token authenticates
    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    /// Redis pub/sub for cluster fan-out
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// - `BOARDS_RT__SERVER__PORT=8000` -> `server.port = 8000`
    /// - `BOARDS_RT__DATABASE__URL=...` -> `database.url = ...`
    /// - `BOARDS_RT__REALTIME__MODE=plugin` -> `realtime.mode = plugin`
    ///
    /// A `.env` file is read first when present.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("BOARDS_RT")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// Plugin mode needs Redis for cluster fan-out unless the host brings its
    /// own transport.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.realtime.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        }
        match &self.redis {
            Some(redis) => redis.validate()?,
            None if self.realtime.mode == RealtimeMode::Plugin
                && !self.realtime.host_cluster_transport =>
            {
                return Err(ValidationError::MissingRequired("REDIS_URL"));
            }
            None => {}
        }
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
