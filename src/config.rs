use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Upper bound for every configured duration (one year).
pub const MAX_DURATION_SECONDS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub codes: CodeConfig,
    pub relay: RelayConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Access-code store descriptor, e.g. `mem://access/Code` or `redb://./data`
    pub database_uri: String,
    /// Event bus descriptor, e.g. `mem://relay` or `log://relay`
    pub publisher_uri: String,
    /// How long in-flight connections may drain after a shutdown signal
    pub shutdown_grace_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct CodeConfig {
    pub prune_interval_seconds: u64,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub max_message_size: usize,
    pub ping_period_seconds: u64,
    pub pong_wait_seconds: u64,
    pub write_wait_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            database_uri: "mem://access/Code".to_string(),
            publisher_uri: "mem://relay".to_string(),
            shutdown_grace_seconds: 5,
        }
    }
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            prune_interval_seconds: 7200, // 2 hours
            ttl_seconds: 300,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_message_size: 512,
            ping_period_seconds: 30,
            pong_wait_seconds: 60,
            write_wait_seconds: 30,
        }
    }
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

impl CodeConfig {
    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_seconds)
    }
}

impl RelayConfig {
    pub fn ping_period(&self) -> Duration {
        Duration::from_secs(self.ping_period_seconds)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_seconds)
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_seconds)
    }
}

impl Config {
    /// Load configuration from `RELAY_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let config = Config {
            codes: CodeConfig {
                prune_interval_seconds: env_or(
                    "RELAY_PRUNE_INTERVAL",
                    defaults.codes.prune_interval_seconds,
                )?,
                ttl_seconds: env_or("RELAY_ACCESS_CODE_TTL", defaults.codes.ttl_seconds)?,
            },
            relay: RelayConfig {
                max_message_size: env_or(
                    "RELAY_MAX_MESSAGE_SIZE",
                    defaults.relay.max_message_size,
                )?,
                ping_period_seconds: env_or(
                    "RELAY_PING_PERIOD",
                    defaults.relay.ping_period_seconds,
                )?,
                pong_wait_seconds: env_or("RELAY_PONG_WAIT", defaults.relay.pong_wait_seconds)?,
                write_wait_seconds: env_or(
                    "RELAY_WRITE_WAIT",
                    defaults.relay.write_wait_seconds,
                )?,
            },
            server: ServerConfig {
                bind_address: std::env::var("RELAY_BIND_ADDRESS")
                    .unwrap_or(defaults.server.bind_address),
                database_uri: std::env::var("RELAY_DATABASE_URI")
                    .unwrap_or(defaults.server.database_uri),
                publisher_uri: std::env::var("RELAY_PUBLISHER_URI")
                    .unwrap_or(defaults.server.publisher_uri),
                shutdown_grace_seconds: env_or(
                    "RELAY_SHUTDOWN_GRACE",
                    defaults.server.shutdown_grace_seconds,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("RELAY_ACCESS_CODE_TTL", self.codes.ttl_seconds),
            ("RELAY_PRUNE_INTERVAL", self.codes.prune_interval_seconds),
            ("RELAY_PING_PERIOD", self.relay.ping_period_seconds),
            ("RELAY_PONG_WAIT", self.relay.pong_wait_seconds),
            ("RELAY_WRITE_WAIT", self.relay.write_wait_seconds),
        ];
        for (name, value) in required {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        let bounded = required
            .into_iter()
            .chain([("RELAY_SHUTDOWN_GRACE", self.server.shutdown_grace_seconds)]);
        for (name, value) in bounded {
            if value > MAX_DURATION_SECONDS {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be at most {MAX_DURATION_SECONDS} seconds"
                )));
            }
        }

        if self.relay.ping_period_seconds >= self.relay.pong_wait_seconds {
            return Err(ConfigError::ValidationError(
                "RELAY_PING_PERIOD must be shorter than RELAY_PONG_WAIT".to_string(),
            ));
        }

        if self.server.database_uri.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "RELAY_DATABASE_URI cannot be empty".to_string(),
            ));
        }
        if self.server.publisher_uri.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "RELAY_PUBLISHER_URI cannot be empty".to_string(),
            ));
        }

        if self.codes.prune_interval_seconds < self.codes.ttl_seconds {
            tracing::warn!(
                prune_interval = self.codes.prune_interval_seconds,
                ttl = self.codes.ttl_seconds,
                "Prune interval is shorter than the access code TTL"
            );
        }

        Ok(())
    }
}

/// Read and parse an environment variable, falling back to `default` when unset.
fn env_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(default),
    }
}
