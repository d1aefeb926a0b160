//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod server;

pub use server::{ServerConfig, DEFAULT_PORT};

use serde::Deserialize;
use tracing::debug;

use crate::bus::{MessagingConfig, MessagingType};
use crate::repository::{StorageConfig, StorageType};
use crate::search::{SearchConfig, SearchType};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "FEEDCAST_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "FEEDCAST";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "FEEDCAST_LOG";

/// Legacy: NATS `host:port`.
pub const NATS_ADDRESS_ENV_VAR: &str = "NATS_ADDRESS";
/// Legacy: Elasticsearch `host:port`.
pub const ELASTICSEARCH_ADDRESS_ENV_VAR: &str = "ELASTICSEARCH_ADDRESS";
/// Legacy: Postgres database name.
pub const POSTGRES_DB_ENV_VAR: &str = "POSTGRES_DB";
/// Legacy: Postgres user.
pub const POSTGRES_USER_ENV_VAR: &str = "POSTGRES_USER";
/// Legacy: Postgres password.
pub const POSTGRES_PASSWORD_ENV_VAR: &str = "POSTGRES_PASSWORD";

/// Host the legacy Postgres variables point at.
const LEGACY_POSTGRES_HOST: &str = "postgres";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Broker configuration.
    pub messaging: MessagingConfig,
    /// Search projection store.
    pub search: SearchConfig,
    /// Command-side feed storage.
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    /// 5. Legacy single variables (`NATS_ADDRESS`, `ELASTICSEARCH_ADDRESS`,
    ///    `POSTGRES_*`)
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let mut config: Config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.apply_legacy_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply the single-variable settings of the original deployment.
    ///
    /// Each variable also selects its backend.
    fn apply_legacy_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(address) = var(NATS_ADDRESS_ENV_VAR).filter(|a| !a.is_empty()) {
            debug!(address = %address, "Using legacy NATS address");
            self.messaging.messaging_type = MessagingType::Nats;
            self.messaging.nats.url = with_scheme("nats", &address);
        }

        if let Some(address) = var(ELASTICSEARCH_ADDRESS_ENV_VAR).filter(|a| !a.is_empty()) {
            debug!(address = %address, "Using legacy Elasticsearch address");
            self.search.search_type = SearchType::Elasticsearch;
            self.search.elasticsearch.url = with_scheme("http", &address);
        }

        if let (Some(db), Some(user), Some(password)) = (
            var(POSTGRES_DB_ENV_VAR),
            var(POSTGRES_USER_ENV_VAR),
            var(POSTGRES_PASSWORD_ENV_VAR),
        ) {
            debug!(database = %db, user = %user, "Using legacy Postgres settings");
            self.storage.storage_type = StorageType::Postgres;
            self.storage.postgres.url = format!(
                "postgres://{}:{}@{}/{}?sslmode=disable",
                user, password, LEGACY_POSTGRES_HOST, db
            );
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.messaging.stream_buffer == 0 {
            return Err(ConfigError::Invalid(
                "messaging.stream_buffer must be at least 1".to_string(),
            ));
        }
        if self.messaging.channel.capacity == 0 {
            return Err(ConfigError::Invalid(
                "messaging.channel.capacity must be at least 1".to_string(),
            ));
        }
        if self.search.index.is_empty() {
            return Err(ConfigError::Invalid("search.index must be set".to_string()));
        }
        Ok(())
    }
}

fn with_scheme(scheme: &str, address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("{}://{}", scheme, address)
    }
}

#[cfg(test)]
mod tests;
