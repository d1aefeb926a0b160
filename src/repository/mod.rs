//! Command-side feed storage.
//!
//! The command handler persists each new feed here before announcing it on
//! the bus. Read models never query this store.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::models::Feed;

mod memory;
#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "postgres")]
pub mod schema;

pub use memory::InMemoryFeedRepository;
#[cfg(feature = "postgres")]
pub use postgres::PostgresFeedRepository;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Errors raised by a feed repository.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Feed '{0}' already exists")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        RepositoryError::Database(err.to_string())
    }
}

/// Persistent store for feeds.
#[async_trait]
pub trait FeedRepository: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &str;

    /// Persist a new feed. Fails with `Duplicate` if the id is taken.
    async fn save(&self, feed: &Feed) -> Result<()>;

    /// Every stored feed, newest first.
    async fn list(&self) -> Result<Vec<Feed>>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Storage type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Memory,
    Postgres,
}

/// Storage configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// PostgreSQL-specific configuration.
    pub postgres: PostgresConfig,
}

/// PostgreSQL-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// Connection URL.
    pub url: String,
    /// Pool size.
    pub max_connections: u32,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/feeds".to_string(),
            max_connections: 5,
        }
    }
}

/// Initialize the repository selected by configuration.
///
/// Postgres requires the `postgres` feature. The connection is retried with
/// exponential backoff and the schema is created if missing.
pub async fn init_repository(
    config: &StorageConfig,
) -> std::result::Result<Arc<dyn FeedRepository>, Box<dyn std::error::Error + Send + Sync>> {
    match config.storage_type {
        StorageType::Memory => {
            info!(storage_type = "memory", "Feed repository initialized");
            Ok(Arc::new(InMemoryFeedRepository::new()))
        }
        StorageType::Postgres => {
            #[cfg(feature = "postgres")]
            {
                use backon::Retryable;

                let pg = config.postgres.clone();
                let repo = (|| async { PostgresFeedRepository::connect(&pg).await })
                    .retry(crate::utils::retry::connection_backoff())
                    .notify(|e: &RepositoryError, delay: std::time::Duration| {
                        tracing::warn!(error = %e, ?delay, "Postgres connection failed, retrying");
                    })
                    .await?;
                repo.init_schema().await?;
                info!(storage_type = "postgres", "Feed repository initialized");
                Ok(Arc::new(repo))
            }

            #[cfg(not(feature = "postgres"))]
            {
                Err("Postgres storage requires the 'postgres' feature. Rebuild with --features postgres".into())
            }
        }
    }
}
