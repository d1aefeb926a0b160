//! Search projection store.
//!
//! This module contains:
//! - `SearchIndex` trait: upsert, list and fuzzy search over feed documents
//! - `SearchQuery`: multi-field match with fuzziness and a frequency cutoff
//! - Implementations: in-memory, Elasticsearch
//!
//! The store is written only by the index updater and read only by the
//! query component.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::models::Feed;

pub mod elastic;
pub mod memory;

pub use elastic::{ElasticsearchConfig, ElasticsearchIndex};
pub use memory::InMemorySearchIndex;

/// Result type for search store operations.
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors raised by a search store.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response shape: {0}")]
    Decoding(String),

    #[error("Search store unavailable: {0}")]
    Unavailable(String),

    #[error("Index engine error: {0}")]
    Engine(String),

    #[error("Invalid search store URL: {0}")]
    InvalidUrl(String),
}

impl From<tantivy::TantivyError> for SearchError {
    fn from(err: tantivy::TantivyError) -> Self {
        SearchError::Engine(err.to_string())
    }
}

/// Default fuzziness requested from the store.
pub const DEFAULT_FUZZINESS: u32 = 3;

/// Default frequency above which a query term counts as common.
pub const DEFAULT_CUTOFF_FREQUENCY: f64 = 0.0001;

/// Fields searched by default.
pub const DEFAULT_FIELDS: [&str; 2] = ["title", "description"];

/// A free-text query matched across several document fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    pub fields: Vec<String>,
    pub fuzziness: u32,
    pub cutoff_frequency: f64,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            fields: DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect(),
            fuzziness: DEFAULT_FUZZINESS,
            cutoff_frequency: DEFAULT_CUTOFF_FREQUENCY,
        }
    }

    pub fn with_fuzziness(mut self, fuzziness: u32) -> Self {
        self.fuzziness = fuzziness;
        self
    }

    pub fn with_cutoff_frequency(mut self, cutoff_frequency: f64) -> Self {
        self.cutoff_frequency = cutoff_frequency;
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

/// Store for the search projection.
///
/// Documents are keyed by feed id; upserting the same id twice leaves one
/// document holding the latest contents.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &str;

    /// Insert or replace the document for `feed.id`.
    async fn upsert(&self, feed: &Feed) -> Result<()>;

    /// All indexed documents.
    async fn list(&self) -> Result<Vec<Feed>>;

    /// Documents matching `query`, most relevant first.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Feed>>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Search store type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    /// In-process index.
    #[default]
    Memory,
    /// Elasticsearch over HTTP.
    Elasticsearch,
}

/// Search configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    #[serde(rename = "type")]
    pub search_type: SearchType,
    /// Index holding feed documents.
    pub index: String,
    pub fuzziness: u32,
    pub cutoff_frequency: f64,
    /// Maximum documents returned by a listing.
    pub list_limit: usize,
    pub elasticsearch: ElasticsearchConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            search_type: SearchType::Memory,
            index: "feeds".to_string(),
            fuzziness: DEFAULT_FUZZINESS,
            cutoff_frequency: DEFAULT_CUTOFF_FREQUENCY,
            list_limit: 10_000,
            elasticsearch: ElasticsearchConfig::default(),
        }
    }
}

/// Initialize the search store selected by configuration.
///
/// Elasticsearch is pinged at startup and retried with exponential backoff.
pub async fn init_search_index(
    config: &SearchConfig,
) -> std::result::Result<Arc<dyn SearchIndex>, Box<dyn std::error::Error + Send + Sync>> {
    match config.search_type {
        SearchType::Memory => {
            info!(search_type = "memory", "Search index initialized");
            Ok(Arc::new(InMemorySearchIndex::new()?))
        }
        SearchType::Elasticsearch => {
            use backon::Retryable;

            let index = ElasticsearchIndex::new(
                config.elasticsearch.clone(),
                config.index.clone(),
                config.list_limit,
            )?;
            (|| async { index.ping().await })
                .retry(crate::utils::retry::connection_backoff())
                .notify(|e: &SearchError, delay: std::time::Duration| {
                    tracing::warn!(error = %e, ?delay, "Elasticsearch not reachable, retrying");
                })
                .await?;
            info!(
                search_type = "elasticsearch",
                url = %config.elasticsearch.url,
                index = %config.index,
                "Search index initialized"
            );
            Ok(Arc::new(index))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_defaults() {
        let query = SearchQuery::new("go");
        assert_eq!(query.fields, vec!["title", "description"]);
        assert_eq!(query.fuzziness, 3);
        assert_eq!(query.cutoff_frequency, 0.0001);
    }

    #[test]
    fn test_search_config_defaults() {
        let config = SearchConfig::default();
        assert_eq!(config.search_type, SearchType::Memory);
        assert_eq!(config.index, "feeds");
        assert_eq!(config.list_limit, 10_000);
        assert_eq!(config.elasticsearch.url, "http://localhost:9200");
    }

    #[test]
    fn test_search_config_deserialize() {
        let config: SearchConfig = serde_json::from_value(serde_json::json!({
            "type": "elasticsearch",
            "fuzziness": 1,
            "elasticsearch": { "url": "http://es:9200" }
        }))
        .unwrap();
        assert_eq!(config.search_type, SearchType::Elasticsearch);
        assert_eq!(config.fuzziness, 1);
        assert_eq!(config.index, "feeds");
        assert_eq!(config.elasticsearch.url, "http://es:9200");
    }

    #[tokio::test]
    async fn test_init_memory_index() {
        let index = init_search_index(&SearchConfig::default()).await.unwrap();
        assert_eq!(index.name(), "memory");
        assert!(index.list().await.unwrap().is_empty());
    }
}
