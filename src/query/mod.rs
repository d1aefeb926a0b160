//! Read-only queries over the search projection.

use std::sync::Arc;

use tracing::debug;

use crate::models::Feed;
use crate::search::{SearchConfig, SearchError, SearchIndex, SearchQuery};

/// Errors returned to query callers.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Search store failed: {0}")]
    Search(#[from] SearchError),
}

pub type Result<T> = std::result::Result<T, QueryError>;

/// Serves feed listings and fuzzy search from the projection.
#[derive(Clone)]
pub struct FeedQuery {
    index: Arc<dyn SearchIndex>,
    fuzziness: u32,
    cutoff_frequency: f64,
}

impl FeedQuery {
    /// Query with the store's default fuzziness and cutoff.
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        let defaults = SearchQuery::new("");
        Self {
            index,
            fuzziness: defaults.fuzziness,
            cutoff_frequency: defaults.cutoff_frequency,
        }
    }

    /// Query tuned by the search configuration.
    pub fn from_config(index: Arc<dyn SearchIndex>, config: &SearchConfig) -> Self {
        Self {
            index,
            fuzziness: config.fuzziness,
            cutoff_frequency: config.cutoff_frequency,
        }
    }

    /// Every indexed feed.
    pub async fn list(&self) -> Result<Vec<Feed>> {
        Ok(self.index.list().await?)
    }

    /// Feeds matching `text` in title or description, most relevant first.
    pub async fn search(&self, text: &str) -> Result<Vec<Feed>> {
        let query = SearchQuery::new(text)
            .with_fuzziness(self.fuzziness)
            .with_cutoff_frequency(self.cutoff_frequency);
        let feeds = self.index.search(&query).await?;
        debug!(query = %text, hits = feeds.len(), "Search served");
        Ok(feeds)
    }
}
