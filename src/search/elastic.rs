//! Elasticsearch search index over its REST API.
//!
//! Documents live in one index keyed by feed id. Writes wait for a refresh
//! so an indexed feed is searchable as soon as `upsert` returns.

use std::time::Duration;

use async_trait::async_trait;
use backon::Retryable;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use super::{Result, SearchError, SearchIndex, SearchQuery};
use crate::models::Feed;
use crate::utils::retry::http_backoff;

/// Elasticsearch connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElasticsearchConfig {
    /// Base URL of the cluster.
    pub url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            timeout_secs: 10,
        }
    }
}

// ============================================================================
// Response schema
// ============================================================================

/// `_search` response envelope.
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub hits: Hits,
}

#[derive(Debug, Deserialize)]
pub struct Hits {
    pub hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
pub struct Hit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score")]
    pub score: Option<f64>,
    #[serde(rename = "_source")]
    pub source: Feed,
}

impl SearchResponse {
    /// Parse a response body, rejecting any shape mismatch.
    pub fn parse(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| SearchError::Decoding(e.to_string()))
    }

    pub fn into_feeds(self) -> Vec<Feed> {
        self.hits.hits.into_iter().map(|hit| hit.source).collect()
    }
}

// ============================================================================
// Request bodies
// ============================================================================

/// Body of a fuzzy `multi_match` search.
pub fn search_body(query: &SearchQuery) -> Value {
    json!({
        "query": {
            "multi_match": {
                "query": query.text,
                "fields": query.fields,
                "fuzziness": query.fuzziness,
                "cutoff_frequency": query.cutoff_frequency,
            }
        }
    })
}

/// Body of a listing: every document, up to `limit`.
pub fn list_body(limit: usize) -> Value {
    json!({
        "query": { "match_all": {} },
        "size": limit,
    })
}

/// Determine if an HTTP status code is retryable.
pub fn is_retryable_status(status: StatusCode) -> bool {
    // Retry 429 (rate limit) and 5xx (server errors)
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable(err: &SearchError) -> bool {
    match err {
        SearchError::Http(e) => e.is_timeout() || e.is_connect(),
        SearchError::Status { status, .. } => StatusCode::from_u16(*status)
            .map(is_retryable_status)
            .unwrap_or(false),
        SearchError::Unavailable(_) => true,
        SearchError::Decoding(_) | SearchError::Engine(_) | SearchError::InvalidUrl(_) => false,
    }
}

/// Search index backed by an Elasticsearch cluster.
pub struct ElasticsearchIndex {
    client: Client,
    base_url: Url,
    index: String,
    list_limit: usize,
}

impl ElasticsearchIndex {
    /// Create a client for `index` on the configured cluster.
    pub fn new(config: ElasticsearchConfig, index: String, list_limit: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base_url = Url::parse(&config.url)
            .map_err(|e| SearchError::InvalidUrl(format!("{}: {}", config.url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(SearchError::InvalidUrl(config.url));
        }
        Ok(Self {
            client,
            base_url,
            index,
            list_limit,
        })
    }

    /// `base/index/<segments>`, each segment percent-encoded.
    fn index_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SearchError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(&self.index)
            .extend(segments);
        Ok(url)
    }

    fn document_url(&self, id: &str) -> Result<Url> {
        self.index_url(&["_doc", id])
    }

    fn search_url(&self) -> Result<Url> {
        self.index_url(&["_search"])
    }

    /// Check the cluster answers.
    pub async fn ping(&self) -> Result<()> {
        let response = self
            .client
            .get(self.base_url.clone())
            .send()
            .await
            .map_err(|e| SearchError::Unavailable(e.to_string()))?;
        check_status(response).await.map(|_| ())
    }

    async fn put_document(&self, feed: &Feed) -> Result<()> {
        let response = self
            .client
            .put(self.document_url(&feed.id)?)
            .query(&[("refresh", "wait_for")])
            .json(feed)
            .send()
            .await?;
        check_status(response).await?;
        debug!(id = %feed.id, index = %self.index, "Indexed feed document");
        Ok(())
    }

    async fn run_search(&self, body: &Value) -> Result<Vec<Feed>> {
        let response = self
            .client
            .post(self.search_url()?)
            .query(&[("track_total_hits", "true")])
            .json(body)
            .send()
            .await?;
        let bytes = check_status(response).await?;
        Ok(SearchResponse::parse(&bytes)?.into_feeds())
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        f.retry(http_backoff())
            .when(is_retryable)
            .notify(|e: &SearchError, delay: Duration| {
                warn!(operation, error = %e, ?delay, "Elasticsearch request failed, retrying");
            })
            .await
            .map_err(|e| {
                error!(operation, index = %self.index, error = %e, "Elasticsearch request failed");
                e
            })
    }
}

/// Return the body of a successful response, or a `Status` error.
async fn check_status(response: reqwest::Response) -> Result<bytes::Bytes> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.bytes().await?);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SearchError::Status {
        status: status.as_u16(),
        body: body.chars().take(200).collect(),
    })
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    fn name(&self) -> &str {
        "elasticsearch"
    }

    async fn upsert(&self, feed: &Feed) -> Result<()> {
        self.with_retry("index", || self.put_document(feed)).await
    }

    async fn list(&self) -> Result<Vec<Feed>> {
        let body = list_body(self.list_limit);
        self.with_retry("list", || self.run_search(&body)).await
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Feed>> {
        let body = search_body(query);
        self.with_retry("search", || self.run_search(&body)).await
    }
}
