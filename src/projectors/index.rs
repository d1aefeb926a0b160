//! Projects created feeds into the search index.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, error, info};

use crate::bus::{BusError, EventHandler, EventStream};
use crate::events::CreatedFeedEvent;
use crate::models::Feed;
use crate::search::SearchIndex;

/// Keeps the search projection in step with `created_feed` events.
///
/// Indexing is an upsert keyed by feed id, so redelivered events are
/// harmless. Indexing failures are logged and dropped: the command side
/// never sees them.
#[derive(Clone)]
pub struct IndexUpdater {
    index: Arc<dyn SearchIndex>,
}

impl IndexUpdater {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }

    /// Upsert the document for one event. Returns whether it was indexed.
    pub async fn on_domain_event(&self, event: &CreatedFeedEvent) -> bool {
        let feed = Feed::from(event.clone());
        match self.index.upsert(&feed).await {
            Ok(()) => {
                debug!(id = %feed.id, index = self.index.name(), "Feed indexed");
                true
            }
            Err(e) => {
                error!(id = %feed.id, error = %e, "Failed to index feed");
                false
            }
        }
    }

    /// Drain a stream subscription until it ends.
    pub async fn run(&self, mut events: EventStream<CreatedFeedEvent>) {
        info!(subject = %events.subject(), "Index updater consuming stream");
        let mut indexed = 0usize;
        while let Some(event) = events.recv().await {
            if self.on_domain_event(&event).await {
                indexed += 1;
            }
        }
        info!(indexed, "Index updater stream ended");
    }
}

impl EventHandler<CreatedFeedEvent> for IndexUpdater {
    fn handle(&self, event: Arc<CreatedFeedEvent>) -> BoxFuture<'static, Result<(), BusError>> {
        let updater = self.clone();
        Box::pin(async move {
            updater.on_domain_event(&event).await;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{ChannelBroker, EventBus};
    use crate::search::{InMemorySearchIndex, Result as SearchResult, SearchError, SearchQuery};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    fn go_releases() -> CreatedFeedEvent {
        CreatedFeedEvent {
            id: "1".to_string(),
            title: "Go Releases".to_string(),
            description: "weekly digest".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 17, 9, 0, 0).unwrap(),
        }
    }

    struct FailingIndex;

    #[async_trait]
    impl SearchIndex for FailingIndex {
        fn name(&self) -> &str {
            "failing"
        }
        async fn upsert(&self, _feed: &Feed) -> SearchResult<()> {
            Err(SearchError::Unavailable("down".to_string()))
        }
        async fn list(&self) -> SearchResult<Vec<Feed>> {
            Err(SearchError::Unavailable("down".to_string()))
        }
        async fn search(&self, _query: &SearchQuery) -> SearchResult<Vec<Feed>> {
            Err(SearchError::Unavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_event_becomes_document() {
        let index = Arc::new(InMemorySearchIndex::new().unwrap());
        let updater = IndexUpdater::new(index.clone());

        assert!(updater.on_domain_event(&go_releases()).await);

        let listed = index.list().await.unwrap();
        assert_eq!(listed, vec![Feed::from(go_releases())]);
    }

    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let index = Arc::new(InMemorySearchIndex::new().unwrap());
        let updater = IndexUpdater::new(index.clone());

        updater.on_domain_event(&go_releases()).await;
        updater.on_domain_event(&go_releases()).await;

        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn test_index_failure_is_swallowed() {
        let updater = IndexUpdater::new(Arc::new(FailingIndex));

        assert!(!updater.on_domain_event(&go_releases()).await);
        let handled = updater.handle(Arc::new(go_releases())).await;
        assert!(handled.is_ok());
    }

    #[tokio::test]
    async fn test_run_drains_stream_until_close() {
        let bus = Arc::new(EventBus::new(Arc::new(ChannelBroker::default())));
        let index = Arc::new(InMemorySearchIndex::new().unwrap());
        let updater = IndexUpdater::new(index.clone());

        let stream = bus.subscribe_stream::<CreatedFeedEvent>().await.unwrap();
        let task = tokio::spawn(async move { updater.run(stream).await });

        bus.publish(&go_releases()).await.unwrap();
        for _ in 0..100 {
            if index.len().await == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        bus.close().await.unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(index.len().await, 1);
    }
}
