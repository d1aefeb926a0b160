//! Command side: create feeds and announce them.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{error, info};

use crate::bus::{BusError, EventBus};
use crate::events::CreatedFeedEvent;
use crate::models::Feed;
use crate::repository::{FeedRepository, RepositoryError};

/// Errors from handling a command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Invalid command: {0}")]
    Invalid(String),

    #[error("Failed to persist feed: {0}")]
    Repository(#[from] RepositoryError),

    /// The feed was persisted but its event was not published.
    #[error("Feed '{id}' saved but not published: {source}")]
    Publish {
        id: String,
        #[source]
        source: BusError,
    },
}

pub type Result<T> = std::result::Result<T, CommandError>;

/// Request to create a feed.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateFeed {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Persists new feeds, then publishes `created_feed`.
#[derive(Clone)]
pub struct FeedCommandHandler {
    repository: Arc<dyn FeedRepository>,
    bus: Arc<EventBus>,
}

impl FeedCommandHandler {
    pub fn new(repository: Arc<dyn FeedRepository>, bus: Arc<EventBus>) -> Self {
        Self { repository, bus }
    }

    /// Create, persist and announce a feed.
    ///
    /// A publish failure does not roll back the saved feed.
    pub async fn create(&self, command: CreateFeed) -> Result<Feed> {
        let title = command.title.trim();
        if title.is_empty() {
            return Err(CommandError::Invalid("title is required".to_string()));
        }

        let feed = Feed::new(title, command.description.trim());
        self.repository.save(&feed).await?;

        if let Err(source) = self.bus.publish(&CreatedFeedEvent::from(&feed)).await {
            error!(id = %feed.id, error = %source, "Feed saved but event not published");
            return Err(CommandError::Publish {
                id: feed.id,
                source,
            });
        }

        info!(id = %feed.id, "Feed created");
        Ok(feed)
    }

    /// Every persisted feed.
    pub async fn list(&self) -> Result<Vec<Feed>> {
        Ok(self.repository.list().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MockBroker;
    use crate::codec;
    use crate::repository::InMemoryFeedRepository;

    fn setup() -> (Arc<InMemoryFeedRepository>, Arc<MockBroker>, FeedCommandHandler) {
        let repo = Arc::new(InMemoryFeedRepository::new());
        let broker = Arc::new(MockBroker::new());
        let bus = Arc::new(EventBus::new(broker.clone()));
        let handler = FeedCommandHandler::new(repo.clone(), bus);
        (repo, broker, handler)
    }

    fn command(title: &str) -> CreateFeed {
        CreateFeed {
            title: title.to_string(),
            description: "weekly digest".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_saves_and_publishes() {
        let (repo, broker, handler) = setup();

        let feed = handler.create(command("Go Releases")).await.unwrap();

        assert_eq!(repo.list().await.unwrap(), vec![feed.clone()]);
        let published = broker.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].subject, "created_feed");
        let event: CreatedFeedEvent = codec::decode(&published[0].payload).unwrap();
        assert_eq!(event, CreatedFeedEvent::from(&feed));
    }

    #[tokio::test]
    async fn test_blank_title_rejected() {
        let (repo, broker, handler) = setup();

        let result = handler.create(command("   ")).await;

        assert!(matches!(result, Err(CommandError::Invalid(_))));
        assert!(repo.list().await.unwrap().is_empty());
        assert_eq!(broker.published_count().await, 0);
    }

    #[tokio::test]
    async fn test_repository_failure_skips_publish() {
        let (repo, broker, handler) = setup();
        repo.set_fail_on_save(true).await;

        let result = handler.create(command("Go Releases")).await;

        assert!(matches!(result, Err(CommandError::Repository(_))));
        assert_eq!(broker.published_count().await, 0);
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_feed() {
        let (_repo, broker, handler) = setup();
        broker.set_fail_on_publish(true).await;

        let result = handler.create(command("Go Releases")).await;

        assert!(matches!(result, Err(CommandError::Publish { .. })));
        assert_eq!(handler.list().await.unwrap().len(), 1);
    }
}
