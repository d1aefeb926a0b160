//! In-memory feed repository for standalone mode and tests.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{FeedRepository, RepositoryError, Result};
use crate::models::Feed;

/// Feeds held in process memory.
#[derive(Default)]
pub struct InMemoryFeedRepository {
    feeds: RwLock<Vec<Feed>>,
    fail_on_save: RwLock<bool>,
}

impl InMemoryFeedRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent saves fail, for exercising error paths.
    pub async fn set_fail_on_save(&self, fail: bool) {
        *self.fail_on_save.write().await = fail;
    }
}

#[async_trait]
impl FeedRepository for InMemoryFeedRepository {
    fn name(&self) -> &str {
        "memory"
    }

    async fn save(&self, feed: &Feed) -> Result<()> {
        if *self.fail_on_save.read().await {
            return Err(RepositoryError::Database("save disabled".to_string()));
        }
        let mut feeds = self.feeds.write().await;
        if feeds.iter().any(|f| f.id == feed.id) {
            return Err(RepositoryError::Duplicate(feed.id.clone()));
        }
        feeds.push(feed.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Feed>> {
        let mut feeds = self.feeds.read().await.clone();
        feeds.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(feeds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_list() {
        let repo = InMemoryFeedRepository::new();
        let older = Feed::new("first", "a");
        let mut newer = Feed::new("second", "b");
        newer.created_at = older.created_at + chrono::Duration::seconds(1);

        repo.save(&older).await.unwrap();
        repo.save(&newer).await.unwrap();

        assert_eq!(repo.list().await.unwrap(), vec![newer, older]);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let repo = InMemoryFeedRepository::new();
        let feed = Feed::new("title", "");

        repo.save(&feed).await.unwrap();
        let result = repo.save(&feed).await;

        assert!(matches!(result, Err(RepositoryError::Duplicate(id)) if id == feed.id));
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fail_on_save() {
        let repo = InMemoryFeedRepository::new();
        repo.set_fail_on_save(true).await;

        assert!(repo.save(&Feed::new("t", "d")).await.is_err());
        assert!(repo.list().await.unwrap().is_empty());
    }
}
