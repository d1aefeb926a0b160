//! End-to-end pipeline tests over the in-process channel broker.
//!
//! publish `created_feed` -> index updater -> search projection -> query

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use feedcast::bus::{ChannelBroker, EventBus};
use feedcast::command::{CreateFeed, FeedCommandHandler};
use feedcast::events::CreatedFeedEvent;
use feedcast::projectors::{IndexUpdater, NotificationHub};
use feedcast::query::FeedQuery;
use feedcast::repository::{FeedRepository, InMemoryFeedRepository};
use feedcast::search::{InMemorySearchIndex, SearchIndex};

fn go_releases() -> CreatedFeedEvent {
    CreatedFeedEvent {
        id: "1".to_string(),
        title: "Go Releases".to_string(),
        description: "weekly digest".to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 5, 17, 9, 0, 0).unwrap(),
    }
}

fn event(id: &str, title: &str, description: &str) -> CreatedFeedEvent {
    CreatedFeedEvent {
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        created_at: Utc::now(),
    }
}

/// Poll until the projection holds `count` documents.
async fn wait_for_documents(query: &FeedQuery, count: usize) {
    for _ in 0..300 {
        if query.list().await.unwrap().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("projection never reached {} documents", count);
}

struct Pipeline {
    bus: Arc<EventBus>,
    index: Arc<InMemorySearchIndex>,
    query: FeedQuery,
}

async fn callback_pipeline() -> Pipeline {
    let bus = Arc::new(EventBus::new(Arc::new(ChannelBroker::default())));
    let index = Arc::new(InMemorySearchIndex::new().unwrap());
    bus.subscribe_callback::<CreatedFeedEvent, _>(IndexUpdater::new(index.clone()))
        .await
        .unwrap();
    let query = FeedQuery::new(index.clone());
    Pipeline { bus, index, query }
}

#[tokio::test]
async fn test_created_feed_becomes_searchable() {
    let pipeline = callback_pipeline().await;

    pipeline.bus.publish(&go_releases()).await.unwrap();
    pipeline
        .bus
        .publish(&event("2", "Rust Weekly", "newsletter"))
        .await
        .unwrap();
    wait_for_documents(&pipeline.query, 2).await;

    let hits = pipeline.query.search("Go").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "1");
    assert_eq!(hits[0].title, "Go Releases");
    assert_eq!(hits[0].description, "weekly digest");

    let listed = pipeline.query.list().await.unwrap();
    assert!(listed.iter().any(|f| f.id == "1"));
}

#[tokio::test]
async fn test_fuzzy_search_through_pipeline() {
    let pipeline = callback_pipeline().await;

    pipeline
        .bus
        .publish(&event("a", "feed launch", "first release"))
        .await
        .unwrap();
    pipeline
        .bus
        .publish(&event("b", "Rust Weekly", "newsletter"))
        .await
        .unwrap();
    wait_for_documents(&pipeline.query, 2).await;

    let hits = pipeline.query.search("feeed").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "feed launch");
}

#[tokio::test]
async fn test_redelivery_overwrites_document() {
    let pipeline = callback_pipeline().await;

    pipeline.bus.publish(&go_releases()).await.unwrap();
    pipeline.bus.publish(&go_releases()).await.unwrap();
    wait_for_documents(&pipeline.query, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(pipeline.index.len().await, 1);
}

#[tokio::test]
async fn test_stream_subscription_feeds_index() {
    let bus = Arc::new(EventBus::new(Arc::new(ChannelBroker::default())));
    let index = Arc::new(InMemorySearchIndex::new().unwrap());
    let updater = IndexUpdater::new(index.clone());
    let events = bus.subscribe_stream::<CreatedFeedEvent>().await.unwrap();
    let task = tokio::spawn(async move { updater.run(events).await });

    bus.publish(&go_releases()).await.unwrap();
    let query = FeedQuery::new(index.clone());
    wait_for_documents(&query, 1).await;

    bus.close().await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("updater did not stop after close")
        .unwrap();
    assert_eq!(query.search("releases").await.unwrap()[0].id, "1");
}

#[tokio::test]
async fn test_command_reaches_index_and_notifications() {
    let bus = Arc::new(EventBus::new(Arc::new(ChannelBroker::default())));
    let index = Arc::new(InMemorySearchIndex::new().unwrap());
    let hub = NotificationHub::default();
    let mut client = hub.subscribe();

    bus.subscribe_callback::<CreatedFeedEvent, _>(IndexUpdater::new(index.clone()))
        .await
        .unwrap();
    bus.subscribe_callback::<CreatedFeedEvent, _>(hub.clone())
        .await
        .unwrap();

    let repository = Arc::new(InMemoryFeedRepository::new());
    let handler = FeedCommandHandler::new(repository.clone(), bus.clone());
    let feed = handler
        .create(CreateFeed {
            title: "Go Releases".to_string(),
            description: "weekly digest".to_string(),
        })
        .await
        .unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(2), client.recv())
        .await
        .unwrap()
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(json["type"], "created_feed");
    assert_eq!(json["id"], feed.id.as_str());

    let query = FeedQuery::new(index.clone());
    wait_for_documents(&query, 1).await;
    assert_eq!(index.list().await.unwrap(), repository.list().await.unwrap());

    bus.close().await.unwrap();
}
