//! feedcast-query: search projection and read API
//!
//! Subscribes to `created_feed`, indexes each feed, and serves
//! `GET /feeds` and `GET /search?q=`.
//!
//! ## Configuration
//! - FEEDCAST_CONFIG / --config: YAML configuration file
//! - FEEDCAST__SEARCH__TYPE, ELASTICSEARCH_ADDRESS: search store
//! - FEEDCAST__MESSAGING__TYPE, NATS_ADDRESS: broker

use tracing::{error, info};

use feedcast::bus::init_event_bus;
use feedcast::config::Config;
use feedcast::events::CreatedFeedEvent;
use feedcast::http;
use feedcast::projectors::IndexUpdater;
use feedcast::query::FeedQuery;
use feedcast::search::init_search_index;
use feedcast::utils::bootstrap::{init_tracing, parse_config_path, serve};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let config = Config::load(parse_config_path().as_deref()).map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!("Starting feedcast-query");

    let index = init_search_index(&config.search).await?;
    let bus = init_event_bus(&config.messaging).await?;

    let subscription = bus
        .subscribe_callback::<CreatedFeedEvent, _>(IndexUpdater::new(index.clone()))
        .await?;
    info!(subject = %subscription.subject(), "Index updater subscribed");

    let query = FeedQuery::from_config(index, &config.search);
    let result = serve(http::query_router(query), &config.server, "query").await;

    bus.close().await?;
    info!("feedcast-query stopped");
    result
}
