//! feedcast-standalone: every role in one process
//!
//! Runs the command, query and pusher endpoints on a single server over the
//! in-process channel broker. Storage and search backends follow the
//! configuration and default to memory.

use tracing::{error, info, warn};

use feedcast::bus::{init_event_bus, MessagingType};
use feedcast::command::FeedCommandHandler;
use feedcast::config::Config;
use feedcast::events::CreatedFeedEvent;
use feedcast::http;
use feedcast::projectors::{IndexUpdater, NotificationHub};
use feedcast::query::FeedQuery;
use feedcast::repository::init_repository;
use feedcast::search::init_search_index;
use feedcast::utils::bootstrap::{init_tracing, parse_config_path, serve};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let mut config = Config::load(parse_config_path().as_deref()).map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    if config.messaging.messaging_type != MessagingType::Channel {
        warn!("Standalone mode always uses the channel broker");
        config.messaging.messaging_type = MessagingType::Channel;
    }

    info!("Starting feedcast-standalone");

    let repository = init_repository(&config.storage).await?;
    let index = init_search_index(&config.search).await?;
    let bus = init_event_bus(&config.messaging).await?;

    // Index through a stream subscription, notify through a callback.
    let updater = IndexUpdater::new(index.clone());
    let events = bus.subscribe_stream::<CreatedFeedEvent>().await?;
    let indexing = tokio::spawn(async move { updater.run(events).await });

    let hub = NotificationHub::default();
    let _notifications = bus
        .subscribe_callback::<CreatedFeedEvent, _>(hub.clone())
        .await?;

    let routes = http::command_routes(FeedCommandHandler::new(repository, bus.clone()))
        .merge(http::query_routes(FeedQuery::from_config(index, &config.search)))
        .merge(http::pusher_routes(hub));

    let result = serve(http::app(routes), &config.server, "standalone").await;

    bus.close().await?;
    if let Err(e) = indexing.await {
        error!(error = %e, "Index updater task failed");
    }
    info!("feedcast-standalone stopped");
    result
}
