//! feedcast-pusher: live notifications
//!
//! Subscribes to `created_feed` and pushes each feed as JSON to every
//! websocket client connected at `GET /ws`.

use tracing::{error, info};

use feedcast::bus::init_event_bus;
use feedcast::config::Config;
use feedcast::events::CreatedFeedEvent;
use feedcast::http;
use feedcast::projectors::NotificationHub;
use feedcast::utils::bootstrap::{init_tracing, parse_config_path, serve};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let config = Config::load(parse_config_path().as_deref()).map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!("Starting feedcast-pusher");

    let bus = init_event_bus(&config.messaging).await?;
    let hub = NotificationHub::default();

    let subscription = bus
        .subscribe_callback::<CreatedFeedEvent, _>(hub.clone())
        .await?;
    info!(subject = %subscription.subject(), "Notification hub subscribed");

    let result = serve(http::pusher_router(hub), &config.server, "pusher").await;

    bus.close().await?;
    info!("feedcast-pusher stopped");
    result
}
