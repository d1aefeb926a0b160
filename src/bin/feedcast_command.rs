//! feedcast-command: write side
//!
//! Accepts `POST /feeds`, persists the feed and publishes `created_feed`.
//!
//! ## Configuration
//! - FEEDCAST_CONFIG / --config: YAML configuration file
//! - FEEDCAST__STORAGE__TYPE, POSTGRES_DB/USER/PASSWORD: feed storage
//! - FEEDCAST__MESSAGING__TYPE, NATS_ADDRESS: broker

use tracing::{error, info};

use feedcast::bus::init_event_bus;
use feedcast::command::FeedCommandHandler;
use feedcast::config::Config;
use feedcast::http;
use feedcast::repository::init_repository;
use feedcast::utils::bootstrap::{init_tracing, parse_config_path, serve};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let config = Config::load(parse_config_path().as_deref()).map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!("Starting feedcast-command");

    let repository = init_repository(&config.storage).await?;
    let bus = init_event_bus(&config.messaging).await?;
    let handler = FeedCommandHandler::new(repository, bus.clone());

    let result = serve(http::command_router(handler), &config.server, "command").await;

    bus.close().await?;
    info!("feedcast-command stopped");
    result
}
