//! Event bus for async delivery.
//!
//! This module contains:
//! - `Broker` trait: raw transport contract implemented by broker adapters
//! - `EventBus`: typed publish / callback subscription / stream subscription
//!   facade over one broker
//! - `EventHandler` trait: for processing delivered events
//! - Bus configuration types
//! - Implementations: Channel (in-process), NATS, Mock

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Deserialize;
use tracing::info;

use crate::codec::CodecError;

// Implementation modules
pub mod channel;
pub mod dispatch;
mod event_bus;
pub mod mock;
#[cfg(feature = "nats")]
pub mod nats;

// Re-exports
pub use channel::{ChannelBroker, ChannelConfig};
pub use dispatch::DispatchResult;
pub use event_bus::{
    handler_fn, EventBus, EventHandler, EventStream, FnHandler, Subscription, SubscriptionState,
    DEFAULT_STREAM_BUFFER,
};
pub use mock::MockBroker;
#[cfg(feature = "nats")]
pub use nats::NatsBroker;

// ============================================================================
// Traits
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Event bus is closed")]
    Closed,

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Handler failed: {0}")]
    Handler(String),
}

/// A message as delivered by a broker: subject plus opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub subject: String,
    pub payload: Bytes,
}

/// Raw messages for one broker-level subscription.
///
/// Dropping the stream revokes the subscription at the broker.
pub type RawSubscription = BoxStream<'static, RawMessage>;

/// Transport contract implemented by broker adapters.
///
/// Delivery is fire-and-forget: a publish with no live subscription for the
/// subject is not an error and is not retained.
///
/// Implementations:
/// - `ChannelBroker`: tokio broadcast channels within one process
/// - `NatsBroker`: core NATS subjects
/// - `MockBroker`: records publishes, injectable failures
#[async_trait]
pub trait Broker: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &str;

    /// Send a payload to every live subscription of `subject`.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()>;

    /// Open a broker-level subscription on `subject`.
    async fn subscribe(&self, subject: &str) -> Result<RawSubscription>;

    /// Release the transport. Open subscriptions end.
    async fn close(&self) -> Result<()>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Messaging type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagingType {
    /// In-process broadcast channels.
    #[default]
    Channel,
    /// Core NATS.
    Nats,
}

/// Messaging configuration (discriminated union).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Messaging type discriminator.
    #[serde(rename = "type")]
    pub messaging_type: MessagingType,
    /// Prefix joined to every message type with a dot to form the subject.
    pub subject_prefix: Option<String>,
    /// Capacity of each stream subscription's buffer.
    pub stream_buffer: usize,
    /// Channel-specific configuration.
    pub channel: ChannelConfig,
    /// NATS-specific configuration.
    pub nats: NatsConfig,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            messaging_type: MessagingType::Channel,
            subject_prefix: None,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            channel: ChannelConfig::default(),
            nats: NatsConfig::default(),
        }
    }
}

/// NATS-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URL.
    pub url: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
        }
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Initialize the broker selected by configuration.
///
/// NATS requires the `nats` feature. Connection attempts are retried with
/// exponential backoff.
pub async fn init_broker(
    config: &MessagingConfig,
) -> std::result::Result<Arc<dyn Broker>, Box<dyn std::error::Error + Send + Sync>> {
    match config.messaging_type {
        MessagingType::Channel => {
            let broker = ChannelBroker::new(config.channel.clone());
            info!(messaging_type = "channel", "Broker initialized");
            Ok(Arc::new(broker))
        }
        MessagingType::Nats => {
            #[cfg(feature = "nats")]
            {
                use backon::Retryable;

                let nats = config.nats.clone();
                let broker = (|| async { NatsBroker::connect(&nats).await })
                    .retry(crate::utils::retry::connection_backoff())
                    .notify(|e: &BusError, delay: std::time::Duration| {
                        tracing::warn!(error = %e, ?delay, "NATS connection failed, retrying");
                    })
                    .await?;
                info!(messaging_type = "nats", url = %config.nats.url, "Broker initialized");
                Ok(Arc::new(broker))
            }

            #[cfg(not(feature = "nats"))]
            {
                Err("NATS support requires the 'nats' feature. Rebuild with --features nats".into())
            }
        }
    }
}

/// Initialize the broker and wrap it in an [`EventBus`].
pub async fn init_event_bus(
    config: &MessagingConfig,
) -> std::result::Result<Arc<EventBus>, Box<dyn std::error::Error + Send + Sync>> {
    let broker = init_broker(config).await?;
    let mut bus = EventBus::new(broker).with_stream_buffer(config.stream_buffer);
    if let Some(prefix) = &config.subject_prefix {
        bus = bus.with_subject_prefix(prefix.clone());
    }
    Ok(Arc::new(bus))
}
