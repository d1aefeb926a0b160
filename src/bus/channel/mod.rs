//! In-memory channel-based broker for standalone mode.
//!
//! Uses one tokio broadcast channel per subject for pub/sub within a single
//! process. Ideal for local development and testing without external
//! dependencies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, error, info};

use super::{Broker, BusError, RawMessage, RawSubscription, Result};

/// Default per-subject channel capacity.
const CHANNEL_CAPACITY: usize = 1024;

/// Configuration for the channel broker.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Per-subject broadcast capacity. A receiver that falls this far behind
    /// loses the oldest messages.
    pub capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: CHANNEL_CAPACITY,
        }
    }
}

/// In-process broker using tokio broadcast channels.
///
/// Subjects are matched exactly. A channel is created the first time a
/// subject is published to or subscribed on.
pub struct ChannelBroker {
    subjects: RwLock<HashMap<String, broadcast::Sender<Bytes>>>,
    config: ChannelConfig,
    closed: AtomicBool,
}

impl ChannelBroker {
    /// Create a new channel broker.
    pub fn new(config: ChannelConfig) -> Self {
        info!(capacity = config.capacity, "Channel broker initialized");
        Self {
            subjects: RwLock::new(HashMap::new()),
            config: ChannelConfig {
                capacity: config.capacity.max(1),
            },
            closed: AtomicBool::new(false),
        }
    }

    async fn sender(&self, subject: &str) -> broadcast::Sender<Bytes> {
        if let Some(sender) = self.subjects.read().await.get(subject) {
            return sender.clone();
        }
        self.subjects
            .write()
            .await
            .entry(subject.to_string())
            .or_insert_with(|| broadcast::channel(self.config.capacity).0)
            .clone()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for ChannelBroker {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}

#[async_trait]
impl Broker for ChannelBroker {
    fn name(&self) -> &str {
        "channel"
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        self.ensure_open()?;
        match self.sender(subject).await.send(payload) {
            Ok(receivers) => {
                debug!(subject = %subject, receivers, "Published to channel");
            }
            Err(_) => {
                // No receivers, that's okay for fire-and-forget
                debug!(subject = %subject, "Published to channel (no receivers)");
            }
        }
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<RawSubscription> {
        self.ensure_open()?;
        let receiver = self.sender(subject).await.subscribe();
        let owned_subject = subject.to_string();

        let stream = BroadcastStream::new(receiver).filter_map(move |item| {
            let subject = owned_subject.clone();
            async move {
                match item {
                    Ok(payload) => Some(RawMessage { subject, payload }),
                    Err(BroadcastStreamRecvError::Lagged(n)) => {
                        error!(subject = %subject, skipped = n, "Channel subscriber lagged, skipped messages");
                        None
                    }
                }
            }
        });

        debug!(subject = %subject, "Channel subscription opened");
        Ok(stream.boxed())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // Dropping the senders ends every open subscription.
        self.subjects.write().await.clear();
        info!("Channel broker closed");
        Ok(())
    }
}
