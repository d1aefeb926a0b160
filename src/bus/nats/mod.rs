//! Core NATS broker implementation.
//!
//! Subjects map one-to-one onto NATS subjects. Delivery is core NATS
//! at-most-once: nothing is persisted and a subject with no subscribers
//! drops the message.
//!
//! # Configuration
//!
//! ```yaml
//! messaging:
//!   type: nats
//!   nats:
//!     url: "nats://localhost:4222"
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{Broker, BusError, NatsConfig, RawMessage, RawSubscription, Result};

/// Broker backed by a core NATS connection.
///
/// `close` flushes and releases the client; later calls fail with `Closed`.
pub struct NatsBroker {
    client: RwLock<Option<async_nats::Client>>,
}

impl NatsBroker {
    /// Connect to the server named in `config`.
    pub async fn connect(config: &NatsConfig) -> Result<Self> {
        let client = async_nats::connect(&config.url)
            .await
            .map_err(|e| BusError::Connection(format!("{}: {}", config.url, e)))?;
        info!(url = %config.url, "Connected to NATS");
        Ok(Self::from_client(client))
    }

    /// Wrap an already connected client.
    pub fn from_client(client: async_nats::Client) -> Self {
        Self {
            client: RwLock::new(Some(client)),
        }
    }

    async fn client(&self) -> Result<async_nats::Client> {
        self.client.read().await.clone().ok_or(BusError::Closed)
    }
}

#[async_trait]
impl Broker for NatsBroker {
    fn name(&self) -> &str {
        "nats"
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        self.client()
            .await?
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;
        debug!(subject = %subject, "Published to NATS");
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<RawSubscription> {
        let subscriber = self
            .client()
            .await?
            .subscribe(subject.to_string())
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        // Dropping the subscriber sends UNSUB to the server.
        let stream = subscriber.map(|message| RawMessage {
            subject: message.subject.to_string(),
            payload: message.payload,
        });
        Ok(stream.boxed())
    }

    async fn close(&self) -> Result<()> {
        let Some(client) = self.client.write().await.take() else {
            return Ok(());
        };
        client
            .flush()
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        // The connection ends once the last handle is dropped.
        drop(client);
        info!("NATS broker closed");
        Ok(())
    }
}
