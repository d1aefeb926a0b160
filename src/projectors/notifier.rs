//! Live fan-out of created feeds to connected clients.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error};

use crate::bus::{BusError, EventHandler};
use crate::events::{CreatedFeedEvent, CREATED_FEED};

/// Default number of notifications buffered per client.
pub const DEFAULT_HUB_CAPACITY: usize = 256;

/// JSON frame sent to clients for each created feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedFeedNotification {
    #[serde(rename = "type")]
    pub message_type: String,
    pub id: String,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<&CreatedFeedEvent> for CreatedFeedNotification {
    fn from(event: &CreatedFeedEvent) -> Self {
        Self {
            message_type: CREATED_FEED.to_string(),
            id: event.id.clone(),
            title: event.title.clone(),
            description: event.description.clone(),
            created_at: event.created_at,
        }
    }
}

/// Re-broadcasts events as JSON text to every connected client.
///
/// Each client holds its own receiver; a client that falls more than the
/// hub capacity behind skips the oldest frames.
#[derive(Clone)]
pub struct NotificationHub {
    sender: broadcast::Sender<Arc<str>>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Register a client.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.sender.subscribe()
    }

    pub fn client_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Send a frame to every client. Returns how many received it.
    pub fn broadcast(&self, notification: &CreatedFeedNotification) -> usize {
        let frame: Arc<str> = match serde_json::to_string(notification) {
            Ok(json) => json.into(),
            Err(e) => {
                error!(id = %notification.id, error = %e, "Failed to serialize notification");
                return 0;
            }
        };
        match self.sender.send(frame) {
            Ok(clients) => {
                debug!(id = %notification.id, clients, "Broadcast notification");
                clients
            }
            // No clients connected
            Err(_) => 0,
        }
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(DEFAULT_HUB_CAPACITY)
    }
}

impl EventHandler<CreatedFeedEvent> for NotificationHub {
    fn handle(&self, event: Arc<CreatedFeedEvent>) -> BoxFuture<'static, Result<(), BusError>> {
        self.broadcast(&CreatedFeedNotification::from(event.as_ref()));
        Box::pin(async { Ok(()) })
    }
}
