//! Mock broker implementation for testing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{Broker, BusError, RawMessage, RawSubscription, Result};

/// Mock broker for testing.
///
/// Records every publish and loops it back to live subscribers of the same
/// subject. Failures can be injected per operation.
#[derive(Default)]
pub struct MockBroker {
    published: RwLock<Vec<RawMessage>>,
    subscribers: RwLock<Vec<(String, mpsc::UnboundedSender<RawMessage>)>>,
    fail_on_publish: RwLock<bool>,
    fail_on_subscribe: RwLock<bool>,
    keep_subscribers_on_close: AtomicBool,
    close_count: AtomicUsize,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    pub async fn set_fail_on_subscribe(&self, fail: bool) {
        *self.fail_on_subscribe.write().await = fail;
    }

    /// Leave broker-level subscriptions open across `close`, like a
    /// transport that keeps delivering after release.
    pub fn set_keep_subscribers_on_close(&self, keep: bool) {
        self.keep_subscribers_on_close.store(keep, Ordering::SeqCst);
    }

    /// Broker-level subscriptions still registered.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn published(&self) -> Vec<RawMessage> {
        self.published.read().await.clone()
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    /// Deliver a raw payload to subscribers without recording it.
    pub async fn inject(&self, subject: &str, payload: Bytes) {
        self.deliver(subject, payload).await;
    }

    async fn deliver(&self, subject: &str, payload: Bytes) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.retain(|(s, tx)| {
            if s != subject {
                return !tx.is_closed();
            }
            tx.send(RawMessage {
                subject: subject.to_string(),
                payload: payload.clone(),
            })
            .is_ok()
        });
    }
}

#[async_trait]
impl Broker for MockBroker {
    fn name(&self) -> &str {
        "mock"
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        if *self.fail_on_publish.read().await {
            return Err(BusError::Publish("Mock publish failure".to_string()));
        }
        self.published.write().await.push(RawMessage {
            subject: subject.to_string(),
            payload: payload.clone(),
        });
        self.deliver(subject, payload).await;
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<RawSubscription> {
        if *self.fail_on_subscribe.read().await {
            return Err(BusError::Subscribe("Mock subscribe failure".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .write()
            .await
            .push((subject.to_string(), tx));
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn close(&self) -> Result<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        if !self.keep_subscribers_on_close.load(Ordering::SeqCst) {
            self.subscribers.write().await.clear();
        }
        Ok(())
    }
}
