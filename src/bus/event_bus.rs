//! Typed event bus over a [`Broker`].
//!
//! Every subscription, callback or stream, owns one dispatch task reading its
//! own broker-level subscription. Stream subscriptions hand decoded events to
//! the consumer through a bounded buffer; a full buffer suspends the dispatch
//! task instead of dropping. Closing the bus raises a shutdown signal that
//! every dispatch task selects against, so none of them stays blocked.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::dispatch::{self, DispatchResult};
use super::{Broker, BusError, RawSubscription, Result};
use crate::codec::{self, DomainEvent};

/// Default capacity of a stream subscription's buffer.
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// How long `close` waits for dispatch tasks before aborting them.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Handler for events delivered to a callback subscription.
///
/// Handlers run on their subscription's dispatch task, one event at a time.
/// A slow handler delays later deliveries to the same subscription only.
pub trait EventHandler<E>: Send + Sync + 'static {
    fn handle(&self, event: Arc<E>) -> BoxFuture<'static, Result<()>>;
}

/// Adapter turning an async closure into an [`EventHandler`].
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as an [`EventHandler`].
pub fn handler_fn<F>(f: F) -> FnHandler<F> {
    FnHandler { f }
}

impl<E, F, Fut> EventHandler<E> for FnHandler<F>
where
    E: Send + Sync + 'static,
    F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn handle(&self, event: Arc<E>) -> BoxFuture<'static, Result<()>> {
        Box::pin((self.f)(event))
    }
}

/// Lifecycle of a subscription. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Broker-level subscription is being established.
    Subscribing,
    /// Dispatch task is running.
    Active,
    /// Dispatch task has stopped; the broker subscription is released.
    Closed,
}

/// Shutdown and cancellation signals observed by a dispatch task.
struct StopSignals {
    shutdown: watch::Receiver<bool>,
    cancel: watch::Receiver<bool>,
    /// Whether dropping the cancel sender counts as cancellation.
    cancel_on_drop: bool,
}

impl StopSignals {
    /// Resolves once the bus shuts down or the subscription is cancelled.
    async fn stopped(&mut self) {
        let Self {
            shutdown,
            cancel,
            cancel_on_drop,
        } = self;
        let cancel_on_drop = *cancel_on_drop;
        let cancelled = async move {
            let dropped = cancel.wait_for(|stop| *stop).await.is_err();
            if dropped && !cancel_on_drop {
                std::future::pending::<()>().await;
            }
        };
        let shutdown = async move {
            // A dropped sender means the bus is gone.
            let _ = shutdown.wait_for(|stop| *stop).await.map(|_| ());
        };
        tokio::select! {
            _ = shutdown => {}
            _ = cancelled => {}
        }
    }
}

/// Handle to a callback subscription.
///
/// Dropping the handle leaves the subscription running for the lifetime of
/// the bus; call [`Subscription::unsubscribe`] to revoke it.
pub struct Subscription {
    subject: String,
    cancel: watch::Sender<bool>,
    state: watch::Receiver<SubscriptionState>,
}

impl Subscription {
    /// Subject this subscription listens on.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    /// Stop invoking the handler and release the broker subscription.
    pub fn unsubscribe(&self) {
        self.cancel.send_replace(true);
    }
}

/// Pull-based stream of decoded events.
///
/// Yields events in delivery order. Ends cleanly (`None`) once the stream is
/// closed, the bus is closed, or the broker subscription ends. Dropping the
/// stream revokes the subscription.
pub struct EventStream<E> {
    subject: String,
    receiver: mpsc::Receiver<E>,
    cancel: watch::Sender<bool>,
    shutdown: watch::Receiver<bool>,
    state: watch::Receiver<SubscriptionState>,
    closed: bool,
}

impl<E> EventStream<E> {
    /// Subject this stream listens on.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    /// Wait for the next event. `None` means end of sequence.
    pub async fn recv(&mut self) -> Option<E> {
        if self.is_stopped() {
            return None;
        }
        self.receiver.recv().await
    }

    /// Revoke this subscription. Later reads return `None`.
    pub fn close(&mut self) {
        self.closed = true;
        self.cancel.send_replace(true);
        self.receiver.close();
    }

    fn is_stopped(&self) -> bool {
        self.closed || *self.shutdown.borrow()
    }
}

impl<E> Stream for EventStream<E> {
    type Item = E;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<E>> {
        let this = self.get_mut();
        if this.is_stopped() {
            return Poll::Ready(None);
        }
        this.receiver.poll_recv(cx)
    }
}

/// Typed publish/subscribe facade over a broker.
///
/// Constructed once at startup and shared by `Arc` with every component that
/// publishes or subscribes.
pub struct EventBus {
    broker: Arc<dyn Broker>,
    stream_buffer: usize,
    subject_prefix: Option<String>,
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EventBus {
    /// Create a bus over the given broker.
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            broker,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            subject_prefix: None,
            shutdown,
            closed: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Set the capacity of stream subscription buffers (minimum 1).
    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = capacity.max(1);
        self
    }

    /// Prefix every subject with `prefix.`.
    pub fn with_subject_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.subject_prefix = Some(prefix.into());
        self
    }

    /// Subject for a message type.
    pub fn subject(&self, message_type: &str) -> String {
        match &self.subject_prefix {
            Some(prefix) => format!("{}.{}", prefix, message_type),
            None => message_type.to_string(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }

    /// Encode and publish an event under its message type.
    ///
    /// Codec and transport errors are returned to the caller.
    #[tracing::instrument(name = "bus.publish", skip_all, fields(message_type = E::MESSAGE_TYPE))]
    pub async fn publish<E: DomainEvent>(&self, event: &E) -> Result<()> {
        self.ensure_open()?;
        let payload = codec::encode(event)?;
        let subject = self.subject(E::MESSAGE_TYPE);
        self.broker.publish(&subject, payload).await?;
        debug!(subject = %subject, broker = self.broker.name(), "Published event");
        Ok(())
    }

    /// Invoke `handler` for every event of type `E` until the bus closes or
    /// the subscription is revoked.
    ///
    /// Handler errors and panics are logged; delivery continues.
    pub async fn subscribe_callback<E, H>(&self, handler: H) -> Result<Subscription>
    where
        E: DomainEvent,
        H: EventHandler<E>,
    {
        let (subject, raw, state) = self.open_subscription(E::MESSAGE_TYPE).await?;
        let (cancel, cancel_rx) = watch::channel(false);
        let signals = StopSignals {
            shutdown: self.shutdown.subscribe(),
            cancel: cancel_rx,
            cancel_on_drop: false,
        };
        let state_rx = state.subscribe();

        let task = tokio::spawn(run_callback::<E>(
            subject.clone(),
            raw,
            Arc::new(handler),
            signals,
            state,
        ));
        self.track(task).await;

        info!(subject = %subject, "Callback subscription active");
        Ok(Subscription {
            subject,
            cancel,
            state: state_rx,
        })
    }

    /// Open a pull-based stream of events of type `E`.
    ///
    /// One dispatch task decodes broker messages into a buffer of
    /// `stream_buffer` events. When the buffer is full the task waits for
    /// the consumer; nothing is dropped at this layer.
    pub async fn subscribe_stream<E: DomainEvent>(&self) -> Result<EventStream<E>> {
        let (subject, raw, state) = self.open_subscription(E::MESSAGE_TYPE).await?;
        let (sender, receiver) = mpsc::channel(self.stream_buffer);
        let (cancel, cancel_rx) = watch::channel(false);
        let signals = StopSignals {
            shutdown: self.shutdown.subscribe(),
            cancel: cancel_rx,
            cancel_on_drop: true,
        };
        let state_rx = state.subscribe();

        let task = tokio::spawn(run_stream::<E>(subject.clone(), raw, sender, signals, state));
        self.track(task).await;

        info!(
            subject = %subject,
            buffer = self.stream_buffer,
            "Stream subscription active"
        );
        Ok(EventStream {
            subject,
            receiver,
            cancel,
            shutdown: self.shutdown.subscribe(),
            state: state_rx,
            closed: false,
        })
    }

    /// Keep a dispatch task for `close`, dropping handles of finished ones.
    async fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    /// Dispatch tasks currently tracked.
    #[cfg(test)]
    pub(crate) async fn tracked_tasks(&self) -> usize {
        self.tasks.lock().await.len()
    }

    async fn open_subscription(
        &self,
        message_type: &str,
    ) -> Result<(String, RawSubscription, watch::Sender<SubscriptionState>)> {
        self.ensure_open()?;
        let subject = self.subject(message_type);
        let (state, _) = watch::channel(SubscriptionState::Subscribing);

        let raw = self.broker.subscribe(&subject).await.map_err(|e| {
            warn!(subject = %subject, error = %e, "Broker subscription failed");
            e
        })?;
        state.send_replace(SubscriptionState::Active);
        Ok((subject, raw, state))
    }

    /// Revoke every subscription, end every stream and release the broker.
    ///
    /// Idempotent. Dispatch tasks that do not stop within a grace period are
    /// aborted.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown.send_replace(true);

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        let task_count = tasks.len();
        let aborts: Vec<_> = tasks.iter().map(|t| t.abort_handle()).collect();
        if tokio::time::timeout(CLOSE_GRACE, futures::future::join_all(tasks))
            .await
            .is_err()
        {
            warn!(
                tasks = task_count,
                "Dispatch tasks did not stop in time, aborting"
            );
            for abort in aborts {
                abort.abort();
            }
        }

        self.broker.close().await?;
        info!(
            broker = self.broker.name(),
            subscriptions = task_count,
            "Event bus closed"
        );
        Ok(())
    }
}

async fn run_callback<E: DomainEvent>(
    subject: String,
    mut raw: RawSubscription,
    handler: Arc<dyn EventHandler<E>>,
    mut signals: StopSignals,
    state: watch::Sender<SubscriptionState>,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = signals.stopped() => break,
            next = raw.next() => match next {
                Some(message) => message,
                None => {
                    debug!(subject = %subject, "Broker subscription ended");
                    break;
                }
            },
        };

        match dispatch::process_message::<E>(&message.payload, handler.as_ref()).await {
            DispatchResult::Success => {}
            result => debug!(subject = %subject, ?result, "Delivery not handled"),
        }
    }
    drop(raw);
    state.send_replace(SubscriptionState::Closed);
    debug!(subject = %subject, "Callback subscription closed");
}

async fn run_stream<E: DomainEvent>(
    subject: String,
    mut raw: RawSubscription,
    sender: mpsc::Sender<E>,
    mut signals: StopSignals,
    state: watch::Sender<SubscriptionState>,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = signals.stopped() => break,
            next = raw.next() => match next {
                Some(message) => message,
                None => {
                    debug!(subject = %subject, "Broker subscription ended");
                    break;
                }
            },
        };

        let event = match codec::decode::<E>(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(subject = %subject, error = %e, "Dropping undecodable message");
                continue;
            }
        };

        // Waits here while the buffer is full.
        tokio::select! {
            biased;
            _ = signals.stopped() => break,
            sent = sender.send(event) => {
                if sent.is_err() {
                    debug!(subject = %subject, "Stream consumer gone");
                    break;
                }
            }
        }
    }
    drop(raw);
    drop(sender);
    state.send_replace(SubscriptionState::Closed);
    debug!(subject = %subject, "Stream subscription closed");
}
