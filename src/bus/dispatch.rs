//! Handler dispatch utilities.
//!
//! Decodes one delivered payload and runs it through a callback handler,
//! containing handler errors and panics so the subscription keeps going.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::error;

use super::{BusError, EventHandler};
use crate::codec::{self, DomainEvent};

/// Result of processing a message through a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResult {
    /// Handler succeeded.
    Success,
    /// Handler returned an error or panicked.
    HandlerFailed,
    /// Message could not be decoded, no retry will help.
    DecodeError,
}

impl DispatchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Invoke a handler, turning a panic into [`BusError::Handler`].
///
/// Panics are caught both while the handler builds its future and while the
/// future runs.
pub async fn invoke<E: 'static>(handler: &dyn EventHandler<E>, event: Arc<E>) -> Result<(), BusError> {
    let future = std::panic::catch_unwind(AssertUnwindSafe(|| handler.handle(event)))
        .map_err(|panic| BusError::Handler(panic_message(panic.as_ref())))?;

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(BusError::Handler(panic_message(panic.as_ref()))),
    }
}

/// Process a message payload through a handler.
///
/// Handles the complete decode → invoke → result cycle. Failures are logged
/// here; callers only use the result for bookkeeping.
pub async fn process_message<E: DomainEvent>(
    payload: &[u8],
    handler: &dyn EventHandler<E>,
) -> DispatchResult {
    let event = match codec::decode::<E>(payload) {
        Ok(event) => Arc::new(event),
        Err(e) => {
            error!(message_type = E::MESSAGE_TYPE, error = %e, "Failed to decode message");
            return DispatchResult::DecodeError;
        }
    };

    match invoke(handler, event).await {
        Ok(()) => DispatchResult::Success,
        Err(e) => {
            error!(message_type = E::MESSAGE_TYPE, error = %e, "Handler failed");
            DispatchResult::HandlerFailed
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked".to_string()
    }
}
