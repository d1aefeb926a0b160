//! Event consumers that maintain read-side state.

mod index;
mod notifier;

pub use index::IndexUpdater;
pub use notifier::{CreatedFeedNotification, NotificationHub, DEFAULT_HUB_CAPACITY};
