//! Feed entity shared by the command side and the search projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A feed as persisted by the command side and indexed by the read side.
///
/// The search projection stores the same shape, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    pub id: String,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Feed {
    /// Create a feed with a fresh identity stamped at the current time.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            description: description.into(),
            created_at: Utc::now(),
        }
    }
}
