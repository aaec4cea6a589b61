//! Bounded ordered event collections
//!
//! A live feed merges a duplicate-laden, out-of-order stream from many relays
//! into one list the user scrolls. [`OrderedWindow`] is the state machine that
//! keeps that list sorted, bounded and deduplicated, and that holds genuinely
//! new items back while the user is reading. [`FeedCollection`] runs a window
//! on its own task so any number of producers can feed it without locking,
//! and publishes immutable [`Snapshot`]s to readers.

mod actor;
mod window;

pub use actor::FeedCollection;
pub use window::{Admission, BatchOutcome, IdFn, OrderFn, OrderedWindow, Snapshot};

use serde::Deserialize;
use std::time::Duration;

/// Configuration for a feed collection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Maximum visible items
    pub max_size: usize,
    /// Window for merging bursts of mutations into one published snapshot
    #[serde(rename = "coalesce_delay_ms", with = "optional_millis")]
    pub coalesce_delay: Option<Duration>,
    /// Surface name used in logs ("home", "notifications", ...)
    pub label: String,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            max_size: 500,
            coalesce_delay: None,
            label: "feed".to_string(),
        }
    }
}

mod optional_millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis))
    }
}
