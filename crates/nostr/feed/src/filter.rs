//! Query descriptors attached to relay assignments.
//!
//! A [`Filter`] is the unit the subscription layer turns into a NIP-01 `REQ`.
//! Absent fields are omitted when serialized.

use crate::event::{Event, PublicKey};
use serde::{Deserialize, Serialize};

/// Filter for subscription requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Authors, sorted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<PublicKey>>,

    /// Event kinds, sorted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,

    /// Events since timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,

    /// Events until timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,

    /// Maximum number of events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl Filter {
    /// Create a new empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by authors. The list is sorted and deduplicated.
    pub fn authors<I>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = PublicKey>,
    {
        let mut authors: Vec<PublicKey> = authors.into_iter().collect();
        authors.sort();
        authors.dedup();
        self.authors = Some(authors);
        self
    }

    /// Filter by kinds. The list is sorted and deduplicated.
    pub fn kinds<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        let mut kinds: Vec<u16> = kinds.into_iter().collect();
        kinds.sort_unstable();
        kinds.dedup();
        self.kinds = Some(kinds);
        self
    }

    /// Filter by events since timestamp.
    pub fn since(mut self, timestamp: u64) -> Self {
        self.since = Some(timestamp);
        self
    }

    /// Filter by events until timestamp.
    pub fn until(mut self, timestamp: u64) -> Self {
        self.until = Some(timestamp);
        self
    }

    /// Limit number of results.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Whether `event` satisfies every populated field of this filter.
    ///
    /// `limit` only bounds the initial backlog and is not checked.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(authors) = &self.authors
            && !authors.iter().any(|a| a.as_str() == event.pubkey)
        {
            return false;
        }
        if let Some(kinds) = &self.kinds
            && !kinds.contains(&event.kind)
        {
            return false;
        }
        if self.since.is_some_and(|since| event.created_at < since) {
            return false;
        }
        !self.until.is_some_and(|until| event.created_at > until)
    }
}
