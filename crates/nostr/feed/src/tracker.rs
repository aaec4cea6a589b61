//! End-of-stored-events bookkeeping for a resolved feed.
//!
//! A feed is "loading" until every relay in its plan has sent EOSE. Only then
//! can an empty collection be shown as confirmed empty.

use crate::outbox::RelayPlan;
use crate::relay_url::RelayUrl;
use std::collections::BTreeSet;

/// What the user should see for a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Some relay has not finished sending stored events
    Loading,
    /// All relays finished and nothing is visible
    Empty,
    /// All relays finished and items are visible
    Ready,
}

/// Tracks which relays of a plan have delivered their backlog.
#[derive(Debug, Clone, Default)]
pub struct LoadTracker {
    /// Relays the feed is subscribed on
    relays: BTreeSet<RelayUrl>,
    /// Relays that have sent EOSE
    eose_relays: BTreeSet<RelayUrl>,
    /// Built from a resolved plan, so an empty relay set is final
    resolved: bool,
}

impl LoadTracker {
    /// Create a tracker with no relays; it stays loading until one is added
    /// and finishes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track every relay of a resolved plan.
    ///
    /// A plan with no relays has nothing left to load and is immediately
    /// complete.
    pub fn for_plan(plan: &RelayPlan) -> Self {
        Self {
            relays: plan.relays().cloned().collect(),
            eose_relays: BTreeSet::new(),
            resolved: true,
        }
    }

    /// Add a relay to the feed.
    pub fn add_relay(&mut self, relay: RelayUrl) {
        self.relays.insert(relay);
    }

    /// Remove a relay from the feed, e.g. after it disconnected.
    pub fn remove_relay(&mut self, relay: &RelayUrl) {
        self.relays.remove(relay);
        self.eose_relays.remove(relay);
    }

    /// Mark EOSE received from a relay. Unknown relays are ignored.
    pub fn mark_eose(&mut self, relay: &RelayUrl) {
        if self.relays.contains(relay) {
            self.eose_relays.insert(relay.clone());
        }
    }

    /// Whether every tracked relay has sent EOSE.
    pub fn all_eose(&self) -> bool {
        (self.resolved || !self.relays.is_empty()) && self.relays.len() == self.eose_relays.len()
    }

    /// Relays still sending stored events
    pub fn outstanding(&self) -> impl Iterator<Item = &RelayUrl> {
        self.relays.difference(&self.eose_relays)
    }

    /// Number of tracked relays
    pub fn relay_count(&self) -> usize {
        self.relays.len()
    }

    /// Load state given how many items the feed currently shows.
    pub fn state(&self, visible_len: usize) -> LoadState {
        if visible_len > 0 && self.all_eose() {
            LoadState::Ready
        } else if self.all_eose() {
            LoadState::Empty
        } else {
            LoadState::Loading
        }
    }
}
