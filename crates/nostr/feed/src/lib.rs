//! Live-feed ingestion core for OpenAgents Nostr clients.
//!
//! This crate provides:
//! - Relay URL canonicalization
//! - A thread-safe relay authority index (NIP-65 relay lists and traffic hints)
//! - Outbox model relay resolution with greedy relay set cover and caching
//! - Bounded, ordered, deduplicated feed collections with a hold buffer
//! - End-of-stored-events tracking per resolved feed
//!
//! # Example
//!
//! ```rust,no_run
//! use nostr_feed::{
//!     CollectionConfig, OutboxResolver, PublicKey, RelayAuthorityIndex, event_collection,
//! };
//! use std::collections::BTreeSet;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let index = Arc::new(RelayAuthorityIndex::new());
//!     let resolver = OutboxResolver::new(index);
//!
//!     let follows: BTreeSet<PublicKey> = BTreeSet::new();
//!     let plan = resolver.resolve(&follows, &BTreeSet::from([1]), 200, nostr_feed::DEFAULT_FALLBACK_RELAYS);
//!     for assignment in plan.iter() {
//!         println!("REQ to {} with {} filters", assignment.relay, assignment.filters.len());
//!     }
//!
//!     let feed = event_collection(CollectionConfig::default());
//!     // while the user is scrolled away from the top:
//!     feed.set_holding(true);
//!     // ... feed.add(event) for each incoming event ...
//!     feed.settled().await;
//!     println!("{} new", feed.pending_count());
//! }
//! ```

mod authority;
mod collection;
mod cover;
mod error;
mod event;
mod filter;
mod outbox;
mod relay_url;
mod tracker;


pub use authority::{AuthorityConfig, Ingested, RelayAuthorityIndex, write_relays_from_event};
pub use collection::{
    Admission, BatchOutcome, CollectionConfig, FeedCollection, IdFn, OrderFn, OrderedWindow,
    Snapshot,
};
pub use cover::select_relays;
pub use error::{FeedError, Result};
pub use event::{
    Event, KIND_CONTACT_LIST, KIND_REACTION, KIND_RELAY_LIST_METADATA, KIND_REPOST,
    KIND_SHORT_TEXT_NOTE, PublicKey,
};
pub use filter::Filter;
pub use outbox::{DEFAULT_CACHE_TTL, OutboxConfig, OutboxResolver, RelayAssignment, RelayPlan};
pub use relay_url::RelayUrl;
pub use tracker::{LoadState, LoadTracker};

use std::cmp::Ordering;

/// Fallback relays for authors with no relay list and no hints.
pub const DEFAULT_FALLBACK_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://nos.lol",
    "wss://relay.nostr.band",
    "wss://nostr.wine",
];

/// Newest first, ties broken by event id.
pub fn newest_first(a: &Event, b: &Event) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// An event window keyed by event id, newest first.
pub fn event_window(config: &CollectionConfig) -> OrderedWindow<Event, String> {
    OrderedWindow::with_config(config, |event: &Event| event.id.clone()).ordered_by(newest_first)
}

/// Spawn an event feed collection on the current Tokio runtime.
pub fn event_collection(config: CollectionConfig) -> FeedCollection<Event> {
    let window = event_window(&config);
    FeedCollection::spawn(window, config.coalesce_delay, config.label)
}
