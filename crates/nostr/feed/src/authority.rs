//! Relay authority index
//!
//! Per-identity knowledge of where to read an author's events from:
//!
//! - **Preferred write relays**, learned from NIP-65 relay list metadata
//!   (kind 10002). These are authoritative: the author says they publish there.
//! - **Hints**, learned opportunistically from traffic: the relay an author's
//!   event arrived on, relay URLs carried in `p` tags and contact lists. Hints
//!   are best effort and bounded per identity.
//! - **Event hints**, the relays an event id was seen on (provenance), bounded
//!   with oldest-first eviction.
//!
//! The index is written by every ingesting connection concurrently and read by
//! the resolver, so all maps are concurrent. Changes to preferred relays bump a
//! generation counter that resolver caches compare against.

use crate::error::{FeedError, Result};
use crate::event::{Event, KIND_RELAY_LIST_METADATA, PublicKey};
use crate::relay_url::{RelayUrl, parse_all};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Tag name for relay entries
const RELAY_TAG: &str = "r";

/// Marker for read-only relays
const READ_MARKER: &str = "read";

/// Configuration for the authority index
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Most recent hint relays kept per identity
    pub max_hints_per_identity: usize,
    /// Event ids whose provenance is remembered
    pub max_event_hints: usize,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            max_hints_per_identity: 8,
            max_event_hints: 10_000,
        }
    }
}

/// A stored relay list
#[derive(Debug, Clone)]
struct RelayListEntry {
    /// Canonical write relays
    write_relays: BTreeSet<RelayUrl>,
    /// `created_at` of the relay list event
    created_at: u64,
}

/// Provenance of recently seen events, oldest first
#[derive(Debug, Default)]
struct EventHints {
    by_id: HashMap<String, BTreeSet<RelayUrl>>,
    order: VecDeque<String>,
}

/// What [`RelayAuthorityIndex::ingest`] learned from one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ingested {
    /// A relay list replaced the stored preference
    pub relay_list_updated: bool,
    /// Identity hints recorded (author plus tagged pubkeys)
    pub hints_recorded: usize,
}

/// Thread-safe relay knowledge shared by all feeds of a client.
pub struct RelayAuthorityIndex {
    config: AuthorityConfig,
    preferred: DashMap<PublicKey, RelayListEntry>,
    hints: DashMap<PublicKey, VecDeque<RelayUrl>>,
    event_hints: Mutex<EventHints>,
    generation: AtomicU64,
}

impl RelayAuthorityIndex {
    /// Create an index with default config
    pub fn new() -> Self {
        Self::with_config(AuthorityConfig::default())
    }

    /// Create an index with custom config
    pub fn with_config(config: AuthorityConfig) -> Self {
        Self {
            config,
            preferred: DashMap::new(),
            hints: DashMap::new(),
            event_hints: Mutex::new(EventHints::default()),
            generation: AtomicU64::new(0),
        }
    }

    /// Counter bumped whenever preferred relay data changes.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Store an identity's preferred write relays.
    ///
    /// Relay lists are replaceable: a list older than the stored one is
    /// ignored. Unparseable URLs are dropped. Returns whether the stored
    /// preference changed.
    pub fn set_preferred_write_relays<'a, I>(
        &self,
        identity: &PublicKey,
        relays: I,
        created_at: u64,
    ) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        let write_relays: BTreeSet<RelayUrl> = parse_all(relays).into_iter().collect();

        let changed = match self.preferred.entry(identity.clone()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                if created_at < current.created_at {
                    trace!(
                        "Ignoring stale relay list for {} ({} < {})",
                        identity, created_at, current.created_at
                    );
                    return false;
                }
                let changed = current.write_relays != write_relays;
                occupied.insert(RelayListEntry {
                    write_relays,
                    created_at,
                });
                changed
            }
            Entry::Vacant(vacant) => {
                vacant.insert(RelayListEntry {
                    write_relays,
                    created_at,
                });
                true
            }
        };

        if changed {
            debug!("Updated preferred write relays for {}", identity);
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        changed
    }

    /// Forget an identity's preferred relays
    pub fn remove_preferred(&self, identity: &PublicKey) {
        if self.preferred.remove(identity).is_some() {
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Preferred write relays for an identity (empty when unknown)
    pub fn preferred_write_relays(&self, identity: &PublicKey) -> BTreeSet<RelayUrl> {
        self.preferred
            .get(identity)
            .map(|entry| entry.write_relays.clone())
            .unwrap_or_default()
    }

    /// Check if we have a non-empty relay list for an identity
    pub fn has_relay_list(&self, identity: &PublicKey) -> bool {
        self.preferred
            .get(identity)
            .is_some_and(|entry| !entry.write_relays.is_empty())
    }

    /// Record that traffic for `identity` was seen on `relay`.
    pub fn record_hint(&self, identity: &PublicKey, relay: RelayUrl) {
        let max = self.config.max_hints_per_identity;
        if max == 0 {
            return;
        }
        let mut hints = self.hints.entry(identity.clone()).or_default();
        hints.retain(|existing| existing != &relay);
        hints.push_front(relay);
        hints.truncate(max);
    }

    /// Relays recently observed delivering an identity's traffic
    pub fn hint_relays(&self, identity: &PublicKey) -> BTreeSet<RelayUrl> {
        self.hints
            .get(identity)
            .map(|hints| hints.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Record that `event_id` was delivered by `relay`.
    pub fn record_event_hint(&self, event_id: &str, relay: RelayUrl) {
        let max = self.config.max_event_hints;
        if max == 0 {
            return;
        }
        let mut hints = self.event_hints.lock();
        if let Some(relays) = hints.by_id.get_mut(event_id) {
            relays.insert(relay);
            return;
        }

        while hints.order.len() >= max {
            match hints.order.pop_front() {
                Some(oldest) => {
                    hints.by_id.remove(&oldest);
                }
                None => break,
            }
        }
        hints.order.push_back(event_id.to_string());
        hints.by_id.insert(event_id.to_string(), BTreeSet::from([relay]));
    }

    /// Relays an event id was seen on
    pub fn event_hint_relays(&self, event_id: &str) -> BTreeSet<RelayUrl> {
        self.event_hints
            .lock()
            .by_id
            .get(event_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Learn what an incoming event says about relay routing.
    ///
    /// `source` is the relay that delivered the event, when known.
    pub fn ingest(&self, event: &Event, source: Option<&RelayUrl>) -> Ingested {
        let mut ingested = Ingested::default();
        let author = event.author();

        if event.kind == KIND_RELAY_LIST_METADATA
            && let Some(author) = &author
        {
            match write_relays_from_event(event) {
                Ok(relays) => {
                    ingested.relay_list_updated = self.set_preferred_write_relays(
                        author,
                        relays.iter().map(String::as_str),
                        event.created_at,
                    );
                }
                Err(e) => trace!("Skipping relay list {}: {}", event.id, e),
            }
        }

        if let Some(source) = source {
            if let Some(author) = &author {
                self.record_hint(author, source.clone());
                ingested.hints_recorded += 1;
            }
            self.record_event_hint(&event.id, source.clone());
        }

        // p tags (and contact list entries) may carry a relay for the pubkey
        for tag in event.tags_named("p") {
            let (Some(pubkey), Some(relay)) = (tag.get(1), tag.get(2)) else {
                continue;
            };
            if let (Ok(pubkey), Ok(relay)) = (PublicKey::parse(pubkey), RelayUrl::parse(relay)) {
                self.record_hint(&pubkey, relay);
                ingested.hints_recorded += 1;
            }
        }

        ingested
    }

    /// Number of identities with a stored relay list
    pub fn len(&self) -> usize {
        self.preferred.len()
    }

    /// Check if no relay lists are stored
    pub fn is_empty(&self) -> bool {
        self.preferred.is_empty()
    }

    /// Drop all knowledge
    pub fn clear(&self) {
        self.preferred.clear();
        self.hints.clear();
        *self.event_hints.lock() = EventHints::default();
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for RelayAuthorityIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the write relay URLs of a NIP-65 relay list event.
///
/// Entries without a marker are read/write; entries marked `read` are skipped.
/// URLs are returned as written; canonicalization happens on storage.
pub fn write_relays_from_event(event: &Event) -> Result<Vec<String>> {
    if event.kind != KIND_RELAY_LIST_METADATA {
        return Err(FeedError::InvalidKind {
            expected: KIND_RELAY_LIST_METADATA,
            found: event.kind,
        });
    }

    let mut relays = Vec::new();
    for tag in event.tags_named(RELAY_TAG) {
        let url = tag
            .get(1)
            .ok_or_else(|| FeedError::InvalidTag("relay tag must have at least URL".to_string()))?;
        if tag.get(2).is_some_and(|marker| marker == READ_MARKER) {
            continue;
        }
        relays.push(url.clone());
    }
    Ok(relays)
}
