//! Outbox model relay resolution
//!
//! Decides which relays to query for a set of followed authors:
//!
//! 1. Authors with known NIP-65 write relays are covered by a small relay set
//!    chosen with a greedy set cover; each chosen relay gets one filter listing
//!    the authors assigned to it.
//! 2. Authors without a relay list but with hint relays get one filter per
//!    hint relay, each naming only that author.
//! 3. Everyone else is queried as one group on every fallback relay.
//!
//! The last plan is cached, keyed by its inputs, until the TTL passes, the
//! authority index changes its preferred relays, or the cache is invalidated.
//! Resolution never fails; unusable relay URLs are dropped.

use crate::authority::RelayAuthorityIndex;
use crate::cover::select_relays;
use crate::event::{Event, PublicKey};
use crate::filter::Filter;
use crate::relay_url::{RelayUrl, parse_all};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default time a resolved plan stays valid
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Configuration for outbox resolution
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    /// How long a resolved plan is reused
    #[serde(rename = "cache_ttl_secs", with = "duration_secs")]
    pub cache_ttl: Duration,
    /// Fallback relays used by [`OutboxResolver::resolve_default`]
    pub fallback_relays: Vec<String>,
    /// Distinct relays each covered author is assigned to
    pub relays_per_identity: usize,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            fallback_relays: vec![],
            relays_per_identity: 1,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// The filters to send to one relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayAssignment {
    /// Relay to query
    pub relay: RelayUrl,
    /// Filters for that relay, in emission order
    pub filters: Vec<Filter>,
}

impl RelayAssignment {
    /// Every author named by this assignment's filters
    pub fn authors(&self) -> BTreeSet<PublicKey> {
        self.filters
            .iter()
            .filter_map(|f| f.authors.as_ref())
            .flatten()
            .cloned()
            .collect()
    }

    /// Whether an event delivered by this relay was asked for
    pub fn matches(&self, event: &Event) -> bool {
        self.filters.iter().any(|filter| filter.matches(event))
    }
}

/// A resolved relay -> filters mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayPlan {
    assignments: BTreeMap<RelayUrl, RelayAssignment>,
}

impl RelayPlan {
    fn push(&mut self, relay: RelayUrl, filter: Filter) {
        self.assignments
            .entry(relay.clone())
            .or_insert_with(|| RelayAssignment {
                relay,
                filters: Vec::new(),
            })
            .filters
            .push(filter);
    }

    /// Relays in the plan, in URL order
    pub fn relays(&self) -> impl Iterator<Item = &RelayUrl> {
        self.assignments.keys()
    }

    /// The assignment for a relay
    pub fn get(&self, relay: &RelayUrl) -> Option<&RelayAssignment> {
        self.assignments.get(relay)
    }

    /// All assignments, in relay URL order
    pub fn iter(&self) -> impl Iterator<Item = &RelayAssignment> {
        self.assignments.values()
    }

    /// Authors queried on a relay (empty if the relay is not in the plan)
    pub fn authors_for(&self, relay: &RelayUrl) -> BTreeSet<PublicKey> {
        self.get(relay).map(RelayAssignment::authors).unwrap_or_default()
    }

    /// Whether `relay` was asked for `event`.
    ///
    /// Relays may answer with events outside the subscription; those, and
    /// anything from a relay not in the plan, are rejected.
    pub fn accepts(&self, relay: &RelayUrl, event: &Event) -> bool {
        self.get(relay).is_some_and(|assignment| assignment.matches(event))
    }

    /// Number of relays in the plan
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    /// Check if the plan queries no relay
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

impl<'a> IntoIterator for &'a RelayPlan {
    type Item = &'a RelayAssignment;
    type IntoIter = std::collections::btree_map::Values<'a, RelayUrl, RelayAssignment>;

    fn into_iter(self) -> Self::IntoIter {
        self.assignments.values()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheKey {
    identities: BTreeSet<PublicKey>,
    kinds: BTreeSet<u16>,
    limit: u64,
    fallback: BTreeSet<RelayUrl>,
}

#[derive(Debug)]
struct CacheEntry {
    key: CacheKey,
    plan: Arc<RelayPlan>,
    computed_at: Instant,
    generation: u64,
}

/// Outbox model relay resolver
///
/// One resolver belongs to one logical feed; the authority index behind it is
/// shared.
pub struct OutboxResolver {
    /// Configuration
    config: OutboxConfig,
    /// Relay knowledge
    index: Arc<RelayAuthorityIndex>,
    /// Last resolved plan
    cache: Mutex<Option<CacheEntry>>,
}

impl OutboxResolver {
    /// Create a resolver with default config
    pub fn new(index: Arc<RelayAuthorityIndex>) -> Self {
        Self::with_config(index, OutboxConfig::default())
    }

    /// Create a resolver with custom config
    pub fn with_config(index: Arc<RelayAuthorityIndex>, config: OutboxConfig) -> Self {
        Self {
            config,
            index,
            cache: Mutex::new(None),
        }
    }

    /// The resolver configuration
    pub fn config(&self) -> &OutboxConfig {
        &self.config
    }

    /// The authority index consulted by this resolver
    pub fn index(&self) -> &Arc<RelayAuthorityIndex> {
        &self.index
    }

    /// Resolve using the configured fallback relays.
    pub fn resolve_default(
        &self,
        identities: &BTreeSet<PublicKey>,
        kinds: &BTreeSet<u16>,
        limit: u64,
    ) -> Arc<RelayPlan> {
        self.resolve(identities, kinds, limit, &self.config.fallback_relays)
    }

    /// Compute (or reuse) the relay plan for `identities`.
    ///
    /// Repeated calls with the same inputs return the same `Arc` until the
    /// cache expires or is invalidated. Empty `identities` yield an empty plan
    /// and leave the cache untouched.
    pub fn resolve<F, S>(
        &self,
        identities: &BTreeSet<PublicKey>,
        kinds: &BTreeSet<u16>,
        limit: u64,
        fallback: F,
    ) -> Arc<RelayPlan>
    where
        F: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if identities.is_empty() {
            return Arc::new(RelayPlan::default());
        }

        let fallback_raw: Vec<S> = fallback.into_iter().collect();
        let key = CacheKey {
            identities: identities.clone(),
            kinds: kinds.clone(),
            limit,
            fallback: parse_all(fallback_raw.iter().map(AsRef::as_ref))
                .into_iter()
                .collect(),
        };

        let mut cache = self.cache.lock();
        let generation = self.index.generation();

        if let Some(entry) = cache.as_ref()
            && entry.key == key
            && entry.generation == generation
            && entry.computed_at.elapsed() < self.config.cache_ttl
        {
            debug!("Outbox cache hit for {} identities", identities.len());
            return entry.plan.clone();
        }

        let plan = Arc::new(self.compute(&key));
        *cache = Some(CacheEntry {
            key,
            plan: plan.clone(),
            computed_at: Instant::now(),
            generation,
        });
        plan
    }

    fn compute(&self, key: &CacheKey) -> RelayPlan {
        let mut base = Filter::new().limit(key.limit);
        if !key.kinds.is_empty() {
            base = base.kinds(key.kinds.iter().copied());
        }

        let mut covered = BTreeMap::new();
        let mut uncovered = Vec::new();
        for identity in &key.identities {
            let relays = self.index.preferred_write_relays(identity);
            if relays.is_empty() {
                uncovered.push(identity);
            } else {
                covered.insert(identity.clone(), relays);
            }
        }

        let mut plan = RelayPlan::default();

        let cover = select_relays(&covered, self.config.relays_per_identity);
        for (relay, authors) in cover {
            plan.push(relay, base.clone().authors(authors));
        }

        let mut hinted = 0;
        let mut remaining = BTreeSet::new();
        for identity in uncovered {
            let hints = self.index.hint_relays(identity);
            if hints.is_empty() {
                remaining.insert(identity.clone());
                continue;
            }
            hinted += 1;
            for relay in hints {
                plan.push(relay, base.clone().authors([identity.clone()]));
            }
        }

        if !remaining.is_empty() {
            for relay in &key.fallback {
                plan.push(relay.clone(), base.clone().authors(remaining.iter().cloned()));
            }
        }

        debug!(
            "Resolved outbox plan: {} covered, {} hinted, {} fallback across {} relays",
            covered.len(),
            hinted,
            remaining.len(),
            plan.len()
        );

        plan
    }

    /// Drop the cached plan so the next call recomputes
    pub fn invalidate_cache(&self) {
        *self.cache.lock() = None;
    }

    /// Check if a plan is currently cached (expired or not)
    pub fn has_cached_plan(&self) -> bool {
        self.cache.lock().is_some()
    }
}
