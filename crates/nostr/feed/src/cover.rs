//! Reliable relay set selection.
//!
//! Greedy set cover: repeatedly pick the relay that reaches the most identities
//! still needing coverage, assign those identities to it, and retire it. Ties
//! go to the lowest relay URL so the result is reproducible. The cover is not
//! guaranteed minimal.

use crate::event::PublicKey;
use crate::relay_url::RelayUrl;
use std::collections::{BTreeMap, BTreeSet};

/// Choose relays covering every identity in `candidates`.
///
/// Each identity is assigned to `min(per_identity, |its candidates|)` distinct
/// relays (`per_identity` is at least 1). Identities with no candidates are
/// ignored. Returns the chosen relays with the identities assigned to each.
pub fn select_relays(
    candidates: &BTreeMap<PublicKey, BTreeSet<RelayUrl>>,
    per_identity: usize,
) -> BTreeMap<RelayUrl, BTreeSet<PublicKey>> {
    let per_identity = per_identity.max(1);

    let mut need: BTreeMap<&PublicKey, usize> = candidates
        .iter()
        .filter(|(_, relays)| !relays.is_empty())
        .map(|(identity, relays)| (identity, per_identity.min(relays.len())))
        .collect();

    // relay -> identities listing it
    let mut reach: BTreeMap<&RelayUrl, Vec<&PublicKey>> = BTreeMap::new();
    for (identity, relays) in candidates {
        for relay in relays {
            reach.entry(relay).or_default().push(identity);
        }
    }

    let mut chosen: BTreeMap<RelayUrl, BTreeSet<PublicKey>> = BTreeMap::new();

    while need.values().any(|n| *n > 0) {
        let mut best: Option<(&RelayUrl, usize)> = None;
        for (relay, identities) in &reach {
            let score = identities
                .iter()
                .filter(|identity| need.get(*identity).is_some_and(|n| *n > 0))
                .count();
            if score > best.map_or(0, |(_, s)| s) {
                best = Some((*relay, score));
            }
        }

        let Some((relay, _)) = best else {
            break;
        };
        let Some(identities) = reach.remove(&relay) else {
            break;
        };

        let assigned = chosen.entry(relay.clone()).or_default();
        for identity in identities {
            if let Some(n) = need.get_mut(identity)
                && *n > 0
            {
                *n -= 1;
                assigned.insert(identity.clone());
            }
        }
    }

    chosen
}
