//! Integration tests for live feed collections fed by many relays

mod common;

use common::{init_tracing, note};
use nostr_feed::{CollectionConfig, Event, event_collection, event_window};
use pretty_assertions::assert_eq;
use std::time::Duration;

fn config(max_size: usize) -> CollectionConfig {
    CollectionConfig {
        max_size,
        coalesce_delay: None,
        label: "integration".to_string(),
    }
}

fn timestamps(items: &[Event]) -> Vec<u64> {
    items.iter().map(|e| e.created_at).collect()
}

#[tokio::test]
async fn test_flood_of_duplicates_counts_only_genuinely_new() {
    init_tracing();
    let feed = event_collection(config(500));

    let initial: Vec<Event> = (1001..=1050).map(|ts| note(ts, 1, ts)).collect();
    feed.add_batch(initial.clone());
    feed.settled().await;
    assert_eq!(feed.snapshot().head().unwrap().created_at, 1050);

    feed.set_holding(true);
    feed.add_batch(initial);
    feed.settled().await;
    assert_eq!(feed.pending_count(), 0);
    assert_eq!(feed.snapshot().len(), 50);

    feed.add(note(2000, 2, 2000));
    feed.settled().await;
    assert_eq!(feed.pending_count(), 1);
    assert_eq!(feed.snapshot().len(), 50);
}

#[tokio::test]
async fn test_stale_batch_merges_without_pending() {
    init_tracing();
    let feed = event_collection(config(500));

    feed.add_batch((1000..=1019).map(|ts| note(ts, 1, ts)).collect());
    feed.settled().await;
    assert_eq!(feed.snapshot().head().unwrap().created_at, 1019);

    feed.set_holding(true);
    feed.add_batch((500..600).map(|ts| note(ts, 2, ts)).collect());
    feed.settled().await;

    let snapshot = feed.snapshot();
    assert_eq!(snapshot.pending_count, 0);
    assert_eq!(snapshot.len(), 120);
    assert_eq!(snapshot.head().unwrap().created_at, 1019);
    assert_eq!(snapshot.items.last().unwrap().created_at, 500);
}

#[tokio::test]
async fn test_stale_batch_respects_bound() {
    let feed = event_collection(config(50));

    feed.add_batch((1000..=1019).map(|ts| note(ts, 1, ts)).collect());
    feed.set_holding(true);
    feed.add_batch((500..600).map(|ts| note(ts, 2, ts)).collect());
    feed.settled().await;

    let snapshot = feed.snapshot();
    assert_eq!(snapshot.pending_count, 0);
    assert_eq!(snapshot.len(), 50);
    assert_eq!(snapshot.items.last().unwrap().created_at, 570);
}

#[test]
fn test_trimmed_item_is_readmitted_not_pending() {
    let mut window = event_window(&config(3));
    for ts in [100, 200, 300, 400] {
        window.add(note(ts, 1, ts));
    }
    assert_eq!(timestamps(window.visible()), vec![400, 300, 200]);

    window.set_holding(true);
    let admission = window.add(note(100, 1, 100));

    assert_eq!(admission, nostr_feed::Admission::Visible);
    assert_eq!(window.pending_count(), 0);
    assert_eq!(timestamps(window.visible()), vec![400, 300, 200]);
}

#[tokio::test]
async fn test_release_reveals_held_items_in_order() {
    let feed = event_collection(config(500));
    feed.add(note(1, 1, 100));
    feed.set_holding(true);
    feed.add(note(3, 1, 300));
    feed.add(note(2, 1, 200));
    feed.add(note(0, 1, 50));
    feed.settled().await;
    assert_eq!(feed.pending_count(), 2);
    assert_eq!(timestamps(&feed.snapshot().items), vec![100, 50]);

    feed.set_holding(false);
    feed.settled().await;
    let snapshot = feed.snapshot();
    assert_eq!(snapshot.pending_count, 0);
    assert_eq!(timestamps(&snapshot.items), vec![300, 200, 100, 50]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_relays_delivering_overlapping_backlogs() {
    init_tracing();
    let feed = event_collection(config(200));

    // each relay holds an overlapping slice of the same 300 notes
    let handles: Vec<_> = (0..6u64)
        .map(|relay| {
            let feed = feed.clone();
            tokio::spawn(async move {
                let start = relay * 40;
                for n in start..start + 100 {
                    feed.add(note(n, (n % 5) as u8, 10_000 + n));
                    if n % 17 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }
    feed.settled().await;

    let snapshot = feed.snapshot();
    assert_eq!(snapshot.len(), 200);
    assert_eq!(snapshot.head().unwrap().created_at, 10_000 + 299);
    let ts = timestamps(&snapshot.items);
    assert!(ts.windows(2).all(|w| w[0] > w[1]));
}

#[tokio::test(start_paused = true)]
async fn test_coalesced_feed_keeps_invariants() {
    let feed = event_collection(CollectionConfig {
        max_size: 10,
        coalesce_delay: Some(Duration::from_millis(25)),
        label: "coalesced".to_string(),
    });
    let mut updates = feed.subscribe();

    for ts in 0..40 {
        feed.add(note(ts, 1, ts));
    }
    feed.settled().await;

    updates.changed().await.unwrap();
    let snapshot = updates.borrow_and_update().clone();
    assert_eq!(snapshot.len(), 10);
    assert_eq!(snapshot.head().unwrap().created_at, 39);
}

#[tokio::test]
async fn test_clear_then_reuse() {
    let feed = event_collection(config(10));
    feed.add(note(1, 1, 1));
    feed.set_holding(true);
    feed.add(note(2, 1, 2));
    feed.clear();
    feed.add(note(1, 1, 1));
    feed.settled().await;

    let snapshot = feed.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.pending_count, 0);
    assert!(!snapshot.holding);
}
