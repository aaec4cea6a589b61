//! Shared helpers for nostr-feed integration tests

#![allow(dead_code)]

use nostr_feed::{Event, KIND_RELAY_LIST_METADATA, KIND_SHORT_TEXT_NOTE, PublicKey, RelayUrl};
use std::sync::Once;

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A deterministic public key made of one repeated byte
pub fn pubkey(byte: u8) -> PublicKey {
    PublicKey::parse(&hex::encode([byte; 32])).unwrap()
}

pub fn relay(url: &str) -> RelayUrl {
    RelayUrl::parse(url).unwrap()
}

/// A text note with an id derived from `n`
pub fn note(n: u64, author: u8, created_at: u64) -> Event {
    Event {
        id: format!("{n:064x}"),
        pubkey: pubkey(author).to_string(),
        created_at,
        kind: KIND_SHORT_TEXT_NOTE,
        tags: vec![],
        content: format!("note {n}"),
        sig: "0".repeat(128),
    }
}

/// A NIP-65 relay list; `(url, marker)` pairs, marker "" for read/write
pub fn relay_list(author: u8, created_at: u64, relays: &[(&str, &str)]) -> Event {
    let tags = relays
        .iter()
        .map(|(url, marker)| {
            let mut tag = vec!["r".to_string(), url.to_string()];
            if !marker.is_empty() {
                tag.push(marker.to_string());
            }
            tag
        })
        .collect();
    Event {
        id: format!("{:064x}", (u64::from(author) << 32) | created_at),
        pubkey: pubkey(author).to_string(),
        created_at,
        kind: KIND_RELAY_LIST_METADATA,
        tags,
        content: String::new(),
        sig: "0".repeat(128),
    }
}
