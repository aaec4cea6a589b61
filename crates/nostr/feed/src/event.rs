//! Event and identity types consumed by the feed core.
//!
//! Events arrive here already validated by the transport layer; this module
//! only models their shape (NIP-01) and the public-key identity used as the
//! routing key for the outbox model.

use crate::error::{FeedError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Short text note (NIP-01)
pub const KIND_SHORT_TEXT_NOTE: u16 = 1;

/// Contact list (NIP-02)
pub const KIND_CONTACT_LIST: u16 = 3;

/// Repost (NIP-18)
pub const KIND_REPOST: u16 = 6;

/// Reaction (NIP-25)
pub const KIND_REACTION: u16 = 7;

/// Relay list metadata (NIP-65)
pub const KIND_RELAY_LIST_METADATA: u16 = 10002;

/// A hex-encoded 32-byte public key identifying an author.
///
/// Always stored lowercase so that equality, hashing and ordering agree with
/// how relays compare authors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey(String);

impl PublicKey {
    /// Parse a hex public key, accepting either case.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(value, &mut bytes)
            .map_err(|e| FeedError::InvalidPublicKey(format!("{value}: {e}")))?;
        Ok(Self(hex::encode(bytes)))
    }

    /// The lowercase hex form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PublicKey {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PublicKey {
    type Error = FeedError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PublicKey> for String {
    fn from(key: PublicKey) -> Self {
        key.0
    }
}

/// A signed Nostr event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// 32-bytes lowercase hex-encoded sha256 of the serialized event data
    pub id: String,
    /// 32-bytes lowercase hex-encoded public key of the event creator
    pub pubkey: String,
    /// Unix timestamp in seconds
    pub created_at: u64,
    /// Event kind
    pub kind: u16,
    /// Array of arrays of strings (tags)
    pub tags: Vec<Vec<String>>,
    /// Arbitrary string content
    pub content: String,
    /// 64-bytes lowercase hex signature
    pub sig: String,
}

impl Event {
    /// Parse an event from its JSON object form.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The author as a typed identity, if the pubkey is well formed.
    pub fn author(&self) -> Option<PublicKey> {
        PublicKey::parse(&self.pubkey).ok()
    }

    /// Iterate the tags whose name is `name`.
    pub fn tags_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a [String]> + 'a {
        self.tags
            .iter()
            .filter(move |tag| tag.first().is_some_and(|n| n == name))
            .map(Vec::as_slice)
    }
}
