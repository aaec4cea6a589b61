//! Feed error types

use thiserror::Error;

/// Errors raised at the parsing edges of the crate.
///
/// Resolution and collection operations never fail; only turning untrusted
/// strings and events into typed values does.
#[derive(Error, Debug)]
pub enum FeedError {
    /// Relay URL could not be canonicalized
    #[error("Invalid relay URL: {0}")]
    InvalidRelayUrl(String),

    /// Relay URL uses something other than ws:// or wss://
    #[error("Unsupported relay scheme: {0}")]
    UnsupportedScheme(String),

    /// Public key is not 32 bytes of hex
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Event has the wrong kind for the requested parse
    #[error("Invalid event kind: expected {expected}, got {found}")]
    InvalidKind { expected: u16, found: u16 },

    /// Malformed tag
    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parse error
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Feed result type
pub type Result<T> = std::result::Result<T, FeedError>;
