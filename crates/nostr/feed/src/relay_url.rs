//! Relay URL canonicalization.
//!
//! Two spellings of the same relay must compare equal, so every relay address
//! entering the crate goes through [`RelayUrl::parse`]:
//!
//! - Only `ws://` and `wss://` are accepted
//! - Scheme and host are lowercased
//! - Default ports (80 for ws, 443 for wss) are dropped
//! - User info, query string and fragment are discarded
//! - Trailing slashes are removed from the path
//!
//! Anything that fails these rules yields an error, which the resolver treats
//! as "no address" and silently skips.

use crate::error::{FeedError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// A canonical relay address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelayUrl(String);

impl RelayUrl {
    /// Parse and canonicalize a relay URL.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(FeedError::InvalidRelayUrl("empty".to_string()));
        }

        let url = Url::parse(input)?;

        let scheme = url.scheme();
        if scheme != "ws" && scheme != "wss" {
            return Err(FeedError::UnsupportedScheme(scheme.to_string()));
        }

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host,
            _ => return Err(FeedError::InvalidRelayUrl(format!("{input}: missing host"))),
        };

        let mut canonical = format!("{scheme}://{host}");
        if let Some(port) = url.port() {
            canonical.push(':');
            canonical.push_str(&port.to_string());
        }
        canonical.push_str(url.path().trim_end_matches('/'));

        Ok(Self(canonical))
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RelayUrl {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RelayUrl {
    type Error = FeedError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<RelayUrl> for String {
    fn from(url: RelayUrl) -> Self {
        url.0
    }
}

impl AsRef<str> for RelayUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonicalize every parseable URL, dropping the rest.
pub(crate) fn parse_all<'a, I>(urls: I) -> Vec<RelayUrl>
where
    I: IntoIterator<Item = &'a str>,
{
    urls.into_iter()
        .filter_map(|raw| match RelayUrl::parse(raw) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::trace!("Dropping relay url {:?}: {}", raw, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon(input: &str) -> String {
        RelayUrl::parse(input).unwrap().to_string()
    }

    #[test]
    fn test_trailing_slash_and_case() {
        assert_eq!(canon("wss://Relay.Example.COM/"), "wss://relay.example.com");
        assert_eq!(canon("WSS://relay.example.com"), "wss://relay.example.com");
        assert_eq!(canon("wss://relay.example.com///"), "wss://relay.example.com");
    }

    #[test]
    fn test_spellings_compare_equal() {
        let a = RelayUrl::parse("wss://nos.lol").unwrap();
        let b = RelayUrl::parse("  wss://NOS.lol/  ").unwrap();
        let c = RelayUrl::parse("wss://nos.lol:443").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_ports_and_paths() {
        assert_eq!(canon("ws://relay.example.com:80/"), "ws://relay.example.com");
        assert_eq!(canon("wss://relay.example.com:7777"), "wss://relay.example.com:7777");
        assert_eq!(canon("wss://relay.example.com/inbox/"), "wss://relay.example.com/inbox");
        assert_eq!(canon("wss://relay.example.com/Inbox"), "wss://relay.example.com/Inbox");
    }

    #[test]
    fn test_query_and_fragment_dropped() {
        assert_eq!(canon("wss://relay.example.com/?x=1#top"), "wss://relay.example.com");
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(matches!(
            RelayUrl::parse("https://relay.example.com"),
            Err(FeedError::UnsupportedScheme(_))
        ));
        assert!(RelayUrl::parse("").is_err());
        assert!(RelayUrl::parse("relay.example.com").is_err());
        assert!(RelayUrl::parse("wss://").is_err());
        assert!(RelayUrl::parse("wss://bad host").is_err());
    }

    #[test]
    fn test_parse_all_skips_invalid() {
        let parsed = parse_all(["wss://a.com", "nonsense", "https://b.com", "ws://c.com/"]);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].as_str(), "ws://c.com");
    }

    #[test]
    fn test_serde_round_trip_is_canonical() {
        let url: RelayUrl = serde_json::from_str("\"wss://A.com/\"").unwrap();
        assert_eq!(serde_json::to_string(&url).unwrap(), "\"wss://a.com\"");
    }
}
