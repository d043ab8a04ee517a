//! Nostr events and filters
//!
//! Events are the atomic unit of the log: `id`, `pubkey`, `created_at`,
//! `kind`, `tags`, `content`, `sig`. Tags are arrays of strings whose first
//! element is the tag name:
//! - `["h", "<group id>"]` scopes an event to a group
//! - `["p", "<pubkey>"]` references a user
//! - `["claim", "<code>"]` carries an invite code or static claim
//!
//! Signature verification of inbound events happens before events reach
//! this crate. The relay only ever signs the events it authors itself.

mod filter;
mod keys;
pub mod kinds;

pub use filter::Filter;
pub use keys::{RelaySigner, SignError};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in seconds
pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// A signed nostr event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Lowercase hex sha256 of the serialized event
    pub id: String,
    /// Lowercase hex x-only public key of the author
    pub pubkey: String,
    /// Unix timestamp in seconds
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    /// Lowercase hex schnorr signature
    pub sig: String,
}

impl Event {
    /// First tag with the given name that carries a value
    pub fn tag(&self, name: &str) -> Option<&[String]> {
        self.tags
            .iter()
            .find(|t| t.len() >= 2 && t[0] == name)
            .map(|t| t.as_slice())
    }

    /// Value of the first tag with the given name
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tag(name).map(|t| t[1].as_str())
    }

    /// Whether any tag with the given name is present, with or without a value
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.first().map(String::as_str) == Some(name))
    }

    /// All values of tags with the given name
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |t| t.len() >= 2 && t[0] == name)
            .map(|t| t[1].as_str())
    }

    /// The group this event is scoped to (`h` tag). Empty ids count as absent.
    pub fn group_id(&self) -> Option<&str> {
        self.tag_value("h").filter(|h| !h.is_empty())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Unsigned event content; the relay fills in pubkey, id and sig when signing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTemplate {
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

impl EventTemplate {
    pub fn new(kind: u16) -> Self {
        Self {
            created_at: now(),
            kind,
            tags: Vec::new(),
            content: String::new(),
        }
    }

    pub fn created_at(mut self, created_at: u64) -> Self {
        self.created_at = created_at;
        self
    }

    /// Append a tag built from the given parts
    pub fn tag<I, S>(mut self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.push(parts.into_iter().map(Into::into).collect());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }
}
