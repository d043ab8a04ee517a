//! Live fan-out of relay-authored events
//!
//! The relay writes some events itself (membership changes derived from join
//! and leave requests). Those bypass the inbound path, so subscribers hear
//! about them through a [`Broadcaster`].

mod router;
mod subscribers;

pub use router::EventRouter;
pub use subscribers::{Subscriber, SubscriberRegistry};

use crate::nostr::Event;
use std::collections::HashSet;

/// Who may receive a broadcast event, and who gets it with its signature
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Audience {
    /// Only these pubkeys may receive the event; `None` admits everyone
    pub readers: Option<HashSet<String>>,
    /// Everyone else gets a blanked signature; `None` keeps it for all
    pub signed_for: Option<HashSet<String>>,
}

impl Audience {
    pub fn everyone() -> Self {
        Self::default()
    }

    pub fn admits(&self, pubkey: Option<&str>) -> bool {
        match (&self.readers, pubkey) {
            (None, _) => true,
            (Some(readers), Some(pubkey)) => readers.contains(pubkey),
            (Some(_), None) => false,
        }
    }

    pub fn keeps_signature(&self, pubkey: Option<&str>) -> bool {
        match (&self.signed_for, pubkey) {
            (None, _) => true,
            (Some(signed), Some(pubkey)) => signed.contains(pubkey),
            (Some(_), None) => false,
        }
    }
}

/// Announces an event to live subscribers
pub trait Broadcaster: Send + Sync {
    /// Returns the number of subscribers the event was handed to
    fn broadcast(&self, event: &Event, audience: &Audience) -> usize;
}
