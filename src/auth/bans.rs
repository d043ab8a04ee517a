//! Admin ban lists for pubkeys and events

use crate::nostr::Filter;
use crate::storage::{query_all, tables, EventStore, KvStore, StorageError};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Which ban list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BanKind {
    PubKey,
    Event,
}

impl BanKind {
    fn table(self) -> &'static str {
        match self {
            BanKind::PubKey => tables::BANNED_PUBKEY,
            BanKind::Event => tables::BANNED_EVENT,
        }
    }
}

impl fmt::Display for BanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BanKind::PubKey => write!(f, "pubkey"),
            BanKind::Event => write!(f, "event"),
        }
    }
}

/// Something that can be banned
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BanSubject {
    PubKey(String),
    Event(String),
}

impl BanSubject {
    pub fn kind(&self) -> BanKind {
        match self {
            BanSubject::PubKey(_) => BanKind::PubKey,
            BanSubject::Event(_) => BanKind::Event,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            BanSubject::PubKey(k) | BanSubject::Event(k) => k,
        }
    }
}

impl fmt::Display for BanSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.key())
    }
}

/// A listed ban
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BanEntry {
    pub kind: BanKind,
    pub subject: String,
    pub reason: String,
}

pub struct BanRegistry {
    kv: Arc<dyn KvStore>,
    events: Arc<dyn EventStore>,
}

impl BanRegistry {
    pub fn new(kv: Arc<dyn KvStore>, events: Arc<dyn EventStore>) -> Self {
        Self { kv, events }
    }

    /// Ban a subject. Banning an event also deletes it from the log;
    /// banning a pubkey leaves its earlier events in place.
    pub async fn ban(&self, subject: &BanSubject, reason: &str) -> Result<(), StorageError> {
        self.kv
            .put(subject.kind().table(), subject.key(), reason.as_bytes())
            .await?;

        if let BanSubject::Event(id) = subject {
            let stored = query_all(self.events.as_ref(), &Filter::new().ids([id.clone()])).await?;
            for event in &stored {
                self.events.delete(event).await?;
            }
        }

        info!(subject = %subject, reason = %reason, "Banned");
        Ok(())
    }

    pub async fn unban(&self, subject: &BanSubject) -> Result<(), StorageError> {
        self.kv.delete(subject.kind().table(), subject.key()).await?;

        info!(subject = %subject, "Unbanned");
        Ok(())
    }

    pub async fn list(&self, kind: BanKind) -> Result<Vec<BanEntry>, StorageError> {
        let entries = self.kv.list(kind.table()).await?;

        Ok(entries
            .into_iter()
            .map(|(subject, reason)| BanEntry {
                kind,
                subject,
                reason: String::from_utf8_lossy(&reason).into_owned(),
            })
            .collect())
    }

    pub async fn is_banned(&self, subject: &BanSubject) -> Result<bool, StorageError> {
        if subject.key().is_empty() {
            return Ok(false);
        }

        Ok(self
            .kv
            .get(subject.kind().table(), subject.key())
            .await?
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nostr::Event;
    use crate::storage::{MemoryEventStore, MemoryKvStore};

    fn event(id: &str, pubkey: &str) -> Event {
        Event {
            id: id.to_string(),
            pubkey: pubkey.to_string(),
            created_at: 1,
            kind: 1,
            tags: vec![],
            content: "hi".to_string(),
            sig: String::new(),
        }
    }

    fn registry() -> (BanRegistry, Arc<MemoryEventStore>) {
        let events = Arc::new(MemoryEventStore::new());
        (
            BanRegistry::new(Arc::new(MemoryKvStore::new()), events.clone()),
            events,
        )
    }

    #[tokio::test]
    async fn test_ban_and_unban_pubkey() {
        let (bans, events) = registry();
        events.save(&event("e1", "mallory")).await.unwrap();

        let subject = BanSubject::PubKey("mallory".to_string());
        bans.ban(&subject, "spam").await.unwrap();

        assert!(bans.is_banned(&subject).await.unwrap());
        assert!(events.contains("e1"));

        bans.unban(&subject).await.unwrap();
        assert!(!bans.is_banned(&subject).await.unwrap());
    }

    #[tokio::test]
    async fn test_ban_event_deletes_it() {
        let (bans, events) = registry();
        events.save(&event("e1", "alice")).await.unwrap();
        events.save(&event("e2", "alice")).await.unwrap();

        bans.ban(&BanSubject::Event("e1".to_string()), "").await.unwrap();

        assert!(!events.contains("e1"));
        assert!(events.contains("e2"));
        assert!(bans
            .is_banned(&BanSubject::Event("e1".to_string()))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_list_is_per_kind() {
        let (bans, _) = registry();
        bans.ban(&BanSubject::PubKey("a".to_string()), "spam").await.unwrap();
        bans.ban(&BanSubject::Event("x".to_string()), "illegal").await.unwrap();

        let pubkeys = bans.list(BanKind::PubKey).await.unwrap();
        assert_eq!(pubkeys.len(), 1);
        assert_eq!(pubkeys[0].subject, "a");
        assert_eq!(pubkeys[0].reason, "spam");

        let events = bans.list(BanKind::Event).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, BanKind::Event);
    }

    #[tokio::test]
    async fn test_empty_subject_is_never_banned() {
        let (bans, _) = registry();
        assert!(!bans
            .is_banned(&BanSubject::PubKey(String::new()))
            .await
            .unwrap());
    }
}
