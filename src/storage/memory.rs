//! In-memory stores

use crate::nostr::{Event, Filter};
use crate::storage::{async_trait, flat_key, EventStore, KvStore, StorageError};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Key/value store backed by an ordered map
#[derive(Default)]
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries across all tables
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn put(&self, table: &str, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.entries.write().insert(flat_key(table, key), value.to_vec());
        Ok(())
    }

    async fn get(&self, table: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.read().get(&flat_key(table, key)).cloned())
    }

    async fn delete(&self, table: &str, key: &str) -> Result<(), StorageError> {
        self.entries.write().remove(&flat_key(table, key));
        Ok(())
    }

    async fn list(&self, table: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let prefix = flat_key(table, "");
        let entries = self.entries.read();

        Ok(entries
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k[prefix.len()..].to_string(), v.clone()))
            .collect())
    }

    async fn take(&self, table: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.write().remove(&flat_key(table, key)))
    }

    async fn insert_new(&self, table: &str, key: &str, value: &[u8]) -> Result<bool, StorageError> {
        let mut entries = self.entries.write();
        let key = flat_key(table, key);

        if entries.contains_key(&key) {
            return Ok(false);
        }

        entries.insert(key, value.to_vec());
        Ok(true)
    }
}

/// Event log held in memory, keyed by event id
#[derive(Default)]
pub struct MemoryEventStore {
    events: RwLock<HashMap<String, Event>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.events.read().contains_key(id)
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn save(&self, event: &Event) -> Result<(), StorageError> {
        self.events.write().insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn delete(&self, event: &Event) -> Result<(), StorageError> {
        self.events.write().remove(&event.id);
        Ok(())
    }

    async fn query(&self, filter: &Filter) -> Result<BoxStream<'static, Event>, StorageError> {
        let mut matched: Vec<Event> = self
            .events
            .read()
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();

        // Newest first, so limits keep the most recent events
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }

        Ok(stream::iter(matched).boxed())
    }
}
