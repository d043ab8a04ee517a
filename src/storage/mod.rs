//! Storage collaborators for frith
//!
//! - Key/value store: claims, invites and ban lists, keyed `table:key`
//! - Event store: the append-only event log, source of truth for groups
//!
//! Both have an in-memory backend (tests, embedding) and a Postgres backend.

mod memory;
mod postgres;

pub use memory::{MemoryEventStore, MemoryKvStore};
pub use postgres::{PostgresConfig, PostgresStore};

use crate::nostr::{Event, Filter};
pub use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use thiserror::Error;

/// Table prefixes in the key/value store
pub mod tables {
    pub const CLAIM: &str = "claim";
    pub const INVITE: &str = "invite";
    pub const BANNED_PUBKEY: &str = "bannedpubkey";
    pub const BANNED_EVENT: &str = "bannedevent";
}

/// Storage errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Durable `(table, key) -> bytes` mapping
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn put(&self, table: &str, key: &str, value: &[u8]) -> Result<(), StorageError>;

    async fn get(&self, table: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    async fn delete(&self, table: &str, key: &str) -> Result<(), StorageError>;

    /// All entries of a table, keys without the table prefix
    async fn list(&self, table: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError>;

    /// Atomically read and delete an entry
    async fn take(&self, table: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Insert only if the key is free; returns whether the insert happened
    async fn insert_new(&self, table: &str, key: &str, value: &[u8]) -> Result<bool, StorageError>;
}

/// Append-only, queryable event log
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn save(&self, event: &Event) -> Result<(), StorageError>;

    async fn delete(&self, event: &Event) -> Result<(), StorageError>;

    /// Matching events, in no particular order
    async fn query(&self, filter: &Filter) -> Result<BoxStream<'static, Event>, StorageError>;
}

/// Collect a query into memory (for folds that need every event anyway)
pub async fn query_all(store: &dyn EventStore, filter: &Filter) -> Result<Vec<Event>, StorageError> {
    Ok(store.query(filter).await?.collect().await)
}

/// Build the flat key used by backends that have a single keyspace
pub(crate) fn flat_key(table: &str, key: &str) -> String {
    format!("{}:{}", table, key)
}

/// Read a string value, treating invalid utf-8 as a serialization error
pub async fn get_string(kv: &dyn KvStore, table: &str, key: &str) -> Result<Option<String>, StorageError> {
    match kv.get(table, key).await? {
        Some(bytes) => String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| StorageError::Serialization(e.to_string())),
        None => Ok(None),
    }
}
