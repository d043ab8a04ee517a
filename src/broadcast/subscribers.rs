//! Live subscriber state

use crate::nostr::{Event, Filter};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A live subscriber and the filters it listens with
pub struct Subscriber {
    /// Unique subscriber ID
    pub id: Uuid,
    /// Authenticated pubkey, if any
    pub pubkey: Option<String>,
    /// Active filters; an event is delivered if any of them matches
    pub filters: RwLock<Vec<Filter>>,
    /// Channel for sending events to this subscriber
    pub tx: mpsc::Sender<Event>,
}

impl Subscriber {
    pub fn new(pubkey: Option<String>, tx: mpsc::Sender<Event>) -> Self {
        Self {
            id: Uuid::new_v4(),
            pubkey,
            filters: RwLock::new(Vec::new()),
            tx,
        }
    }

    pub fn subscribe(&self, filter: Filter) {
        self.filters.write().push(filter);
    }

    pub fn clear(&self) {
        self.filters.write().clear();
    }

    pub fn should_receive(&self, event: &Event) -> bool {
        self.filters.read().iter().any(|f| f.matches(event))
    }

    /// Hand an event over without waiting for buffer space
    pub fn try_send(&self, event: Event) -> Result<(), mpsc::error::TrySendError<Event>> {
        self.tx.try_send(event)
    }
}

/// All live subscribers
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    subscribers: Arc<DashMap<Uuid, Arc<Subscriber>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, subscriber: Arc<Subscriber>) {
        self.subscribers.insert(subscriber.id, subscriber);
    }

    pub fn remove(&self, id: Uuid) {
        self.subscribers.remove(&id);
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Subscriber>> {
        self.subscribers.get(&id).map(|r| r.clone())
    }

    /// Subscribers with at least one filter matching the event
    pub fn find_matching(&self, event: &Event) -> Vec<Arc<Subscriber>> {
        self.subscribers
            .iter()
            .filter(|entry| entry.value().should_receive(event))
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn find_by_pubkey(&self, pubkey: &str) -> Vec<Arc<Subscriber>> {
        self.subscribers
            .iter()
            .filter(|entry| entry.value().pubkey.as_deref() == Some(pubkey))
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.subscribers.len()
    }
}
