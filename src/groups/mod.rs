//! NIP-29 groups derived from the event log
//!
//! Nothing about a group is stored directly. Its existence and metadata are a
//! fold over create-group / edit-metadata / delete-group events tagged with
//! the group id, and membership is a fold over put-user / remove-user events.
//! The projector keeps an in-memory cache of folded groups which is dropped
//! whenever a lifecycle event for that group is saved.

use crate::nostr::{kinds, Event, EventTemplate, Filter};
use crate::storage::{query_all, EventStore, StorageError};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A group as folded from its lifecycle events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub about: String,
    pub picture: String,
    pub private: bool,
    pub closed: bool,
    pub last_metadata_update: u64,
}

impl Group {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            about: String::new(),
            picture: String::new(),
            private: false,
            closed: false,
            last_metadata_update: 0,
        }
    }

    /// Overlay the metadata carried by an edit-metadata event.
    /// `private` and `closed` can be switched on but never off.
    fn apply_edit(&mut self, event: &Event) {
        if let Some(name) = event.tag_value("name") {
            self.name = name.to_string();
        }
        if let Some(about) = event.tag_value("about") {
            self.about = about.to_string();
        }
        if let Some(picture) = event.tag_value("picture") {
            self.picture = picture.to_string();
        }

        self.private |= event.has_tag("private");
        self.closed |= event.has_tag("closed");
        self.last_metadata_update = event.created_at;
    }

    /// Unsigned kind 39000 metadata event
    pub fn to_metadata(&self) -> EventTemplate {
        let mut template = EventTemplate::new(kinds::GROUP_METADATA)
            .created_at(self.last_metadata_update)
            .tag(["d", self.id.as_str()])
            .tag(["name", self.name.as_str()]);

        if !self.about.is_empty() {
            template = template.tag(["about", self.about.as_str()]);
        }
        if !self.picture.is_empty() {
            template = template.tag(["picture", self.picture.as_str()]);
        }

        template
            .tag([if self.private { "private" } else { "public" }])
            .tag([if self.closed { "closed" } else { "open" }])
    }

    /// Unsigned kind 39001 admins event; relay admins administer every group
    pub fn to_admins(&self, admins: &[String]) -> EventTemplate {
        admins.iter().fold(
            EventTemplate::new(kinds::GROUP_ADMINS)
                .created_at(self.last_metadata_update)
                .tag(["d", self.id.as_str()]),
            |template, admin| template.tag(["p", admin.as_str(), "admin"]),
        )
    }
}

/// Same-second ordering: create before edit before delete
fn lifecycle_rank(kind: u16) -> u8 {
    match kind {
        kinds::GROUP_CREATE_GROUP => 0,
        kinds::GROUP_EDIT_METADATA => 1,
        _ => 2,
    }
}

/// Fold lifecycle events for one group id
fn fold_lifecycle(id: &str, mut events: Vec<&Event>) -> Option<Group> {
    events.sort_by(|a, b| {
        (a.created_at, lifecycle_rank(a.kind), &a.id).cmp(&(b.created_at, lifecycle_rank(b.kind), &b.id))
    });

    let mut group: Option<Group> = None;
    for event in events {
        match event.kind {
            kinds::GROUP_CREATE_GROUP => {
                if group.is_none() {
                    group = Some(Group::new(id));
                }
            }
            kinds::GROUP_EDIT_METADATA => {
                if let Some(group) = group.as_mut() {
                    group.apply_edit(event);
                }
            }
            kinds::GROUP_DELETE_GROUP => group = None,
            _ => {}
        }
    }

    group
}

/// Latest membership event wins, ties broken by id
/// Newest membership event; removal wins a same-second tie with a put
fn latest_membership<'a>(events: impl IntoIterator<Item = &'a Event>) -> Option<&'a Event> {
    let removal = |e: &Event| e.kind == kinds::GROUP_REMOVE_USER;
    events
        .into_iter()
        .max_by(|a, b| (a.created_at, removal(a), &a.id).cmp(&(b.created_at, removal(b), &b.id)))
}

/// Derives groups and memberships from the event store
pub struct GroupProjector {
    events: Arc<dyn EventStore>,
    cache: DashMap<String, Option<Group>>,
    generation: AtomicU64,
}

impl GroupProjector {
    pub fn new(events: Arc<dyn EventStore>) -> Self {
        Self {
            events,
            cache: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Current state of a group, `None` if it does not exist
    pub async fn project(&self, id: &str) -> Result<Option<Group>, StorageError> {
        if let Some(cached) = self.cache.get(id) {
            return Ok(cached.clone());
        }

        let generation = self.generation.load(Ordering::Acquire);

        let filter = Filter::new()
            .kinds(kinds::GROUP_LIFECYCLE)
            .tag('h', [id]);
        let events = query_all(self.events.as_ref(), &filter).await?;
        let group = fold_lifecycle(id, events.iter().collect());

        // An invalidation that raced with the fold wins; drop what we cached
        self.cache.insert(id.to_string(), group.clone());
        if self.generation.load(Ordering::Acquire) != generation {
            self.cache.remove(id);
        }

        Ok(group)
    }

    /// Every existing group, sorted by id
    pub async fn list_groups(&self) -> Result<Vec<Group>, StorageError> {
        let filter = Filter::new().kinds(kinds::GROUP_LIFECYCLE);
        let events = query_all(self.events.as_ref(), &filter).await?;

        let mut by_group: BTreeMap<&str, Vec<&Event>> = BTreeMap::new();
        for event in &events {
            match event.group_id() {
                Some(id) => by_group.entry(id).or_default().push(event),
                None => warn!(event = %event, "Lifecycle event without group id"),
            }
        }

        Ok(by_group
            .into_iter()
            .filter_map(|(id, events)| fold_lifecycle(id, events))
            .collect())
    }

    pub async fn is_member(&self, id: &str, pubkey: &str) -> Result<bool, StorageError> {
        if pubkey.is_empty() {
            return Ok(false);
        }

        Ok(self
            .latest_membership_event(id, pubkey)
            .await?
            .is_some_and(|event| event.kind == kinds::GROUP_PUT_USER))
    }

    /// Newest put-user / remove-user event for `(group, pubkey)`
    pub async fn latest_membership_event(
        &self,
        id: &str,
        pubkey: &str,
    ) -> Result<Option<Event>, StorageError> {
        let filter = Filter::new()
            .kinds(kinds::GROUP_MEMBERSHIP)
            .tag('h', [id])
            .tag('p', [pubkey]);
        let events = query_all(self.events.as_ref(), &filter).await?;

        Ok(latest_membership(&events).cloned())
    }

    /// Current members of a group, sorted
    pub async fn members(&self, id: &str) -> Result<Vec<String>, StorageError> {
        let filter = Filter::new()
            .kinds(kinds::GROUP_MEMBERSHIP)
            .tag('h', [id]);
        let events = query_all(self.events.as_ref(), &filter).await?;

        let mut by_pubkey: HashMap<&str, Vec<&Event>> = HashMap::new();
        for event in &events {
            for pubkey in event.tag_values("p") {
                by_pubkey.entry(pubkey).or_default().push(event);
            }
        }

        let mut members: Vec<String> = by_pubkey
            .into_iter()
            .filter(|(_, events)| {
                latest_membership(events.iter().copied())
                    .is_some_and(|event| event.kind == kinds::GROUP_PUT_USER)
            })
            .map(|(pubkey, _)| pubkey.to_string())
            .collect();

        members.sort();
        Ok(members)
    }

    /// Keep the projection consistent with a newly saved event. Deleting a
    /// group also deletes every stored event scoped to it.
    pub async fn apply_saved(&self, event: &Event) {
        if !kinds::is_group_lifecycle(event.kind) {
            return;
        }

        let Some(id) = event.group_id() else {
            warn!(event = %event, "Lifecycle event without group id");
            return;
        };

        self.invalidate(id);

        match event.kind {
            kinds::GROUP_CREATE_GROUP => info!(group = %id, "Group created"),
            kinds::GROUP_EDIT_METADATA => debug!(group = %id, "Group metadata edited"),
            _ => {
                info!(group = %id, "Group deleted");
                if let Err(e) = self.purge(id).await {
                    error!(group = %id, error = %e, "Failed to purge deleted group");
                }
                // Projections taken mid-purge may have cached a half-deleted log
                self.invalidate(id);
            }
        }
    }

    /// Drop the cached projection of a group
    pub fn invalidate(&self, id: &str) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.cache.remove(id);
    }

    /// Delete every event scoped to a group. Delete-group events go last so
    /// a partial purge never leaves a create without its tombstone.
    async fn purge(&self, id: &str) -> Result<(), StorageError> {
        let mut scoped: BTreeMap<String, Event> = BTreeMap::new();
        for tag in ['h', 'd'] {
            let filter = Filter::new().tag(tag, [id]);
            for event in query_all(self.events.as_ref(), &filter).await? {
                scoped.insert(event.id.clone(), event);
            }
        }

        let (tombstones, rest): (Vec<Event>, Vec<Event>) = scoped
            .into_values()
            .partition(|event| event.kind == kinds::GROUP_DELETE_GROUP);

        let mut purged = 0;
        for event in rest.iter().chain(&tombstones) {
            self.events.delete(event).await?;
            purged += 1;
        }

        debug!(group = %id, purged, "Purged group events");
        Ok(())
    }
}
