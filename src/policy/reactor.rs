//! Membership side effects of join and leave requests

use crate::broadcast::{Audience, Broadcaster};
use crate::groups::GroupProjector;
use crate::nostr::{kinds, now, Event, EventTemplate, RelaySigner, SignError};
use crate::storage::{EventStore, StorageError};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Failure while writing a relay-authored event
#[derive(Debug, Error)]
pub enum DeriveError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Sign(#[from] SignError),
}

/// Turns accepted join/leave requests into relay-signed put-user and
/// remove-user events. Derived events go straight to the store, never back
/// through the gate.
pub struct MembershipReactor {
    signer: RelaySigner,
    events: Arc<dyn EventStore>,
    groups: Arc<GroupProjector>,
    broadcaster: Option<Arc<dyn Broadcaster>>,
    signed_for: Option<HashSet<String>>,
}

impl MembershipReactor {
    pub fn new(
        signer: RelaySigner,
        events: Arc<dyn EventStore>,
        groups: Arc<GroupProjector>,
        broadcaster: Option<Arc<dyn Broadcaster>>,
    ) -> Self {
        Self {
            signer,
            events,
            groups,
            broadcaster,
            signed_for: None,
        }
    }

    /// Blank signatures of broadcast events for everyone but these pubkeys
    pub fn with_signatures_for(mut self, pubkeys: impl IntoIterator<Item = String>) -> Self {
        self.signed_for = Some(pubkeys.into_iter().collect());
        self
    }

    /// Add the requester to the request's group
    pub async fn put_user(&self, request: &Event) -> Option<Event> {
        self.react(kinds::GROUP_PUT_USER, request).await
    }

    /// Remove the requester from the request's group
    pub async fn remove_user(&self, request: &Event) -> Option<Event> {
        self.react(kinds::GROUP_REMOVE_USER, request).await
    }

    async fn react(&self, kind: u16, request: &Event) -> Option<Event> {
        let Some(group) = request.group_id() else {
            warn!(event = %request, "Membership request without group id");
            return None;
        };

        match self.derive(kind, group, &request.pubkey).await {
            Ok(event) => {
                info!(group = %group, pubkey = %request.pubkey, kind, "Membership changed");
                if let Some(broadcaster) = &self.broadcaster {
                    match self.audience(group).await {
                        Ok(audience) => {
                            broadcaster.broadcast(&event, &audience);
                        }
                        Err(e) => error!(group = %group, error = %e, "Failed to resolve broadcast audience"),
                    }
                }
                Some(event)
            }
            Err(e) => {
                error!(group = %group, pubkey = %request.pubkey, error = %e, "Failed to derive membership event");
                None
            }
        }
    }

    /// Private groups are announced to their members only
    async fn audience(&self, group: &str) -> Result<Audience, StorageError> {
        let readers = match self.groups.project(group).await? {
            Some(g) if g.private => Some(self.groups.members(group).await?.into_iter().collect()),
            _ => None,
        };

        Ok(Audience {
            readers,
            signed_for: self.signed_for.clone(),
        })
    }

    async fn derive(&self, kind: u16, group: &str, pubkey: &str) -> Result<Event, DeriveError> {
        // Strictly after the newest membership event so the fold stays ordered
        let created_at = match self.groups.latest_membership_event(group, pubkey).await? {
            Some(latest) => now().max(latest.created_at.saturating_add(1)),
            None => now(),
        };

        let event = self.signer.sign(
            EventTemplate::new(kind)
                .created_at(created_at)
                .tag(["p", pubkey])
                .tag(["h", group]),
        )?;

        self.events.save(&event).await?;
        Ok(event)
    }
}
