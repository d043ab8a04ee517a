//! Event and filter admission
//!
//! Every inbound filter passes [`PolicyGate::reject_filter`] before
//! [`PolicyGate::query`]; every inbound event passes
//! [`PolicyGate::reject_event`] before [`PolicyGate::save_event`], and once
//! saved is handed to [`PolicyGate::on_saved`] for side effects.
//!
//! Admission is a fixed, ordered table of rules (see [`EVENT_RULES`] and
//! [`FILTER_RULES`]). The first rule that rejects decides the outcome.

mod migrate;
mod reactor;
mod rules;

pub use migrate::MigrationReport;
pub use reactor::{DeriveError, MembershipReactor};
pub use rules::{EventRule, FilterRule, EVENT_RULES, FILTER_RULES};

use crate::auth::{
    AccessBackend, AccessController, AccessError, BackendAccessCache, BanRegistry, ClaimRegistry,
    HttpAccessBackend,
};
use crate::broadcast::Broadcaster;
use crate::config::RelayConfig;
use crate::groups::GroupProjector;
use crate::nostr::{kinds, Event, EventTemplate, Filter};
use crate::storage::{EventStore, KvStore, StorageError};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Why an event or filter was refused. `Display` renders the message sent
/// back to the client, prefixed per NIP-01.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("auth-required: {0}")]
    AuthRequired(&'static str),

    #[error("restricted: {0}")]
    Restricted(&'static str),

    #[error("invalid: {0}")]
    Invalid(&'static str),

    #[error("duplicate: {0}")]
    Duplicate(&'static str),

    #[error("blocked: {0}")]
    Blocked(&'static str),

    /// Details are logged where the failure happens, never sent to clients
    #[error("error: internal error")]
    Internal,
}

impl From<StorageError> for Rejection {
    fn from(e: StorageError) -> Self {
        error!(error = %e, "Storage failure during admission");
        Rejection::Internal
    }
}

/// Wires the policy components together
pub struct PolicyGateBuilder {
    config: RelayConfig,
    kv: Arc<dyn KvStore>,
    events: Arc<dyn EventStore>,
    broadcaster: Option<Arc<dyn Broadcaster>>,
    access_backend: Option<Arc<dyn AccessBackend>>,
}

impl PolicyGateBuilder {
    /// Announce relay-authored events to live subscribers
    pub fn broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    /// Use this backend instead of the HTTP one named in the config
    pub fn access_backend(mut self, backend: Arc<dyn AccessBackend>) -> Self {
        self.access_backend = Some(backend);
        self
    }

    pub fn build(self) -> Result<PolicyGate, AccessError> {
        let config = Arc::new(self.config);

        let backend = match (self.access_backend, &config.auth_backend) {
            (Some(backend), _) => Some(backend),
            (None, Some(url)) => Some(Arc::new(HttpAccessBackend::new(
                url.clone(),
                config.auth_backend_timeout,
            )?) as Arc<dyn AccessBackend>),
            (None, None) => None,
        };

        let claims = Arc::new(ClaimRegistry::new(self.kv.clone(), config.claims.clone()));
        let access = Arc::new(AccessController::new(
            config.admins.clone(),
            config.whitelist.clone(),
            claims.clone(),
            backend.map(BackendAccessCache::new),
        ));
        let bans = Arc::new(BanRegistry::new(self.kv.clone(), self.events.clone()));
        let groups = Arc::new(GroupProjector::new(self.events.clone()));
        let mut reactor = MembershipReactor::new(
            config.signer.clone(),
            self.events.clone(),
            groups.clone(),
            self.broadcaster,
        );
        if config.strip_signatures {
            reactor = reactor.with_signatures_for(config.admins.clone());
        }

        Ok(PolicyGate {
            config,
            access,
            claims,
            bans,
            groups,
            reactor,
            events: self.events,
        })
    }
}

/// The admission gate in front of the event log
pub struct PolicyGate {
    config: Arc<RelayConfig>,
    access: Arc<AccessController>,
    claims: Arc<ClaimRegistry>,
    bans: Arc<BanRegistry>,
    groups: Arc<GroupProjector>,
    reactor: MembershipReactor,
    events: Arc<dyn EventStore>,
}

impl PolicyGate {
    pub fn builder(
        config: RelayConfig,
        kv: Arc<dyn KvStore>,
        events: Arc<dyn EventStore>,
    ) -> PolicyGateBuilder {
        PolicyGateBuilder {
            config,
            kv,
            events,
            broadcaster: None,
            access_backend: None,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn access(&self) -> &Arc<AccessController> {
        &self.access
    }

    pub fn claims(&self) -> &Arc<ClaimRegistry> {
        &self.claims
    }

    pub fn bans(&self) -> &Arc<BanRegistry> {
        &self.bans
    }

    pub fn groups(&self) -> &Arc<GroupProjector> {
        &self.groups
    }

    pub async fn reject_filter(&self, caller: Option<&str>, filter: &Filter) -> Result<(), Rejection> {
        for rule in FILTER_RULES {
            if let Err(rejection) = self.check_filter_rule(rule, caller, filter).await {
                debug!(caller = ?caller, rule = ?rule, reason = %rejection, "Filter rejected");
                return Err(rejection);
            }
        }

        Ok(())
    }

    pub async fn reject_event(&self, caller: Option<&str>, event: &Event) -> Result<(), Rejection> {
        for rule in EVENT_RULES {
            if let Err(rejection) = self.check_event_rule(rule, caller, event).await {
                debug!(caller = ?caller, event = %event, rule = ?rule, reason = %rejection, "Event rejected");
                return Err(rejection);
            }
        }

        Ok(())
    }

    /// Relay-generated events first, then stored events the caller may see
    pub async fn query(
        &self,
        caller: Option<&str>,
        filter: &Filter,
    ) -> Result<BoxStream<'static, Event>, StorageError> {
        let strip = self.config.strip_signatures && !caller.is_some_and(|c| self.access.is_admin(c));
        let synthetic = self.synthetic_events(caller, filter).await;

        let groups = self.groups.clone();
        let reader = caller.map(String::from);

        let stored = self.events.query(filter).await?.filter_map(move |event| {
            let groups = groups.clone();
            let reader = reader.clone();
            async move { visible_to(&groups, reader.as_deref(), &event).await.then_some(event) }
        });

        Ok(stream::iter(synthetic)
            .chain(stored)
            .map(move |mut event| {
                if strip {
                    event.sig.clear();
                }
                event
            })
            .boxed())
    }

    pub async fn save_event(&self, event: &Event) -> Result<(), StorageError> {
        self.events.save(event).await
    }

    pub async fn delete_event(&self, event: &Event) -> Result<(), StorageError> {
        self.events.delete(event).await
    }

    /// Side effects of a saved event. Failures are logged and never undo
    /// the save.
    pub async fn on_saved(&self, event: &Event) {
        match event.kind {
            kinds::GROUP_JOIN_REQUEST if self.config.auto_join => {
                self.reactor.put_user(event).await;
            }
            kinds::GROUP_LEAVE_REQUEST if self.config.auto_leave => {
                self.reactor.remove_user(event).await;
            }
            _ => {}
        }

        self.groups.apply_saved(event).await;
    }

    /// Gate for ban-list management through the relay
    pub fn authorize_management(&self, caller: Option<&str>) -> Result<(), Rejection> {
        match caller {
            Some(caller) if self.access.is_admin(caller) => Ok(()),
            _ => Err(Rejection::Blocked("only relay admins can manage this relay.")),
        }
    }

    async fn synthetic_events(&self, caller: Option<&str>, filter: &Filter) -> Vec<Event> {
        let mut templates: Vec<EventTemplate> = Vec::new();

        if self.config.enable_groups
            && (filter.has_kind(kinds::GROUP_METADATA) || filter.has_kind(kinds::GROUP_ADMINS))
        {
            match self.groups.list_groups().await {
                Ok(groups) => {
                    for group in &groups {
                        if filter.has_kind(kinds::GROUP_METADATA) {
                            templates.push(group.to_metadata());
                        }
                        if filter.has_kind(kinds::GROUP_ADMINS) {
                            templates.push(group.to_admins(self.access.admins()));
                        }
                    }
                }
                Err(e) => error!(error = %e, "Failed to list groups"),
            }
        }

        if self.config.generate_claims && filter.has_kind(kinds::AUTH_INVITE) {
            if let Some(caller) = caller {
                match self.claims.generate_invite(caller).await {
                    Ok(code) => templates.push(EventTemplate::new(kinds::AUTH_INVITE).tag(["claim", code.as_str()])),
                    Err(e) => error!(caller = %caller, error = %e, "Failed to issue invite"),
                }
            }
        }

        let mut events = Vec::with_capacity(templates.len());
        for template in templates {
            match self.config.signer.sign(template) {
                Ok(event) if filter.matches(&event) => events.push(event),
                Ok(_) => {}
                Err(e) => error!(error = %e, "Failed to sign generated event"),
            }
        }

        events
    }
}

/// Events of private groups are only shown to that group's members
async fn visible_to(groups: &GroupProjector, reader: Option<&str>, event: &Event) -> bool {
    let Some(id) = event.group_id() else {
        return true;
    };

    match groups.project(id).await {
        Ok(Some(group)) if group.private => match reader {
            Some(reader) => groups.is_member(id, reader).await.unwrap_or_else(|e| {
                error!(group = %id, error = %e, "Failed to check membership");
                false
            }),
            None => false,
        },
        Ok(_) => true,
        Err(e) => {
            error!(group = %id, error = %e, "Failed to project group");
            false
        }
    }
}
