//! The admission rule tables

use crate::auth::BanSubject;
use crate::nostr::{kinds, Event, Filter};
use crate::policy::{PolicyGate, Rejection};
use tracing::{error, info};

/// Filter rules, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterRule {
    /// Banned callers cannot read
    Bans,
    /// Callers need relay access when users are restricted
    RelayAccess,
    /// Join events are write-only
    JoinKind,
}

pub const FILTER_RULES: [FilterRule; 3] = [FilterRule::Bans, FilterRule::RelayAccess, FilterRule::JoinKind];

/// Event rules, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRule {
    /// Banned callers, authors and events
    Bans,
    /// Redeem a `claim` carried by a relay join event
    JoinClaim,
    /// Callers publish as themselves, recipients authorize zaps and gift wraps
    Authorship,
    /// Caller and/or author need relay access
    RelayAccess,
    /// Group metadata kinds are produced by the relay only
    GeneratedKinds,
    /// Moderation kinds are reserved to relay admins
    GroupAdmin,
    JoinRequest,
    LeaveRequest,
    CreateGroup,
    /// Everything else aimed at a group needs an existing, reachable group
    GroupScope,
}

pub const EVENT_RULES: [EventRule; 10] = [
    EventRule::Bans,
    EventRule::JoinClaim,
    EventRule::Authorship,
    EventRule::RelayAccess,
    EventRule::GeneratedKinds,
    EventRule::GroupAdmin,
    EventRule::JoinRequest,
    EventRule::LeaveRequest,
    EventRule::CreateGroup,
    EventRule::GroupScope,
];

const NOT_AUTHENTICATED: Rejection = Rejection::AuthRequired("authentication is required for access");
const NOT_A_RELAY_MEMBER: Rejection = Rejection::Restricted("you are not a member of this relay");
const GROUPS_DISABLED: Rejection = Rejection::Invalid("group events not accepted on this relay");

/// The pubkey an event is authorized as: the first `p` recipient for
/// recipient-authorized kinds, otherwise the caller
pub fn principal<'a>(caller: Option<&'a str>, event: &'a Event) -> Option<&'a str> {
    if kinds::is_recipient_auth(event.kind) {
        if let Some(recipient) = event.tag_value("p") {
            return Some(recipient);
        }
    }

    caller.filter(|c| !c.is_empty())
}

impl PolicyGate {
    pub async fn check_filter_rule(
        &self,
        rule: FilterRule,
        caller: Option<&str>,
        filter: &Filter,
    ) -> Result<(), Rejection> {
        match rule {
            FilterRule::Bans => {
                if let Some(caller) = caller {
                    if self.bans().is_banned(&BanSubject::PubKey(caller.to_string())).await? {
                        return Err(Rejection::Restricted("you have been banned from this relay"));
                    }
                }
            }
            FilterRule::RelayAccess => {
                if self.config().restrict_user {
                    let Some(caller) = caller else {
                        return Err(NOT_AUTHENTICATED);
                    };
                    if !self.access().has_access(caller).await {
                        return Err(NOT_A_RELAY_MEMBER);
                    }
                }
            }
            FilterRule::JoinKind => {
                if filter.has_kind(kinds::AUTH_JOIN) {
                    return Err(Rejection::Invalid("join requests cannot be queried"));
                }
            }
        }

        Ok(())
    }

    pub async fn check_event_rule(
        &self,
        rule: EventRule,
        caller: Option<&str>,
        event: &Event,
    ) -> Result<(), Rejection> {
        let config = self.config();
        let principal = principal(caller, event);

        match rule {
            EventRule::Bans => {
                let bans = self.bans();
                if let Some(caller) = caller {
                    if bans.is_banned(&BanSubject::PubKey(caller.to_string())).await? {
                        return Err(Rejection::Restricted("you have been banned from this relay"));
                    }
                }
                if bans.is_banned(&BanSubject::PubKey(event.pubkey.clone())).await? {
                    return Err(Rejection::Restricted("event author has been banned from this relay"));
                }
                if bans.is_banned(&BanSubject::Event(event.id.clone())).await? {
                    return Err(Rejection::Restricted("event has been banned from this relay"));
                }
            }

            EventRule::JoinClaim => {
                if event.kind != kinds::AUTH_JOIN || caller != Some(event.pubkey.as_str()) {
                    return Ok(());
                }
                let Some(claim) = event.tag_value("claim") else {
                    return Ok(());
                };

                if self.redeem_claim(&event.pubkey, claim).await? {
                    info!(pubkey = %event.pubkey, "Join claim accepted");
                }

                if !self.access().has_access(&event.pubkey).await {
                    return Err(Rejection::Restricted("failed to validate invite code"));
                }
            }

            EventRule::Authorship => {
                if kinds::is_recipient_auth(event.kind) {
                    if principal.is_none() {
                        return Err(NOT_AUTHENTICATED);
                    }
                } else {
                    match caller {
                        None => return Err(NOT_AUTHENTICATED),
                        Some(caller) if caller != event.pubkey => {
                            return Err(Rejection::Restricted(
                                "you cannot publish events on behalf of others",
                            ));
                        }
                        Some(_) => {}
                    }
                }
            }

            EventRule::RelayAccess => {
                if config.restrict_user && !self.access().has_access(principal.unwrap_or_default()).await {
                    return Err(NOT_A_RELAY_MEMBER);
                }
                if config.restrict_author && !self.access().has_access(&event.pubkey).await {
                    return Err(NOT_A_RELAY_MEMBER);
                }
            }

            EventRule::GeneratedKinds => {
                if kinds::is_generated(event.kind) {
                    return Err(Rejection::Invalid("group metadata cannot be set directly"));
                }
            }

            EventRule::GroupAdmin => {
                if kinds::is_group_admin(event.kind) {
                    if !config.enable_groups {
                        return Err(GROUPS_DISABLED);
                    }
                    if !principal.is_some_and(|p| self.access().is_admin(p)) {
                        return Err(Rejection::Restricted("only relay admins can manage groups"));
                    }
                }
            }

            EventRule::JoinRequest => {
                if event.kind == kinds::GROUP_JOIN_REQUEST {
                    if !config.enable_groups {
                        return Err(GROUPS_DISABLED);
                    }
                    if self.is_group_member(event, principal).await? {
                        return Err(Rejection::Duplicate("already a member"));
                    }
                }
            }

            EventRule::LeaveRequest => {
                if event.kind == kinds::GROUP_LEAVE_REQUEST {
                    if !config.enable_groups {
                        return Err(GROUPS_DISABLED);
                    }
                    if !self.is_group_member(event, principal).await? {
                        return Err(Rejection::Duplicate("not currently a member"));
                    }
                }
            }

            EventRule::CreateGroup => {
                if event.kind == kinds::GROUP_CREATE_GROUP {
                    if !config.enable_groups {
                        return Err(GROUPS_DISABLED);
                    }
                    let Some(id) = event.group_id() else {
                        return Err(Rejection::Invalid("invalid group ID"));
                    };
                    if self.groups().project(id).await?.is_some() {
                        return Err(Rejection::Invalid("that group already exists"));
                    }
                }
            }

            EventRule::GroupScope => {
                let group_scoped = kinds::is_group_admin(event.kind)
                    || kinds::is_group_request(event.kind)
                    || event.group_id().is_some();

                if event.kind == kinds::GROUP_CREATE_GROUP || !group_scoped {
                    return Ok(());
                }
                if !config.enable_groups {
                    return Err(GROUPS_DISABLED);
                }

                let group = match event.group_id() {
                    Some(id) => self.groups().project(id).await?,
                    None => None,
                };
                let Some(group) = group else {
                    return Err(Rejection::Invalid("unknown group"));
                };

                if group.closed
                    && !kinds::is_group_request(event.kind)
                    && !self.is_group_member(event, principal).await?
                {
                    return Err(Rejection::Restricted("you are not a member of this group"));
                }
            }
        }

        Ok(())
    }

    /// Record a claim if it is a static claim or a live invite from someone
    /// with access. The invite is spent either way.
    async fn redeem_claim(&self, pubkey: &str, claim: &str) -> Result<bool, Rejection> {
        let accepted = if self.claims().is_valid_claim(claim) {
            true
        } else {
            match self.claims().consume_invite(claim).await? {
                Some(issuer) => self.access().has_access(&issuer).await,
                None => false,
            }
        };

        if accepted {
            self.claims().add_user_claim(pubkey, claim).await.map_err(|e| {
                error!(pubkey = %pubkey, error = %e, "Failed to record claim");
                Rejection::Internal
            })?;
        }

        Ok(accepted)
    }

    async fn is_group_member(&self, event: &Event, principal: Option<&str>) -> Result<bool, Rejection> {
        match (event.group_id(), principal) {
            (Some(id), Some(pubkey)) => Ok(self.groups().is_member(id, pubkey).await?),
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::nostr::{EventTemplate, RelaySigner};
    use crate::storage::{EventStore, MemoryEventStore, MemoryKvStore};
    use std::sync::Arc;

    const ADMIN: &str = "admin";
    const ALICE: &str = "alice";

    fn build_gate(config: RelayConfig) -> (PolicyGate, Arc<MemoryEventStore>) {
        let events = Arc::new(MemoryEventStore::new());
        let gate = PolicyGate::builder(config, Arc::new(MemoryKvStore::new()), events.clone())
            .build()
            .unwrap();
        (gate, events)
    }

    fn groups_config() -> RelayConfig {
        RelayConfig {
            admins: vec![ADMIN.to_string()],
            whitelist: vec![ALICE.to_string()],
            enable_groups: true,
            ..RelayConfig::default()
        }
    }

    fn event(pubkey: &str, kind: u16, tags: &[&[&str]]) -> Event {
        Event {
            id: format!("{}-{}-{}", pubkey, kind, tags.len()),
            pubkey: pubkey.to_string(),
            created_at: 100,
            kind,
            tags: tags
                .iter()
                .map(|t| t.iter().map(|s| s.to_string()).collect())
                .collect(),
            content: String::new(),
            sig: String::new(),
        }
    }

    async fn create_group(events: &MemoryEventStore, id: &str, extra: &[&str]) {
        let signer = RelaySigner::generate();
        let create = signer
            .sign(EventTemplate::new(kinds::GROUP_CREATE_GROUP).created_at(1).tag(["h", id]))
            .unwrap();
        events.save(&create).await.unwrap();

        let mut edit = EventTemplate::new(kinds::GROUP_EDIT_METADATA).created_at(2).tag(["h", id]);
        for flag in extra {
            edit = edit.tag([*flag]);
        }
        events.save(&signer.sign(edit).unwrap()).await.unwrap();
    }

    async fn add_member(events: &MemoryEventStore, id: &str, pubkey: &str) {
        let put = RelaySigner::generate()
            .sign(
                EventTemplate::new(kinds::GROUP_PUT_USER)
                    .created_at(3)
                    .tag(["p", pubkey])
                    .tag(["h", id]),
            )
            .unwrap();
        events.save(&put).await.unwrap();
    }

    #[tokio::test]
    async fn test_filter_bans() {
        let (gate, _) = build_gate(groups_config());
        gate.bans()
            .ban(&BanSubject::PubKey(ALICE.to_string()), "spam")
            .await
            .unwrap();

        assert_eq!(
            gate.check_filter_rule(FilterRule::Bans, Some(ALICE), &Filter::new()).await,
            Err(Rejection::Restricted("you have been banned from this relay"))
        );
        assert!(gate.reject_filter(Some(ALICE), &Filter::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_filter_relay_access() {
        let (gate, _) = build_gate(groups_config());

        assert_eq!(
            gate.check_filter_rule(FilterRule::RelayAccess, None, &Filter::new()).await,
            Err(NOT_AUTHENTICATED)
        );
        assert_eq!(
            gate.check_filter_rule(FilterRule::RelayAccess, Some("stranger"), &Filter::new()).await,
            Err(NOT_A_RELAY_MEMBER)
        );
        assert!(gate
            .check_filter_rule(FilterRule::RelayAccess, Some(ALICE), &Filter::new())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_filter_relay_access_unrestricted() {
        let (gate, _) = build_gate(RelayConfig {
            restrict_user: false,
            ..RelayConfig::default()
        });
        assert!(gate.reject_filter(None, &Filter::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_filter_join_kind() {
        let (gate, _) = build_gate(groups_config());
        let filter = Filter::new().kinds([1, kinds::AUTH_JOIN]);

        assert_eq!(
            gate.reject_filter(Some(ALICE), &filter).await,
            Err(Rejection::Invalid("join requests cannot be queried"))
        );
    }

    #[tokio::test]
    async fn test_event_bans() {
        let (gate, _) = build_gate(groups_config());
        let note = event(ALICE, 1, &[]);

        gate.bans().ban(&BanSubject::Event(note.id.clone()), "").await.unwrap();
        assert_eq!(
            gate.check_event_rule(EventRule::Bans, Some(ALICE), &note).await,
            Err(Rejection::Restricted("event has been banned from this relay"))
        );

        gate.bans().ban(&BanSubject::PubKey(ALICE.to_string()), "").await.unwrap();
        assert_eq!(
            gate.check_event_rule(EventRule::Bans, Some("bob"), &note).await,
            Err(Rejection::Restricted("event author has been banned from this relay"))
        );
    }

    #[tokio::test]
    async fn test_bans_take_precedence_over_admin() {
        let (gate, _) = build_gate(groups_config());
        gate.bans().ban(&BanSubject::PubKey(ADMIN.to_string()), "").await.unwrap();

        assert_eq!(
            gate.reject_event(Some(ADMIN), &event(ADMIN, 1, &[])).await,
            Err(Rejection::Restricted("you have been banned from this relay"))
        );
    }

    #[tokio::test]
    async fn test_join_claim_with_static_claim() {
        let (gate, _) = build_gate(RelayConfig {
            claims: vec!["vip".to_string()],
            ..RelayConfig::default()
        });
        let join = event("carol", kinds::AUTH_JOIN, &[&["claim", "vip"]]);

        assert!(gate.check_event_rule(EventRule::JoinClaim, Some("carol"), &join).await.is_ok());
        assert!(gate.access().has_access("carol").await);
    }

    #[tokio::test]
    async fn test_join_claim_rejects_unknown_code() {
        let (gate, _) = build_gate(RelayConfig::default());
        let join = event("carol", kinds::AUTH_JOIN, &[&["claim", "NOPE1234"]]);

        assert_eq!(
            gate.check_event_rule(EventRule::JoinClaim, Some("carol"), &join).await,
            Err(Rejection::Restricted("failed to validate invite code"))
        );
    }

    #[tokio::test]
    async fn test_join_claim_spends_invite_of_issuer_without_access() {
        let (gate, _) = build_gate(RelayConfig::default());
        let code = gate.claims().generate_invite("nobody").await.unwrap();
        let join = event("carol", kinds::AUTH_JOIN, &[&["claim", code.as_str()]]);

        assert!(gate.check_event_rule(EventRule::JoinClaim, Some("carol"), &join).await.is_err());
        assert_eq!(gate.claims().consume_invite(code.as_str()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_join_claim_ignores_other_events() {
        let (gate, _) = build_gate(RelayConfig::default());
        let no_claim = event("carol", kinds::AUTH_JOIN, &[]);
        let not_own = event("carol", kinds::AUTH_JOIN, &[&["claim", "x"]]);

        assert!(gate.check_event_rule(EventRule::JoinClaim, Some("carol"), &no_claim).await.is_ok());
        assert!(gate.check_event_rule(EventRule::JoinClaim, Some("dave"), &not_own).await.is_ok());
    }

    #[tokio::test]
    async fn test_authorship() {
        let (gate, _) = build_gate(groups_config());
        let note = event(ALICE, 1, &[]);

        assert_eq!(
            gate.check_event_rule(EventRule::Authorship, None, &note).await,
            Err(NOT_AUTHENTICATED)
        );
        assert_eq!(
            gate.check_event_rule(EventRule::Authorship, Some("bob"), &note).await,
            Err(Rejection::Restricted("you cannot publish events on behalf of others"))
        );
        assert!(gate.check_event_rule(EventRule::Authorship, Some(ALICE), &note).await.is_ok());
    }

    #[tokio::test]
    async fn test_recipient_authorizes_zap_receipt() {
        let (gate, _) = build_gate(groups_config());
        let zap = event("zapper-service", kinds::ZAP_RECEIPT, &[&["p", ALICE]]);

        assert!(gate.reject_event(None, &zap).await.is_ok());

        let stranger_zap = event("zapper-service", kinds::ZAP_RECEIPT, &[&["p", "stranger"]]);
        assert_eq!(gate.reject_event(None, &stranger_zap).await, Err(NOT_A_RELAY_MEMBER));
    }

    #[tokio::test]
    async fn test_relay_access_restrict_author() {
        let (gate, _) = build_gate(RelayConfig {
            restrict_user: false,
            restrict_author: true,
            whitelist: vec![ALICE.to_string()],
            ..RelayConfig::default()
        });

        assert!(gate
            .check_event_rule(EventRule::RelayAccess, None, &event(ALICE, 1, &[]))
            .await
            .is_ok());
        assert_eq!(
            gate.check_event_rule(EventRule::RelayAccess, None, &event("stranger", 1, &[])).await,
            Err(NOT_A_RELAY_MEMBER)
        );
    }

    #[tokio::test]
    async fn test_generated_kinds() {
        let (gate, _) = build_gate(groups_config());
        for kind in kinds::GENERATED {
            assert_eq!(
                gate.reject_event(Some(ADMIN), &event(ADMIN, kind, &[&["d", "g"]])).await,
                Err(Rejection::Invalid("group metadata cannot be set directly"))
            );
        }
    }

    #[tokio::test]
    async fn test_group_admin() {
        let (gate, _) = build_gate(groups_config());
        let create = event(ALICE, kinds::GROUP_CREATE_GROUP, &[&["h", "g"]]);

        assert_eq!(
            gate.check_event_rule(EventRule::GroupAdmin, Some(ALICE), &create).await,
            Err(Rejection::Restricted("only relay admins can manage groups"))
        );

        let (disabled, _) = build_gate(RelayConfig::default());
        assert_eq!(
            disabled.check_event_rule(EventRule::GroupAdmin, Some(ALICE), &create).await,
            Err(GROUPS_DISABLED)
        );
    }

    #[tokio::test]
    async fn test_join_request() {
        let (gate, events) = build_gate(groups_config());
        create_group(&events, "g", &[]).await;
        let join = event(ALICE, kinds::GROUP_JOIN_REQUEST, &[&["h", "g"]]);

        assert!(gate.check_event_rule(EventRule::JoinRequest, Some(ALICE), &join).await.is_ok());

        add_member(&events, "g", ALICE).await;
        assert_eq!(
            gate.check_event_rule(EventRule::JoinRequest, Some(ALICE), &join).await,
            Err(Rejection::Duplicate("already a member"))
        );
    }

    #[tokio::test]
    async fn test_leave_request() {
        let (gate, events) = build_gate(groups_config());
        create_group(&events, "g", &[]).await;
        let leave = event(ALICE, kinds::GROUP_LEAVE_REQUEST, &[&["h", "g"]]);

        assert_eq!(
            gate.check_event_rule(EventRule::LeaveRequest, Some(ALICE), &leave).await,
            Err(Rejection::Duplicate("not currently a member"))
        );

        add_member(&events, "g", ALICE).await;
        assert!(gate.check_event_rule(EventRule::LeaveRequest, Some(ALICE), &leave).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_group() {
        let (gate, events) = build_gate(groups_config());

        assert_eq!(
            gate.check_event_rule(EventRule::CreateGroup, Some(ADMIN), &event(ADMIN, kinds::GROUP_CREATE_GROUP, &[]))
                .await,
            Err(Rejection::Invalid("invalid group ID"))
        );

        let create = event(ADMIN, kinds::GROUP_CREATE_GROUP, &[&["h", "g"]]);
        assert!(gate.reject_event(Some(ADMIN), &create).await.is_ok());

        create_group(&events, "g", &[]).await;
        gate.groups().invalidate("g");
        assert_eq!(
            gate.check_event_rule(EventRule::CreateGroup, Some(ADMIN), &create).await,
            Err(Rejection::Invalid("that group already exists"))
        );
    }

    #[tokio::test]
    async fn test_group_scope_unknown_group() {
        let (gate, _) = build_gate(groups_config());
        let chat = event(ALICE, kinds::GROUP_CHAT_MESSAGE, &[&["h", "nowhere"]]);

        assert_eq!(
            gate.check_event_rule(EventRule::GroupScope, Some(ALICE), &chat).await,
            Err(Rejection::Invalid("unknown group"))
        );
        assert_eq!(
            gate.check_event_rule(
                EventRule::GroupScope,
                Some(ALICE),
                &event(ALICE, kinds::GROUP_JOIN_REQUEST, &[])
            )
            .await,
            Err(Rejection::Invalid("unknown group"))
        );
    }

    #[tokio::test]
    async fn test_group_scope_closed_group() {
        let (gate, events) = build_gate(groups_config());
        create_group(&events, "g", &["closed"]).await;

        let chat = event(ALICE, kinds::GROUP_CHAT_MESSAGE, &[&["h", "g"]]);
        let join = event(ALICE, kinds::GROUP_JOIN_REQUEST, &[&["h", "g"]]);

        assert_eq!(
            gate.check_event_rule(EventRule::GroupScope, Some(ALICE), &chat).await,
            Err(Rejection::Restricted("you are not a member of this group"))
        );
        assert!(gate.check_event_rule(EventRule::GroupScope, Some(ALICE), &join).await.is_ok());

        add_member(&events, "g", ALICE).await;
        assert!(gate.check_event_rule(EventRule::GroupScope, Some(ALICE), &chat).await.is_ok());
    }

    #[tokio::test]
    async fn test_group_scope_ignores_ungrouped_events() {
        let (gate, _) = build_gate(RelayConfig::default());
        assert!(gate
            .check_event_rule(EventRule::GroupScope, Some(ALICE), &event(ALICE, 1, &[]))
            .await
            .is_ok());
        assert_eq!(
            gate.check_event_rule(EventRule::GroupScope, Some(ALICE), &event(ALICE, 1, &[&["h", "g"]]))
                .await,
            Err(GROUPS_DISABLED)
        );
    }

    #[test]
    fn test_principal() {
        let zap = event("service", kinds::ZAP_RECEIPT, &[&["p", "bob"]]);
        let note = event(ALICE, 1, &[&["p", "bob"]]);

        assert_eq!(principal(Some(ALICE), &zap), Some("bob"));
        assert_eq!(principal(Some(ALICE), &note), Some(ALICE));
        assert_eq!(principal(None, &event("s", kinds::GIFT_WRAP, &[])), None);
    }
}
