//! Adopting groups that only exist as chat traffic
//!
//! Older deployments accepted `h`-tagged chat messages without any
//! create-group event. Migration finds those group ids and writes the
//! lifecycle events the projector needs, named after the simple group lists
//! (kind 10009) that mention them.

use crate::nostr::{kinds, Event, EventTemplate, Filter};
use crate::policy::{DeriveError, PolicyGate};
use crate::storage::query_all;
use std::collections::BTreeSet;
use tracing::{error, info};

/// Chat messages scanned for group ids
const MIGRATION_SCAN_LIMIT: usize = 1000;

/// Outcome of a migration run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Groups created, in id order
    pub created: Vec<String>,
    /// Groups whose migration failed
    pub failed: Vec<String>,
}

impl PolicyGate {
    pub async fn migrate_legacy_groups(&self) -> Result<MigrationReport, DeriveError> {
        let messages = query_all(
            self.events.as_ref(),
            &Filter::new()
                .kinds([kinds::GROUP_CHAT_MESSAGE])
                .limit(MIGRATION_SCAN_LIMIT),
        )
        .await?;

        let ids: BTreeSet<&str> = messages
            .iter()
            .flat_map(|message| message.tag_values("h"))
            .filter(|id| !id.is_empty())
            .collect();
        let lists = query_all(
            self.events.as_ref(),
            &Filter::new().kinds([kinds::SIMPLE_GROUP_LIST]),
        )
        .await?;

        info!(candidates = ids.len(), "Migrating legacy groups");

        let mut report = MigrationReport::default();
        for id in ids {
            if self.groups.project(id).await?.is_some() {
                continue;
            }

            match self.adopt_group(id, group_name(&lists, id)).await {
                Ok(()) => report.created.push(id.to_string()),
                Err(e) => {
                    error!(group = %id, error = %e, "Failed to migrate group");
                    report.failed.push(id.to_string());
                }
            }
        }

        info!(
            created = report.created.len(),
            failed = report.failed.len(),
            "Group migration completed"
        );
        Ok(report)
    }

    async fn adopt_group(&self, id: &str, name: Option<&str>) -> Result<(), DeriveError> {
        let create = self
            .config
            .signer
            .sign(EventTemplate::new(kinds::GROUP_CREATE_GROUP).tag(["h", id]))?;
        let created_at = create.created_at;

        self.save_event(&create).await?;
        self.on_saved(&create).await;

        if let Some(name) = name {
            let edit = self.config.signer.sign(
                EventTemplate::new(kinds::GROUP_EDIT_METADATA)
                    .created_at(created_at)
                    .tag(["h", id])
                    .tag(["name", name]),
            )?;

            self.save_event(&edit).await?;
            self.on_saved(&edit).await;
        }

        Ok(())
    }
}

/// Name given to a group by any `["group", id, relay, name]` list entry
fn group_name<'a>(lists: &'a [Event], id: &str) -> Option<&'a str> {
    lists
        .iter()
        .flat_map(|list| list.tags.iter())
        .find(|tag| tag.len() >= 4 && tag[0] == "group" && tag[1] == id && !tag[3].is_empty())
        .map(|tag| tag[3].as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::storage::{EventStore, MemoryEventStore, MemoryKvStore};
    use std::sync::Arc;

    fn event(id: &str, kind: u16, tags: &[&[&str]]) -> Event {
        Event {
            id: id.to_string(),
            pubkey: "alice".to_string(),
            created_at: 10,
            kind,
            tags: tags
                .iter()
                .map(|t| t.iter().map(|s| s.to_string()).collect())
                .collect(),
            content: String::new(),
            sig: String::new(),
        }
    }

    #[tokio::test]
    async fn test_migrate_creates_missing_groups_with_names() {
        let events = Arc::new(MemoryEventStore::new());
        for e in [
            event("a", kinds::GROUP_CHAT_MESSAGE, &[&["h", "rust"]]),
            event("b", kinds::GROUP_CHAT_MESSAGE, &[&["h", "rust"]]),
            event("c", kinds::GROUP_CHAT_MESSAGE, &[&["h", "zig"]]),
            event("d", kinds::GROUP_CHAT_MESSAGE, &[]),
            event("f", kinds::GROUP_CHAT_MESSAGE, &[&["h", "ada"], &["h", ""], &["h", "zig"]]),
            event(
                "e",
                kinds::SIMPLE_GROUP_LIST,
                &[&["group", "rust", "wss://relay", "Rustaceans"]],
            ),
        ] {
            events.save(&e).await.unwrap();
        }

        let gate = PolicyGate::builder(
            RelayConfig {
                enable_groups: true,
                ..RelayConfig::default()
            },
            Arc::new(MemoryKvStore::new()),
            events.clone(),
        )
        .build()
        .unwrap();

        let report = gate.migrate_legacy_groups().await.unwrap();
        assert_eq!(report.created, vec!["ada", "rust", "zig"]);
        assert!(report.failed.is_empty());

        let rust = gate.groups().project("rust").await.unwrap().unwrap();
        assert_eq!(rust.name, "Rustaceans");
        assert_eq!(gate.groups().project("zig").await.unwrap().unwrap().name, "zig");

        // Already migrated groups are left alone
        let again = gate.migrate_legacy_groups().await.unwrap();
        assert!(again.created.is_empty());
    }

    #[test]
    fn test_group_name_needs_full_entry() {
        let lists = vec![event(
            "l",
            kinds::SIMPLE_GROUP_LIST,
            &[&["group", "a", "wss://relay"], &["group", "b", "wss://relay", ""]],
        )];

        assert_eq!(group_name(&lists, "a"), None);
        assert_eq!(group_name(&lists, "b"), None);
    }
}
