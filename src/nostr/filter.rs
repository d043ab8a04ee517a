//! Subscription filters
//!
//! A filter matches an event when every populated field matches. Tag
//! constraints use `#<name>` keys: all named tags must match, and within one
//! name any listed value is enough.

use crate::nostr::Event;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,

    /// Tag constraints keyed by `#<tag name>`; other unknown keys (NIP-50
    /// `search` and friends) are ignored
    #[serde(flatten, deserialize_with = "tag_constraints")]
    pub tags: BTreeMap<String, Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = Some(authors.into_iter().map(Into::into).collect());
        self
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = u16>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Constrain a single-letter tag, e.g. `tag('h', ["rust"])`
    pub fn tag<I, S>(mut self, name: char, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags
            .insert(format!("#{}", name), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: u64) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether the filter explicitly asks for the given kind
    pub fn has_kind(&self, kind: u16) -> bool {
        self.kinds.as_ref().is_some_and(|kinds| kinds.contains(&kind))
    }

    /// Check if an event matches this filter
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|id| *id == event.id) {
                return false;
            }
        }

        if let Some(authors) = &self.authors {
            if !authors.iter().any(|a| *a == event.pubkey) {
                return false;
            }
        }

        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }

        if self.since.is_some_and(|since| event.created_at < since) {
            return false;
        }

        if self.until.is_some_and(|until| event.created_at > until) {
            return false;
        }

        self.tags.iter().all(|(key, values)| {
            let name = key.trim_start_matches('#');
            event
                .tag_values(name)
                .any(|v| values.iter().any(|wanted| wanted == v))
        })
    }
}

fn tag_constraints<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let extra = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;

    extra
        .into_iter()
        .filter(|(key, _)| key.starts_with('#'))
        .map(|(key, values)| {
            let values = serde_json::from_value(values)
                .map_err(|e| de::Error::custom(format!("{}: {}", key, e)))?;
            Ok((key, values))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nostr::kinds;

    fn event(kind: u16, created_at: u64, tags: &[(&str, &str)]) -> Event {
        Event {
            id: format!("{:064x}", created_at),
            pubkey: "ab".repeat(32),
            created_at,
            kind,
            tags: tags
                .iter()
                .map(|(k, v)| vec![k.to_string(), v.to_string()])
                .collect(),
            content: String::new(),
            sig: String::new(),
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(Filter::new().matches(&event(1, 10, &[])));
    }

    #[test]
    fn test_kinds_and_time_range() {
        let filter = Filter::new().kinds([kinds::GROUP_PUT_USER]).since(10).until(20);

        assert!(filter.matches(&event(kinds::GROUP_PUT_USER, 15, &[])));
        assert!(!filter.matches(&event(kinds::GROUP_REMOVE_USER, 15, &[])));
        assert!(!filter.matches(&event(kinds::GROUP_PUT_USER, 9, &[])));
        assert!(!filter.matches(&event(kinds::GROUP_PUT_USER, 21, &[])));
    }

    #[test]
    fn test_tags_are_anded_across_names() {
        let filter = Filter::new().tag('h', ["rust"]).tag('p', ["alice", "bob"]);

        assert!(filter.matches(&event(1, 1, &[("h", "rust"), ("p", "bob")])));
        assert!(!filter.matches(&event(1, 1, &[("h", "rust")])));
        assert!(!filter.matches(&event(1, 1, &[("h", "go"), ("p", "alice")])));
    }

    #[test]
    fn test_any_matching_tag_value_counts() {
        let filter = Filter::new().tag('p', ["carol"]);
        let e = event(1, 1, &[("p", "alice"), ("p", "carol")]);
        assert!(filter.matches(&e));
    }

    #[test]
    fn test_deserialize_nip01_json() {
        let filter: Filter =
            serde_json::from_str(r##"{"kinds":[39000],"#d":["rust"],"limit":5}"##).unwrap();

        assert!(filter.has_kind(kinds::GROUP_METADATA));
        assert_eq!(filter.tags.get("#d"), Some(&vec!["rust".to_string()]));
        assert_eq!(filter.limit, Some(5));
    }

    #[test]
    fn test_deserialize_ignores_unknown_keys() {
        let filter: Filter =
            serde_json::from_str(r##"{"kinds":[9],"search":"rust","#h":["g"]}"##).unwrap();

        assert_eq!(filter.tags.len(), 1);
        assert_eq!(filter.tags.get("#h"), Some(&vec!["g".to_string()]));
        assert!(serde_json::from_str::<Filter>(r##"{"#h":"g"}"##).is_err());
    }
}
