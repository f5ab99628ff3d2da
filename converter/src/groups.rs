//! Routing group reconciliation.
//!
//! Manual groups are curated: their references keep their order and only
//! lose entries that no longer resolve. Every other group tracks the feed
//! exactly and is rewritten to the feed's endpoint names.

use crate::canonical;
use crate::config::MergePolicy;
use crate::endpoint::Endpoint;
use crate::merge::MergedEndpoints;
use serde_yaml::{Mapping, Value};
use std::collections::HashSet;

/// One entry of `proxy-groups`. Field order of the source mapping is kept.
#[derive(Clone, Debug, PartialEq)]
pub struct Group {
    map: Mapping,
}

impl Group {
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Mapping(map) => Some(Group { map }),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Mapping(self.map)
    }

    pub fn name(&self) -> Option<&str> {
        self.map.get("name").and_then(Value::as_str)
    }

    pub fn kind(&self) -> Option<&str> {
        self.map.get("type").and_then(Value::as_str)
    }

    /// References in `proxies`; non-string entries are ignored.
    pub fn proxies(&self) -> Vec<String> {
        match self.map.get("proxies") {
            Some(Value::Sequence(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Replaces `proxies`, keeping the field's position when it exists.
    pub fn set_proxies(&mut self, proxies: Vec<String>) {
        let seq = proxies.into_iter().map(Value::String).collect();
        self.map.insert("proxies".into(), Value::Sequence(seq));
    }

    /// Drops the group's provider references. Returns whether any were present.
    pub fn remove_providers(&mut self) -> bool {
        self.map.shift_remove("use").is_some()
    }
}

/// Rewrites every group so its references resolve against `merged`.
///
/// `feed` is the feed's endpoint list in feed order. When the merge produced
/// no endpoints the groups are returned untouched.
pub fn reconcile(
    groups: Vec<Group>,
    merged: &MergedEndpoints,
    feed: &[Endpoint],
    policy: &MergePolicy,
) -> Vec<Group> {
    if merged.is_empty() {
        return groups;
    }

    let group_names: HashSet<String> = groups
        .iter()
        .filter_map(|g| g.name().map(String::from))
        .collect();
    let resolver = Resolver {
        merged,
        group_names: &group_names,
        policy,
    };
    let feed_names = resolver.feed_names(feed);

    groups
        .into_iter()
        .map(|mut group| {
            let manual = group.name().is_some_and(|n| policy.is_manual_group(n));
            let existing = group.proxies();

            let proxies = if manual {
                resolver.members(existing.iter().chain(feed_names.iter()))
            } else if feed_names.is_empty() {
                // Nothing to track: keep what still resolves rather than empty the group.
                resolver.members(existing.iter())
            } else {
                feed_names.clone()
            };

            tracing::debug!(
                group = group.name().unwrap_or_default(),
                kind = group.kind().unwrap_or_default(),
                manual,
                before = existing.len(),
                after = proxies.len(),
                "reconciled group"
            );
            group.set_proxies(proxies);
            group
        })
        .collect()
}

struct Resolver<'a> {
    merged: &'a MergedEndpoints,
    group_names: &'a HashSet<String>,
    policy: &'a MergePolicy,
}

impl Resolver<'_> {
    /// Group names and built-in policies are references, never endpoints.
    fn is_non_endpoint(&self, reference: &str) -> bool {
        self.policy.is_builtin_policy(reference) || self.group_names.contains(reference)
    }

    /// Feed endpoint names in feed order, one per key, spelled as merged.
    fn feed_names(&self, feed: &[Endpoint]) -> Vec<String> {
        let mut seen = HashSet::new();
        feed.iter()
            .filter_map(|e| e.name.as_deref())
            .filter(|name| seen.insert(canonical::identity(name)))
            .filter_map(|name| self.merged.resolve(name))
            .map(String::from)
            .collect()
    }

    /// Deduplicates references by key, keeping each first occurrence's
    /// position, and drops endpoint references that do not resolve.
    fn members<'r>(&self, references: impl Iterator<Item = &'r String>) -> Vec<String> {
        let mut seen_keys = HashSet::new();
        let mut seen_literals = HashSet::new();
        let mut out = Vec::new();

        for reference in references {
            if self.is_non_endpoint(reference) {
                if seen_literals.insert(reference.as_str()) {
                    out.push(reference.clone());
                }
                continue;
            }

            if !seen_keys.insert(canonical::identity(reference)) {
                continue;
            }
            match self.merged.resolve(reference) {
                Some(name) => out.push(name.to_string()),
                None => tracing::debug!(reference = reference.as_str(), "dropping dangling reference"),
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SurvivingName;

    fn endpoint(name: &str) -> Endpoint {
        Endpoint::new(name.into(), "ss", "s", 1, "", "pw")
    }

    fn group(yaml: &str) -> Group {
        Group::from_value(serde_yaml::from_str(yaml).unwrap()).unwrap()
    }

    fn policy(manual: &[&str]) -> MergePolicy {
        MergePolicy {
            manual_groups: manual.iter().map(|s| s.to_string()).collect(),
            ..MergePolicy::default()
        }
    }

    #[test]
    fn test_manual_group_drops_missing_and_keeps_order() {
        let merged = MergedEndpoints::merge(vec![endpoint("Node-A")], &[], SurvivingName::Feed);
        let groups = vec![group("{name: Manual, type: select, proxies: [Node-A, Node-B]}")];

        let out = reconcile(groups, &merged, &[], &policy(&["Manual"]));
        assert_eq!(out[0].proxies(), ["Node-A"]);
    }

    #[test]
    fn test_manual_group_appends_new_feed_endpoints() {
        let template = vec![endpoint("🚀HK-01"), endpoint("JP-01")];
        let feed = vec![endpoint("US 01"), endpoint("HK 01"), endpoint("SG 01")];
        let merged = MergedEndpoints::merge(template, &feed, SurvivingName::Feed);

        let groups = vec![group(
            "{name: Manual, type: select, proxies: [JP-01, DIRECT, 🚀HK-01, Auto, jp 01]}",
        ), group("{name: Auto, type: url-test, proxies: [JP-01]}")];

        let out = reconcile(groups, &merged, &feed, &policy(&["Manual"]));

        // Existing order kept, HK respelled as merged, duplicate JP dropped,
        // new feed endpoints appended in feed order.
        assert_eq!(
            out[0].proxies(),
            ["JP-01", "DIRECT", "HK 01", "Auto", "US 01", "SG 01"]
        );
        // Non-manual groups track the feed exactly.
        assert_eq!(out[1].proxies(), ["US 01", "HK 01", "SG 01"]);
    }

    #[test]
    fn test_manual_group_is_superset_of_resolvable_references() {
        let template = vec![endpoint("A"), endpoint("B"), endpoint("C")];
        let feed = vec![endpoint("c"), endpoint("D")];
        let merged = MergedEndpoints::merge(template, &feed, SurvivingName::Template);
        let groups = vec![group("{name: M, proxies: [C, X, A]}")];

        let out = reconcile(groups, &merged, &feed, &policy(&["M"]));
        let out_keys: HashSet<_> = out[0].proxies().iter().map(|n| canonical::key(n)).collect();
        for kept in ["c", "a"] {
            assert!(out_keys.contains(kept));
        }
        assert_eq!(out[0].proxies(), ["C", "A", "D"]);
    }

    #[test]
    fn test_every_reference_resolves() {
        let template = vec![endpoint("A"), endpoint("B")];
        let feed = vec![endpoint("b"), endpoint("🇨🇦 C"), endpoint("C")];
        let merged = MergedEndpoints::merge(template, &feed, SurvivingName::Feed);
        let groups = vec![
            group("{name: M, proxies: [A, Gone, B, REJECT]}"),
            group("{name: Auto, type: url-test, proxies: [Gone]}"),
            group("{name: Fallback, type: fallback, use: [provider]}"),
        ];

        let out = reconcile(groups, &merged, &feed, &policy(&["M"]));
        let names: HashSet<_> = merged.iter().filter_map(|e| e.name.as_deref()).collect();
        let p = policy(&["M"]);
        for g in &out {
            for reference in g.proxies() {
                assert!(
                    names.contains(reference.as_str()) || p.is_builtin_policy(&reference),
                    "{reference} in {:?} does not resolve",
                    g.name()
                );
            }
        }
        assert_eq!(out[0].proxies(), ["A", "b", "REJECT", "C"]);
        assert_eq!(out[1].proxies(), ["b", "C"]);
        assert_eq!(out[2].proxies(), ["b", "C"]);
    }

    #[test]
    fn test_empty_merge_passes_groups_through() {
        let merged = MergedEndpoints::default();
        let groups = vec![group("{name: Auto, type: url-test, proxies: [A, B]}")];

        let out = reconcile(groups.clone(), &merged, &[], &policy(&[]));
        assert_eq!(out, groups);
    }

    #[test]
    fn test_auto_group_keeps_resolvable_members_when_feed_is_empty() {
        let merged = MergedEndpoints::merge(vec![endpoint("A")], &[], SurvivingName::Feed);
        let groups = vec![group("{name: Auto, type: url-test, proxies: [A, B]}")];

        let out = reconcile(groups, &merged, &[], &policy(&[]));
        assert_eq!(out[0].proxies(), ["A"]);
    }

    #[test]
    fn test_set_proxies_keeps_field_position() {
        let mut g = group("{name: G, proxies: [A], url: 'http://www.gstatic.com/generate_204'}");
        g.set_proxies(vec!["B".into()]);
        let keys: Vec<_> = match g.into_value() {
            Value::Mapping(m) => m.keys().map(|k| k.as_str().unwrap().to_string()).collect(),
            _ => unreachable!(),
        };
        assert_eq!(keys, ["name", "proxies", "url"]);
    }
}
