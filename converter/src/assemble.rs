use crate::errors::{ConvertError, Stage};
use crate::feed::{ParsedEndpoints, endpoints_from};
use crate::groups::Group;
use crate::merge::MergedEndpoints;
use serde_yaml::{Mapping, Value};

const PROXIES: &str = "proxies";
const PROXY_GROUPS: &str = "proxy-groups";
const PROXY_PROVIDERS: &str = "proxy-providers";

/// Template configuration every feed is merged into.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateDocument {
    root: Mapping,
}

impl TemplateDocument {
    /// Parses the template, resolving `<<` merge keys so anchored groups
    /// expose their members.
    pub fn parse(text: &str) -> Result<Self, ConvertError> {
        let parse_error = |source| ConvertError::Parse {
            stage: Stage::Template,
            source,
        };
        let mut root: Value = serde_yaml::from_str(text).map_err(parse_error)?;
        root.apply_merge().map_err(parse_error)?;

        match root {
            Value::Mapping(root) => Ok(TemplateDocument { root }),
            _ => Err(ConvertError::InvalidTemplate),
        }
    }

    pub fn endpoints(&self) -> ParsedEndpoints {
        endpoints_from(self.root.get(PROXIES))
    }

    /// Mapping entries of `proxy-groups`; anything else is skipped.
    pub fn groups(&self) -> Vec<Group> {
        match self.root.get(PROXY_GROUPS) {
            Some(Value::Sequence(items)) => items
                .iter()
                .cloned()
                .filter_map(Group::from_value)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Re-embeds the merged endpoints and reconciled groups.
    ///
    /// `proxies` and `proxy-groups` are replaced in place and every other
    /// field passes through, except `proxy-providers`: a provider would make
    /// the client import the feed a second time next to the merged list.
    pub fn assemble(mut self, merged: &MergedEndpoints, groups: Vec<Group>) -> Mapping {
        let proxies = merged.iter().map(|e| e.to_value()).collect();
        self.root.insert(PROXIES.into(), Value::Sequence(proxies));

        if self.root.shift_remove(PROXY_PROVIDERS).is_some() {
            tracing::debug!("removed proxy-providers from template");
        }

        if !groups.is_empty() || self.root.contains_key(PROXY_GROUPS) {
            let groups = groups
                .into_iter()
                .map(|mut group| {
                    group.remove_providers();
                    group.into_value()
                })
                .collect();
            self.root.insert(PROXY_GROUPS.into(), Value::Sequence(groups));
        }

        self.root
    }
}
