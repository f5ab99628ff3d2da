//! Endpoint merge.
//!
//! The template's endpoints seed an insertion-ordered map keyed by canonical
//! name; the feed's endpoints are then overlaid in order. Last write wins and
//! a replaced entry keeps its position, so template entries the feed does not
//! mention stay where they were.

use crate::config::SurvivingName;
use crate::endpoint::Endpoint;
use indexmap::IndexMap;
use indexmap::map::Entry;

/// Deduplicated endpoint list, at most one endpoint per canonical key.
#[derive(Clone, Debug, Default)]
pub struct MergedEndpoints {
    by_key: IndexMap<String, Endpoint>,
}

impl MergedEndpoints {
    /// Merges `feed` over `template`. Unnamed endpoints are skipped.
    ///
    /// On a key collision the feed's field values win. `surviving` decides
    /// whether the incoming name or the name already in the list is kept.
    pub fn merge(template: Vec<Endpoint>, feed: &[Endpoint], surviving: SurvivingName) -> Self {
        let mut by_key = IndexMap::with_capacity(template.len() + feed.len());

        for endpoint in template {
            if let Some(key) = endpoint.identity() {
                by_key.insert(key, endpoint);
            }
        }

        for endpoint in feed {
            let Some(key) = endpoint.identity() else {
                continue;
            };

            match by_key.entry(key) {
                Entry::Occupied(mut slot) => {
                    let mut replacement = endpoint.clone();
                    if surviving == SurvivingName::Template {
                        replacement.name = slot.get().name.clone();
                    }
                    slot.insert(replacement);
                }
                Entry::Vacant(slot) => {
                    slot.insert(endpoint.clone());
                }
            }
        }

        MergedEndpoints { by_key }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.by_key.values()
    }

    /// Literal name of the merged endpoint sharing `name`'s canonical key.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.by_key
            .get(&crate::canonical::identity(name))
            .and_then(|e| e.name.as_deref())
    }
}
