//! Runtime override layers.
//!
//! An [`Overlay`] holds temporary values layered on top of a node's raw
//! settings. Overrides for members of a keyed collection are kept apart in
//! `by_filter_key`, indexed by attribute and then by member key, so that
//! each member node receives only its own patch.

use indexmap::IndexMap;
use serde_json::json;

use crate::merge::deep_merge;
use crate::schema::Scope;
use crate::value::{Mapping, Setting, mapping_fingerprint};

/// One immutable override layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlay {
    by_attribute: Mapping,
    by_filter_key: IndexMap<String, IndexMap<String, Mapping>>,
}

impl Overlay {
    /// Split `overrides` into an overlay for a node with `scope`.
    #[must_use]
    pub fn from_overrides(overrides: &Mapping, scope: &Scope) -> Self {
        Self::default().layered(overrides, scope)
    }

    /// A new overlay with `overrides` layered on top of this one.
    ///
    /// Mappings deep-merge into what the layer below already overrides; any
    /// other value replaces it.
    #[must_use]
    pub fn layered(&self, overrides: &Mapping, scope: &Scope) -> Self {
        let mut next = self.clone();
        for (attr, value) in overrides {
            if let Setting::Map(members) = value
                && scope.is_keyed_collection(attr)
                && members.values().all(|m| matches!(m, Setting::Map(_)))
            {
                let slots = next.by_filter_key.entry(attr.clone()).or_default();
                for (key, member) in members {
                    if let Setting::Map(patch) = member {
                        deep_merge(slots.entry(key.clone()).or_default(), patch);
                    }
                }
                continue;
            }

            let merged_in_place = match (next.by_attribute.get_mut(attr), value) {
                (Some(Setting::Map(base)), Setting::Map(patch)) => {
                    deep_merge(base, patch);
                    true
                },
                _ => false,
            };
            if !merged_in_place {
                next.by_attribute.insert(attr.clone(), value.clone());
            }
        }
        next
    }

    /// Override recorded for `name`, ignoring `null`.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Setting> {
        self.by_attribute.get(name).filter(|v| !v.is_null())
    }

    /// Member patches recorded for the keyed collection `name`.
    #[must_use]
    pub fn members(&self, name: &str) -> Option<&IndexMap<String, Mapping>> {
        self.by_filter_key.get(name).filter(|m| !m.is_empty())
    }

    /// Overlay for the child node created for `name`, or for its member
    /// `member_key` when the attribute is a keyed collection.
    #[must_use]
    pub fn child(&self, name: &str, member_key: Option<&str>, child_scope: &Scope) -> Self {
        Self::from_overrides(&self.patch_for(name, member_key), child_scope)
    }

    /// Overlay for member `member_key` of the collection `name` when that
    /// member was read through the singular attribute `singular`. Patches on
    /// the singular name apply first, member patches on top.
    #[must_use]
    pub fn singular_member(
        &self,
        name: &str,
        singular: &str,
        member_key: &str,
        child_scope: &Scope,
    ) -> Self {
        let mut patch = Mapping::new();
        if let Some(Setting::Map(placeholder)) = self.by_attribute.get(singular) {
            deep_merge(&mut patch, placeholder);
        }
        deep_merge(&mut patch, &self.patch_for(name, Some(member_key)));
        Self::from_overrides(&patch, child_scope)
    }

    fn patch_for(&self, name: &str, member_key: Option<&str>) -> Mapping {
        let mut patch = Mapping::new();
        if let Some(Setting::Map(placeholder)) = self.by_attribute.get(name) {
            match member_key {
                None => deep_merge(&mut patch, placeholder),
                Some(key) => {
                    if let Some(Setting::Map(member)) = placeholder.get(key) {
                        deep_merge(&mut patch, member);
                    }
                },
            }
        }
        if let Some(key) = member_key
            && let Some(member) = self.by_filter_key.get(name).and_then(|m| m.get(key))
        {
            deep_merge(&mut patch, member);
        }
        patch
    }

    /// Whether the overlay overrides nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_attribute.is_empty() && self.by_filter_key.values().all(IndexMap::is_empty)
    }

    /// JSON rendering, part of a node's fingerprint.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let by_filter_key: serde_json::Map<String, serde_json::Value> = self
            .by_filter_key
            .iter()
            .map(|(attr, members)| {
                let members = members
                    .iter()
                    .map(|(key, patch)| (key.clone(), mapping_fingerprint(patch)))
                    .collect();
                (attr.clone(), serde_json::Value::Object(members))
            })
            .collect();
        json!({
            "by_attribute": mapping_fingerprint(&self.by_attribute),
            "by_filter_key": by_filter_key,
        })
    }
}
