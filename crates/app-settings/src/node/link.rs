//! Link following.
//!
//! A linked attribute holds filter keys into another attribute. Each key is
//! looked up on the namespace root first (seeded with the root overlay) and
//! then on the declaring node itself. A value that cannot serve as a key is
//! an invalid setting.

use std::sync::Arc;

use tracing::trace;

use crate::error::{SettingsError, SettingsResult};
use crate::schema::Link;
use crate::value::Setting;

use super::SettingsNode;
use super::pipeline::Filter;
use super::trail::Trail;

impl SettingsNode {
    pub(super) fn follow_link(
        self: &Arc<Self>,
        name: &str,
        value: Setting,
        trail: &mut Trail,
    ) -> SettingsResult<Setting> {
        let Some(link) = self.scope.link(name).cloned() else {
            return Ok(value);
        };
        match value {
            Setting::List(items) => items
                .into_iter()
                .map(|item| self.follow_one(name, &link, item, trail))
                .collect::<SettingsResult<Vec<_>>>()
                .map(Setting::List),
            other => self.follow_one(name, &link, other, trail),
        }
    }

    fn follow_one(
        self: &Arc<Self>,
        name: &str,
        link: &Link,
        value: Setting,
        trail: &mut Trail,
    ) -> SettingsResult<Setting> {
        let Some(key) = value.filter_key() else {
            return Err(self.invalid(
                name,
                format!("linked value {value:?} is not a key into '{link}'"),
            ));
        };
        trace!(setting = name, %link, key = %key, "Following link");
        trail
            .follow(&self.lookup_path, name, &key, |t| {
                self.resolve_link_target(name, link, &key, t)
            })
            .unwrap_or_else(|| {
                Err(SettingsError::LinkCycle {
                    namespace: self.namespace().to_owned(),
                    path: self.error_path(),
                    name: name.to_owned(),
                    key: key.clone(),
                })
            })
    }

    fn resolve_link_target(
        self: &Arc<Self>,
        name: &str,
        link: &Link,
        key: &str,
        trail: &mut Trail,
    ) -> SettingsResult<Setting> {
        let filter = Filter {
            field: link.field.clone(),
            value: key.to_owned(),
        };

        let secondary = self.secondary();
        let on_root = trail.resolving_as(Some(Arc::clone(self)), |t| {
            secondary.resolve(&link.target, Some(&filter), t)
        });
        match on_root {
            Ok(value) => return Ok(value),
            Err(e) if e.is_unresolved() => {},
            Err(e) => return Err(e),
        }

        if !Arc::ptr_eq(&secondary, self) {
            match self.resolve(&link.target, Some(&filter), trail) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_unresolved() => {},
                Err(e) => return Err(e),
            }
        }

        Err(SettingsError::BrokenLink {
            namespace: self.namespace().to_owned(),
            path: self.error_path(),
            name: name.to_owned(),
            link: link.to_string(),
            key: key.to_owned(),
        })
    }

    /// The namespace root this node belongs to, rebuilt from the root's
    /// inputs if it has been dropped or if the node was overridden below
    /// the root.
    fn secondary(self: &Arc<Self>) -> Arc<Self> {
        if let Some(root) = self.root.node.upgrade() {
            return root;
        }
        Self::build_root(
            Arc::clone(&self.schema),
            self.root.raw.clone(),
            self.root.fallback.clone(),
            self.root.overlay.clone(),
            Arc::clone(&self.instances),
        )
    }
}
