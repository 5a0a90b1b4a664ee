//! The per-attribute resolution pipeline.
//!
//! Stages, in order: reserved names, availability, raw lookup (overlay,
//! raw mapping, fallback, alias singular, ancestors for globals, defaults,
//! overlay placeholder), collection normalization, default merge,
//! validation, nested wrapping, link following. The result of those stages
//! is memoized as the attribute's base value. Filter selection, string
//! import and init then run on top of it; unfiltered results are memoized
//! as well.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::error::{SettingsError, SettingsResult};
use crate::merge::{ValueSource, join_path, merge_defaults};
use crate::overlay::Overlay;
use crate::schema::{INSTANCE, PARENT, Scope};
use crate::validate::resolve_validator;
use crate::value::{Mapping, Setting};

use super::trail::Trail;
use super::{Resolved, SettingsNode, lock};

/// Select the element whose `field` equals `value`.
#[derive(Debug, Clone)]
pub(crate) struct Filter {
    pub(crate) field: String,
    pub(crate) value: String,
}

struct Found {
    value: Setting,
    source: ValueSource,
    singular: bool,
}

#[derive(Clone, Copy)]
enum ChildSlot<'a> {
    Single,
    Member(&'a str),
    /// The only member, read through the alias's singular attribute.
    Singular(&'a str),
    Element,
    /// The only list element, read through the alias's singular attribute.
    SingularElement,
}

impl SettingsNode {
    pub(crate) fn resolve(
        self: &Arc<Self>,
        name: &str,
        filter: Option<&Filter>,
        trail: &mut Trail,
    ) -> SettingsResult<Setting> {
        let qualified = self.qualified(name);
        trail.descend(&qualified, |trail| self.resolve_at(name, filter, trail))
    }

    fn resolve_at(
        self: &Arc<Self>,
        name: &str,
        filter: Option<&Filter>,
        trail: &mut Trail,
    ) -> SettingsResult<Setting> {
        match name {
            PARENT => {
                return self
                    .parent()
                    .map(Setting::Node)
                    .ok_or_else(|| self.unknown(name));
            },
            INSTANCE => return self.instances.instantiate(&Setting::Node(Arc::clone(self))),
            _ => {},
        }
        if !self.is_available(name) {
            return Err(self.unknown(name));
        }
        if filter.is_none()
            && let Some(value) = lock(&self.memo).finalized.get(name).cloned()
        {
            return Ok(value);
        }

        let base = self.base_value(name, trail)?;
        let value = match filter {
            Some(filter) => self.select(name, &base.value, filter, trail)?,
            None => base.value,
        };
        let value = self.import_strings(name, value)?;
        let value = self.init(name, value)?;

        if filter.is_some() {
            return Ok(value);
        }
        Ok(lock(&self.memo)
            .finalized
            .entry(name.to_owned())
            .or_insert(value)
            .clone())
    }

    fn base_value(self: &Arc<Self>, name: &str, trail: &mut Trail) -> SettingsResult<Resolved> {
        if let Some(resolved) = lock(&self.memo).base.get(name).cloned() {
            return Ok(resolved);
        }
        if self.scope.is_deprecated(name) {
            warn!(
                namespace = self.namespace(),
                path = %self.lookup_path,
                setting = name,
                "Deprecated setting read"
            );
        }

        let Some(found) = self.raw_lookup(name, trail)? else {
            return Err(self.unknown(name));
        };
        let Found {
            value,
            source,
            singular,
        } = found;
        let value = self.normalize(name, value, singular)?;
        let value = self.merge_default(name, value, source)?;
        self.validate(name, &value)?;
        let value = self.wrap(name, value, singular, trail)?;
        let value = self.follow_link(name, value, trail)?;

        debug!(
            namespace = self.namespace(),
            path = %self.lookup_path,
            setting = name,
            %source,
            "Setting resolved"
        );
        Ok(lock(&self.memo)
            .base
            .entry(name.to_owned())
            .or_insert(Resolved { value, source })
            .clone())
    }

    fn raw_lookup(self: &Arc<Self>, name: &str, trail: &mut Trail) -> SettingsResult<Option<Found>> {
        if let Some((value, source)) = self.layer_lookup(name, trail)? {
            return Ok(Some(Found {
                value,
                source,
                singular: false,
            }));
        }
        if let Some(alias) = self.scope.alias(name)
            && let Some((value, _)) = self.layer_lookup(&alias.raw, trail)?
        {
            trace!(setting = name, singular = %alias.raw, "Read through one-to-many alias");
            return Ok(Some(Found {
                value,
                source: ValueSource::Alias,
                singular: true,
            }));
        }
        if self.schema.is_global(name)
            && let Some(value) = self.ancestor_lookup(name, trail)?
        {
            return Ok(Some(Found {
                value,
                source: ValueSource::Ancestor,
                singular: false,
            }));
        }
        if let Some(value) = self.scope.default_for(name) {
            return Ok(Some(Found {
                value: value.clone(),
                source: ValueSource::Default,
                singular: false,
            }));
        }
        Ok(self.placeholder(name).map(|(value, singular)| Found {
            value,
            source: ValueSource::Overlay,
            singular,
        }))
    }

    /// Overlay, raw mapping, then fallback. Overlay mappings for nested
    /// attributes are placeholders handed to the child node instead.
    fn layer_lookup(
        self: &Arc<Self>,
        name: &str,
        trail: &mut Trail,
    ) -> SettingsResult<Option<(Setting, ValueSource)>> {
        if let Some(value) = self.overlay.attribute(name)
            && !self.is_placeholder(name, value)
        {
            return Ok(Some((value.clone(), ValueSource::Overlay)));
        }
        if let Some(value) = self.raw.get(name).filter(|v| !v.is_null()) {
            return Ok(Some((value.clone(), ValueSource::Raw)));
        }
        if let Some(fallback) = &self.fallback {
            let value = trail.resolving_as(None, |t| fallback.lookup_traced(name, t))?;
            return Ok(value.map(|v| (v, ValueSource::Fallback)));
        }
        Ok(None)
    }

    fn is_placeholder(&self, name: &str, value: &Setting) -> bool {
        matches!(value, Setting::Map(_)) && self.scope.is_nested(name)
    }

    fn placeholder(&self, name: &str) -> Option<(Setting, bool)> {
        if let Some(value @ Setting::Map(_)) = self.overlay.attribute(name) {
            return Some((value.clone(), false));
        }
        if self.overlay.members(name).is_some() {
            return Some((Setting::Map(Mapping::new()), false));
        }
        let alias = self.scope.alias(name)?;
        match self.overlay.attribute(&alias.raw) {
            Some(value @ Setting::Map(_)) => Some((value.clone(), true)),
            _ => None,
        }
    }

    /// Nearest ancestor for a global: the node a secondary root resolves
    /// for, else the lexical parent.
    fn ancestor_lookup(
        self: &Arc<Self>,
        name: &str,
        trail: &mut Trail,
    ) -> SettingsResult<Option<Setting>> {
        let ancestor = match trail.resolving_for() {
            Some(node) if self.is_root() && !Arc::ptr_eq(node, self) => Some(Arc::clone(node)),
            _ => self.parent(),
        };
        let Some(ancestor) = ancestor else {
            return Ok(None);
        };
        trace!(setting = name, ancestor = %ancestor.lookup_path, "Global read from ancestor");
        trail.resolving_as(None, |t| ancestor.lookup_traced(name, t))
    }

    fn normalize(&self, name: &str, value: Setting, singular: bool) -> SettingsResult<Setting> {
        let value = match self.scope.alias(name) {
            None => value,
            Some(alias) => match (&alias.filter, value) {
                (Some(field), Setting::List(items)) => {
                    let mut keyed = Mapping::new();
                    for item in items {
                        let key = self.member_key(name, field, &item)?;
                        keyed.insert(key, item);
                    }
                    Setting::Map(keyed)
                },
                (Some(field), value) if singular => {
                    let key = self.member_key(name, field, &value)?;
                    Setting::Map(Mapping::from([(key, value)]))
                },
                (Some(_), value) | (None, value @ Setting::List(_)) => value,
                (None, value) => Setting::List(vec![value]),
            },
        };
        Ok(self.with_overlay_members(name, value))
    }

    fn member_key(&self, name: &str, field: &str, value: &Setting) -> SettingsResult<String> {
        let key = match value {
            Setting::Map(map) => map.get(field).and_then(Setting::filter_key),
            Setting::Node(node) => node.raw().get(field).and_then(Setting::filter_key),
            _ => None,
        };
        key.ok_or_else(|| {
            self.invalid(
                name,
                format!("collection member has no '{field}' field to be keyed by"),
            )
        })
    }

    /// Seed members that exist only as overlay patches.
    fn with_overlay_members(&self, name: &str, value: Setting) -> Setting {
        let Some(members) = self.overlay.members(name) else {
            return value;
        };
        match value {
            Setting::Map(mut keyed) => {
                let field = self.scope.alias(name).and_then(|a| a.filter.as_ref());
                for key in members.keys() {
                    if !keyed.contains_key(key) {
                        let mut seed = Mapping::new();
                        if let Some(field) = field {
                            seed.insert(field.clone(), Setting::String(key.clone()));
                        }
                        keyed.insert(key.clone(), Setting::Map(seed));
                    }
                }
                Setting::Map(keyed)
            },
            other => other,
        }
    }

    fn merge_default(
        &self,
        name: &str,
        value: Setting,
        source: ValueSource,
    ) -> SettingsResult<Setting> {
        if source == ValueSource::Default {
            return Ok(value);
        }
        match (&value, self.scope.default_for(name)) {
            (Setting::Map(configured), Some(Setting::Map(defaults))) => {
                let filter_field = self.scope.alias(name).and_then(|a| a.filter.as_deref());
                let path = format!("{}.{}", self.namespace(), self.qualified(name));
                trace!(setting = name, "Merging defaults");
                merge_defaults(defaults, configured, filter_field, &path).map(Setting::Map)
            },
            _ => Ok(value),
        }
    }

    /// A per-attribute validator decides alone; otherwise the schema-wide
    /// validator decides.
    fn validate(&self, name: &str, value: &Setting) -> SettingsResult<()> {
        let (accepted, by) = match self.scope.validator_ref(name) {
            Some(reference) => {
                let validator = resolve_validator(
                    self.namespace(),
                    &self.qualified(name),
                    reference,
                    self.schema.registry(),
                )?;
                (validator(name, value), reference.to_owned())
            },
            None => match self.schema.validation_method() {
                Some(validator) => (validator(name, value), "VALIDATION_METHOD".to_owned()),
                None => return Ok(()),
            },
        };
        if accepted {
            Ok(())
        } else {
            Err(self.invalid(name, format!("rejected by validator '{by}'")))
        }
    }

    fn wrap(
        self: &Arc<Self>,
        name: &str,
        value: Setting,
        singular: bool,
        trail: &mut Trail,
    ) -> SettingsResult<Setting> {
        if !self.scope.is_nested(name) {
            return Ok(value);
        }
        let decl = self.scope.alias(name).map_or(name, |a| a.raw.as_str());
        let child_scope = Arc::new(self.scope.child(name, decl));

        Ok(match value {
            Setting::List(items) => {
                let slot = if singular {
                    ChildSlot::SingularElement
                } else {
                    ChildSlot::Element
                };
                Setting::List(
                    items
                        .into_iter()
                        .map(|item| self.wrap_element(name, item, &child_scope, slot))
                        .collect(),
                )
            },
            Setting::Map(members) if self.scope.is_keyed_collection(name) => Setting::Map(
                members
                    .into_iter()
                    .map(|(key, item)| {
                        let slot = if singular {
                            ChildSlot::Singular(&key)
                        } else {
                            ChildSlot::Member(&key)
                        };
                        let wrapped = self.wrap_element(name, item, &child_scope, slot);
                        (key, wrapped)
                    })
                    .collect(),
            ),
            Setting::Map(raw) => {
                let fallback = match &self.fallback {
                    Some(fallback) => trail
                        .resolving_as(None, |t| fallback.lookup_traced(name, t))?
                        .and_then(|v| match v {
                            Setting::Node(node) => Some(node),
                            Setting::Map(map) => Some(fallback.nested(
                                Arc::new(Scope::open()),
                                map,
                                Overlay::default(),
                                fallback.qualified(name),
                                None,
                            )),
                            _ => None,
                        }),
                    None => None,
                };
                Setting::Node(self.child(name, raw, &child_scope, ChildSlot::Single, fallback))
            },
            other => other,
        })
    }

    fn wrap_element(
        self: &Arc<Self>,
        name: &str,
        item: Setting,
        scope: &Arc<Scope>,
        slot: ChildSlot<'_>,
    ) -> Setting {
        match item {
            Setting::Map(raw) => Setting::Node(self.child(name, raw, scope, slot, None)),
            other => other,
        }
    }

    fn child(
        self: &Arc<Self>,
        name: &str,
        raw: Mapping,
        scope: &Arc<Scope>,
        slot: ChildSlot<'_>,
        fallback: Option<Arc<Self>>,
    ) -> Arc<Self> {
        let (path, overlay) = match slot {
            ChildSlot::Single => (
                self.qualified(name),
                self.overlay.child(name, None, scope),
            ),
            ChildSlot::Member(key) => (
                join_path(&self.qualified(name), key),
                self.overlay.child(name, Some(key), scope),
            ),
            ChildSlot::Singular(key) => (
                join_path(&self.qualified(name), key),
                match self.scope.alias(name) {
                    Some(alias) => self.overlay.singular_member(name, &alias.raw, key, scope),
                    None => self.overlay.child(name, Some(key), scope),
                },
            ),
            ChildSlot::Element => (self.qualified(name), Overlay::default()),
            ChildSlot::SingularElement => (
                self.qualified(name),
                self.scope
                    .alias(name)
                    .map(|alias| self.overlay.child(&alias.raw, None, scope))
                    .unwrap_or_default(),
            ),
        };
        trace!(path = %path, "Wrapping nested settings");
        self.nested(Arc::clone(scope), raw, overlay, path, fallback)
    }

    fn select(
        &self,
        name: &str,
        value: &Setting,
        filter: &Filter,
        trail: &mut Trail,
    ) -> SettingsResult<Setting> {
        let found = match value {
            Setting::List(items) => self.first_match(items.iter(), filter, trail)?,
            Setting::Map(map) if !map.contains_key(&filter.field) => {
                self.first_match(map.values(), filter, trail)?
            },
            single => self.first_match(std::iter::once(single), filter, trail)?,
        };
        found.ok_or_else(|| SettingsError::FilterNotMatched {
            namespace: self.namespace().to_owned(),
            path: self.error_path(),
            name: name.to_owned(),
            field: filter.field.clone(),
            value: filter.value.clone(),
        })
    }

    fn first_match<'a>(
        &self,
        candidates: impl Iterator<Item = &'a Setting>,
        filter: &Filter,
        trail: &mut Trail,
    ) -> SettingsResult<Option<Setting>> {
        for candidate in candidates {
            let field = match candidate {
                Setting::Node(node) => node.lookup_traced(&filter.field, trail)?,
                Setting::Map(map) => map.get(&filter.field).cloned(),
                Setting::Instance(instance) => instance.attribute(&filter.field),
                Setting::Wrapped(view) => view.get(&filter.field).ok(),
                _ => None,
            };
            if field.and_then(|f| f.filter_key()).as_deref() == Some(filter.value.as_str()) {
                return Ok(Some(candidate.clone()));
            }
        }
        Ok(None)
    }

    fn import_strings(&self, name: &str, value: Setting) -> SettingsResult<Setting> {
        if !self.scope.is_import(name) {
            return Ok(value);
        }
        self.import_value(name, value)
    }

    fn import_value(&self, name: &str, value: Setting) -> SettingsResult<Setting> {
        match value {
            Setting::String(reference) => self
                .schema
                .import(&reference)
                .map(Setting::Symbol)
                .map_err(|failure| self.import_error(name, &reference, &failure)),
            Setting::List(items) => items
                .into_iter()
                .map(|item| self.import_value(name, item))
                .collect::<SettingsResult<Vec<_>>>()
                .map(Setting::List),
            Setting::Map(map) => map
                .into_iter()
                .map(|(key, item)| Ok((key, self.import_value(name, item)?)))
                .collect::<SettingsResult<Mapping>>()
                .map(Setting::Map),
            other => Ok(other),
        }
    }

    /// Nodes, and collections made only of nodes, go through the init
    /// method element-wise. Anything else passes through unchanged.
    fn init(&self, name: &str, value: Setting) -> SettingsResult<Setting> {
        let Some(reference) = self.scope.init(name) else {
            return Ok(value);
        };
        let symbol = self
            .schema
            .import(reference)
            .map_err(|failure| self.import_error(name, reference, &failure))?;
        let Some(initializer) = symbol.as_initializer() else {
            return Err(self.import_error(name, reference, &"not an init method"));
        };
        let is_node = |v: &Setting| matches!(v, Setting::Node(_));

        match value {
            Setting::Node(_) => initializer(&value, &self.instances),
            Setting::List(items) if !items.is_empty() && items.iter().all(is_node) => items
                .iter()
                .map(|item| initializer(item, &self.instances))
                .collect::<SettingsResult<Vec<_>>>()
                .map(Setting::List),
            Setting::Map(members) if !members.is_empty() && members.values().all(is_node) => {
                members
                    .iter()
                    .map(|(key, item)| Ok((key.clone(), initializer(item, &self.instances)?)))
                    .collect::<SettingsResult<Mapping>>()
                    .map(Setting::Map)
            },
            other => Ok(other),
        }
    }
}
