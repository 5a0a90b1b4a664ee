//! Lazily resolved settings nodes.
//!
//! A [`SettingsNode`] wraps one raw mapping of a namespace, or a nested
//! mapping inside it, and resolves attributes on first access. Every
//! resolved attribute is memoized on the node; the first write wins and is
//! never replaced. Re-resolving with different values means building a new
//! node, e.g. with [`SettingsNode::with_configuration`].

mod link;
mod pipeline;
mod trail;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use indexmap::IndexMap;
use serde_json::json;

pub use trail::MAX_RESOLVE_DEPTH;

use crate::error::{SettingsError, SettingsResult};
use crate::instance::{Factory, InstanceCache};
use crate::merge::{FieldSources, ValueSource, split_path};
use crate::overlay::Overlay;
use crate::schema::{CLASS, INSTANCE, PARENT, Schema, Scope};
use crate::value::{Mapping, Setting, mapping_fingerprint};

use trail::Trail;

/// Options for building a namespace root.
#[derive(Debug, Clone, Default)]
pub struct RootOptions {
    /// Node consulted when neither the overlay nor the raw mapping has a
    /// value, typically an open-schema node over the host's global settings.
    pub fallback: Option<Arc<SettingsNode>>,
    /// Initial overrides.
    pub overrides: Option<Mapping>,
    /// Cache used by factory-init. Defaults to the process-wide cache.
    pub instances: Option<Arc<InstanceCache>>,
}

/// Inputs of the namespace root, kept so that link targets can be resolved
/// from the root even when only a nested node is at hand.
struct RootContext {
    raw: Mapping,
    overlay: Overlay,
    fallback: Option<Arc<SettingsNode>>,
    node: Weak<SettingsNode>,
}

#[derive(Clone)]
struct Resolved {
    value: Setting,
    source: ValueSource,
}

#[derive(Default)]
struct Memo {
    base: IndexMap<String, Resolved>,
    finalized: IndexMap<String, Setting>,
}

/// One node of a resolved settings tree.
pub struct SettingsNode {
    schema: Arc<Schema>,
    scope: Arc<Scope>,
    raw: Mapping,
    overlay: Overlay,
    lookup_path: String,
    parent: Weak<SettingsNode>,
    fallback: Option<Arc<SettingsNode>>,
    root: Arc<RootContext>,
    instances: Arc<InstanceCache>,
    memo: Mutex<Memo>,
    fingerprint: OnceLock<serde_json::Value>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wrap `overrides` in one mapping per segment of `path`.
fn nest_under(path: &str, overrides: &Mapping) -> Mapping {
    path.rsplit('.')
        .filter(|segment| !segment.is_empty())
        .fold(overrides.clone(), |inner, segment| {
            Mapping::from([(segment.to_owned(), Setting::Map(inner))])
        })
}

impl SettingsNode {
    /// Build the root node of `schema`'s namespace over `raw`, using the
    /// process-wide instance cache.
    #[must_use]
    pub fn root(schema: Arc<Schema>, raw: Mapping) -> Arc<Self> {
        Self::root_with(schema, raw, RootOptions::default())
    }

    /// Build a root node with a fallback, initial overrides or a private
    /// instance cache.
    #[must_use]
    pub fn root_with(schema: Arc<Schema>, raw: Mapping, options: RootOptions) -> Arc<Self> {
        let overlay = options
            .overrides
            .as_ref()
            .map(|o| Overlay::from_overrides(o, schema.root_scope()))
            .unwrap_or_default();
        let instances = options.instances.unwrap_or_else(InstanceCache::global);
        Self::build_root(schema, raw, options.fallback, overlay, instances)
    }

    fn build_root(
        schema: Arc<Schema>,
        raw: Mapping,
        fallback: Option<Arc<Self>>,
        overlay: Overlay,
        instances: Arc<InstanceCache>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            scope: Arc::clone(schema.root_scope()),
            root: Arc::new(RootContext {
                raw: raw.clone(),
                overlay: overlay.clone(),
                fallback: fallback.clone(),
                node: this.clone(),
            }),
            schema,
            raw,
            overlay,
            lookup_path: String::new(),
            parent: Weak::new(),
            fallback,
            instances,
            memo: Mutex::new(Memo::default()),
            fingerprint: OnceLock::new(),
        })
    }

    fn nested(
        self: &Arc<Self>,
        scope: Arc<Scope>,
        raw: Mapping,
        overlay: Overlay,
        lookup_path: String,
        fallback: Option<Arc<Self>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            schema: Arc::clone(&self.schema),
            scope,
            raw,
            overlay,
            lookup_path,
            parent: Arc::downgrade(self),
            fallback,
            root: Arc::clone(&self.root),
            instances: Arc::clone(&self.instances),
            memo: Mutex::new(Memo::default()),
            fingerprint: OnceLock::new(),
        })
    }

    /// Resolve an attribute.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::UnknownSetting`] if `name` is not
    /// available or nothing supplies a value, and any error a pipeline stage
    /// raises. Failed lookups memoize nothing.
    pub fn get(self: &Arc<Self>, name: &str) -> SettingsResult<Setting> {
        self.resolve(name, None, &mut Trail::new())
    }

    /// Resolve an attribute and select the element whose `field` equals
    /// `value`.
    ///
    /// # Errors
    ///
    /// As [`SettingsNode::get`], plus
    /// [`SettingsError::FilterNotMatched`].
    pub fn get_filtered(
        self: &Arc<Self>,
        name: &str,
        field: &str,
        value: &str,
    ) -> SettingsResult<Setting> {
        let filter = pipeline::Filter {
            field: field.to_owned(),
            value: value.to_owned(),
        };
        self.resolve(name, Some(&filter), &mut Trail::new())
    }

    /// Resolve an attribute, mapping "nothing found" to `None`.
    ///
    /// # Errors
    ///
    /// Any error other than absence.
    pub fn lookup(self: &Arc<Self>, name: &str) -> SettingsResult<Option<Setting>> {
        self.lookup_traced(name, &mut Trail::new())
    }

    fn lookup_traced(
        self: &Arc<Self>,
        name: &str,
        trail: &mut Trail,
    ) -> SettingsResult<Option<Setting>> {
        match self.resolve(name, None, trail) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_unresolved() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolve a dotted path, e.g. `"BACKEND.STORE.URL"`, through nested
    /// nodes and merged views.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::UnknownSetting`] for a malformed path or a
    /// segment that leads into a plain value, and any error resolving a
    /// segment raises.
    pub fn get_path(self: &Arc<Self>, path: &str) -> SettingsResult<Setting> {
        let segments = split_path(path).ok_or_else(|| self.unknown(path))?;
        let mut current = Setting::Node(Arc::clone(self));
        for segment in segments {
            current = match &current {
                Setting::Node(node) => node.get(segment)?,
                Setting::Wrapped(view) => view.get(segment)?,
                Setting::Instance(instance) => {
                    instance
                        .attribute(segment)
                        .ok_or_else(|| SettingsError::AttributeNotFound {
                            factory: format!("{instance:?}"),
                            attribute: segment.to_owned(),
                        })?
                },
                Setting::Map(map) => map
                    .get(segment)
                    .filter(|v| !v.is_null())
                    .cloned()
                    .ok_or_else(|| self.unknown(path))?,
                _ => return Err(self.unknown(path)),
            };
        }
        Ok(current)
    }

    /// The lexical parent, if this node was created by nested wrapping and
    /// the parent is still alive.
    #[must_use]
    pub fn parent(&self) -> Option<Arc<Self>> {
        self.parent.upgrade()
    }

    /// A new node over the same raw settings with `overrides` layered on
    /// top of this node's overlay. The new node starts with an empty memo.
    ///
    /// For a nested node the overrides are also layered onto the root
    /// context, under the node's lookup path, so links followed from the new
    /// node see them.
    #[must_use]
    pub fn with_configuration(self: &Arc<Self>, overrides: &Mapping) -> Arc<Self> {
        let overlay = self.overlay.layered(overrides, &self.scope);
        if self.is_root() {
            return Self::build_root(
                Arc::clone(&self.schema),
                self.raw.clone(),
                self.fallback.clone(),
                overlay,
                Arc::clone(&self.instances),
            );
        }
        let lifted = nest_under(&self.lookup_path, overrides);
        let root_overlay = self.root.overlay.layered(&lifted, self.schema.root_scope());
        Arc::new(Self {
            schema: Arc::clone(&self.schema),
            scope: Arc::clone(&self.scope),
            raw: self.raw.clone(),
            overlay,
            lookup_path: self.lookup_path.clone(),
            parent: self.parent.clone(),
            fallback: self.fallback.clone(),
            root: Arc::new(RootContext {
                raw: self.root.raw.clone(),
                overlay: root_overlay,
                fallback: self.root.fallback.clone(),
                node: Weak::new(),
            }),
            instances: Arc::clone(&self.instances),
            memo: Mutex::new(Memo::default()),
            fingerprint: OnceLock::new(),
        })
    }

    /// The factory named by this node's `CLASS` attribute.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::UnknownSetting`] without a `CLASS`,
    /// [`SettingsError::ImportResolution`] if the reference does not import,
    /// and [`SettingsError::InvalidSetting`] if it is not a factory.
    pub fn factory(self: &Arc<Self>) -> SettingsResult<Arc<dyn Factory>> {
        let symbol = match self.get(CLASS)? {
            Setting::Symbol(symbol) => symbol,
            Setting::String(reference) => self
                .schema
                .import(&reference)
                .map_err(|failure| self.import_error(CLASS, &reference, &failure))?,
            other => {
                return Err(self.invalid(
                    CLASS,
                    format!("expected a factory reference, found {}", other.kind()),
                ));
            },
        };
        symbol
            .as_factory()
            .cloned()
            .ok_or_else(|| self.invalid(CLASS, format!("'{}' is not a factory", symbol.path())))
    }

    /// Namespace name.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.schema.name()
    }

    /// Dotted path from the namespace root; empty for the root.
    #[must_use]
    pub fn lookup_path(&self) -> &str {
        &self.lookup_path
    }

    /// Whether this is a namespace root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.lookup_path.is_empty()
    }

    /// The raw mapping this node wraps.
    #[must_use]
    pub fn raw(&self) -> &Mapping {
        &self.raw
    }

    /// The schema of this node's namespace.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Declarations visible to this node.
    #[must_use]
    pub fn scope(&self) -> &Arc<Scope> {
        &self.scope
    }

    /// The override layer this node resolves through.
    #[must_use]
    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    /// The fallback node, if any.
    #[must_use]
    pub fn fallback(&self) -> Option<&Arc<Self>> {
        self.fallback.as_ref()
    }

    /// The instance cache factory-init uses.
    #[must_use]
    pub fn instances(&self) -> &Arc<InstanceCache> {
        &self.instances
    }

    /// Whether `name` may be requested on this node.
    #[must_use]
    pub fn is_available(&self, name: &str) -> bool {
        name == PARENT
            || name == INSTANCE
            || self.scope.allows(name)
            || self.schema.is_global(name)
    }

    /// Which layer supplied the memoized value of `name`.
    #[must_use]
    pub fn source_of(&self, name: &str) -> Option<ValueSource> {
        lock(&self.memo).base.get(name).map(|r| r.source)
    }

    /// Layers of every attribute resolved so far, in resolution order.
    #[must_use]
    pub fn sources(&self) -> FieldSources {
        lock(&self.memo)
            .base
            .iter()
            .map(|(name, r)| (name.clone(), r.source))
            .collect()
    }

    /// Whether `name` has been fully resolved and memoized.
    #[must_use]
    pub fn is_resolved(&self, name: &str) -> bool {
        lock(&self.memo).finalized.contains_key(name)
    }

    /// Canonical identity: schema, lookup path, raw mapping and overlay, plus
    /// the fingerprints of the parent and the fallback, since both feed
    /// resolution.
    #[must_use]
    pub fn fingerprint(&self) -> serde_json::Value {
        self.fingerprint
            .get_or_init(|| {
                json!({
                    "namespace": self.namespace(),
                    "schema": self.schema.identity(),
                    "path": self.lookup_path,
                    "raw": mapping_fingerprint(&self.raw),
                    "overlay": self.overlay.to_json(),
                    "parent": self.parent().map(|p| p.fingerprint()),
                    "fallback": self.fallback.as_ref().map(|f| f.fingerprint()),
                })
            })
            .clone()
    }

    fn qualified(&self, name: &str) -> String {
        crate::merge::join_path(&self.lookup_path, name)
    }

    fn error_path(&self) -> String {
        if self.lookup_path.is_empty() {
            String::new()
        } else {
            format!(".{}", self.lookup_path)
        }
    }

    fn unknown(&self, name: &str) -> SettingsError {
        SettingsError::UnknownSetting {
            namespace: self.namespace().to_owned(),
            path: self.error_path(),
            name: name.to_owned(),
        }
    }

    fn invalid(&self, name: &str, reason: String) -> SettingsError {
        SettingsError::InvalidSetting {
            namespace: self.namespace().to_owned(),
            path: self.error_path(),
            name: name.to_owned(),
            reason,
        }
    }

    fn import_error(
        &self,
        name: &str,
        reference: &str,
        failure: &impl fmt::Display,
    ) -> SettingsError {
        SettingsError::ImportResolution {
            namespace: self.namespace().to_owned(),
            path: self.qualified(name),
            reference: reference.to_owned(),
            reason: failure.to_string(),
        }
    }
}

impl fmt::Debug for SettingsNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsNode")
            .field("namespace", &self.namespace())
            .field("path", &self.lookup_path)
            .field("raw", &self.raw.keys().collect::<Vec<_>>())
            .field("overlay", &!self.overlay.is_empty())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
