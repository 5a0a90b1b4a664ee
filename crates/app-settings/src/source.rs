//! Raw settings sources and the lazy per-namespace handle.
//!
//! A [`SettingsSource`] supplies the raw mapping of each namespace. An
//! [`AppSettings`] handle reads its namespace from the source exactly once,
//! on first access, and keeps a stack of overridden roots for scoped
//! overrides. Each thread has its own stack, so a scope opened on one
//! thread is never seen by lookups on another.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, ThreadId};

use tracing::debug;

use crate::error::{SettingsError, SettingsResult};
use crate::instance::InstanceCache;
use crate::node::{RootOptions, SettingsNode};
use crate::schema::Schema;
use crate::value::{Mapping, Setting, mapping_from_json};

/// Supplies raw settings by namespace name. Sources are only ever read.
pub trait SettingsSource: Send + Sync {
    /// The raw mapping of `namespace`, if the source defines it.
    fn namespace(&self, namespace: &str) -> Option<Mapping>;
}

/// In-memory source.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    namespaces: HashMap<String, Mapping>,
}

impl StaticSource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>, raw: Mapping) -> Self {
        self.namespaces.insert(namespace.into(), raw);
        self
    }

    /// Build from a JSON object whose top-level keys are namespace names.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Parse`] if `value` is not an object of
    /// objects.
    pub fn from_value(value: serde_json::Value) -> SettingsResult<Self> {
        let serde_json::Value::Object(namespaces) = value else {
            return Err(SettingsError::Parse {
                what: "settings source".to_owned(),
                message: "expected a table of namespaces".to_owned(),
            });
        };
        namespaces
            .into_iter()
            .try_fold(Self::new(), |source, (name, raw)| match raw {
                serde_json::Value::Object(raw) => {
                    Ok(source.with_namespace(name, mapping_from_json(raw)))
                },
                other => Err(SettingsError::Parse {
                    what: "settings source".to_owned(),
                    message: format!("namespace '{name}' must be a table, found {other}"),
                }),
            })
    }

    /// Parse TOML text whose top-level tables are namespaces.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Parse`] on malformed TOML or a top-level
    /// value that is not a table.
    pub fn from_toml_str(text: &str) -> SettingsResult<Self> {
        Self::from_value(toml::from_str(text)?)
    }
}

impl SettingsSource for StaticSource {
    fn namespace(&self, namespace: &str) -> Option<Mapping> {
        self.namespaces.get(namespace).cloned()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lazily materialized settings of one namespace.
pub struct AppSettings {
    schema: Arc<Schema>,
    source: Arc<dyn SettingsSource>,
    fallback: Option<Arc<SettingsNode>>,
    instances: Arc<InstanceCache>,
    root: OnceLock<Arc<SettingsNode>>,
    overrides: Mutex<HashMap<ThreadId, Vec<Arc<SettingsNode>>>>,
}

impl AppSettings {
    /// Create a handle over `source` for `schema`'s namespace. Nothing is
    /// read until the first lookup.
    pub fn new(schema: Arc<Schema>, source: Arc<dyn SettingsSource>) -> Self {
        Self {
            schema,
            source,
            fallback: None,
            instances: InstanceCache::global(),
            root: OnceLock::new(),
            overrides: Mutex::new(HashMap::new()),
        }
    }

    /// Consult `fallback` for attributes the namespace does not set.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<SettingsNode>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Use a private instance cache instead of the process-wide one.
    #[must_use]
    pub fn with_instance_cache(mut self, instances: Arc<InstanceCache>) -> Self {
        self.instances = instances;
        self
    }

    /// The schema of this namespace.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The root node without overrides, built on first call.
    pub fn root(&self) -> &Arc<SettingsNode> {
        self.root.get_or_init(|| {
            let raw = self
                .source
                .namespace(self.schema.name())
                .unwrap_or_default();
            debug!(namespace = self.schema.name(), keys = raw.len(), "Settings loaded");
            SettingsNode::root_with(
                Arc::clone(&self.schema),
                raw,
                RootOptions {
                    fallback: self.fallback.clone(),
                    overrides: None,
                    instances: Some(Arc::clone(&self.instances)),
                },
            )
        })
    }

    /// The innermost root overridden on the calling thread, or the plain
    /// root.
    pub fn current(&self) -> Arc<SettingsNode> {
        lock(&self.overrides)
            .get(&thread::current().id())
            .and_then(|stack| stack.last().cloned())
            .unwrap_or_else(|| Arc::clone(self.root()))
    }

    /// Resolve an attribute on the current root.
    ///
    /// # Errors
    ///
    /// See [`SettingsNode::get`].
    pub fn get(&self, name: &str) -> SettingsResult<Setting> {
        self.current().get(name)
    }

    /// Resolve a dotted path on the current root.
    ///
    /// # Errors
    ///
    /// See [`SettingsNode::get_path`].
    pub fn get_path(&self, path: &str) -> SettingsResult<Setting> {
        self.current().get_path(path)
    }

    /// Push `overrides` on top of the current root until the returned guard
    /// is dropped. Only lookups on the calling thread see them.
    ///
    /// The guard restores the previous root on every exit path, including
    /// early returns, `?` and unwinding.
    #[must_use = "the overrides are removed as soon as the guard is dropped"]
    pub fn override_settings(&self, overrides: &Mapping) -> OverrideGuard<'_> {
        let node = self.current().with_configuration(overrides);
        let thread = thread::current().id();
        let mut stacks = lock(&self.overrides);
        let stack = stacks.entry(thread).or_default();
        let depth = stack.len();
        stack.push(node);
        debug!(
            namespace = self.schema.name(),
            depth = depth.saturating_add(1),
            "Overrides pushed"
        );
        OverrideGuard {
            settings: self,
            thread,
            depth,
        }
    }

    /// Run `f` with `overrides` in effect.
    pub fn with_overrides<R>(&self, overrides: &Mapping, f: impl FnOnce(&Self) -> R) -> R {
        let _guard = self.override_settings(overrides);
        f(self)
    }

    /// Number of override scopes active on the calling thread.
    #[must_use]
    pub fn override_depth(&self) -> usize {
        lock(&self.overrides)
            .get(&thread::current().id())
            .map_or(0, Vec::len)
    }
}

impl fmt::Debug for AppSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppSettings")
            .field("namespace", &self.schema.name())
            .field("loaded", &self.root.get().is_some())
            .field("overrides", &self.override_depth())
            .finish_non_exhaustive()
    }
}

/// Removes the overrides it was created for when dropped.
///
/// The guard pops the stack of the thread that created it, even if it is
/// dropped elsewhere.
#[derive(Debug)]
pub struct OverrideGuard<'a> {
    settings: &'a AppSettings,
    thread: ThreadId,
    depth: usize,
}

impl Drop for OverrideGuard<'_> {
    fn drop(&mut self) {
        let mut stacks = lock(&self.settings.overrides);
        if let Some(stack) = stacks.get_mut(&self.thread) {
            stack.truncate(self.depth);
            if stack.is_empty() {
                stacks.remove(&self.thread);
            }
        }
        drop(stacks);
        debug!(
            namespace = self.settings.schema.name(),
            depth = self.depth,
            "Overrides popped"
        );
    }
}
