//! Singleton instances built from settings nodes.
//!
//! The [`InstanceCache`] turns a `(factory, configuration)` pair into exactly
//! one [`Instance`] for the lifetime of the cache. The key is a blake3 hash
//! of the factory name and the configuration's fingerprint, so two nodes
//! that compare equal share one instance. [`MergedView`] exposes an instance
//! together with the configuration it was built from.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError, TryLockError};

use tracing::info;

use crate::error::{SettingsError, SettingsResult};
use crate::node::SettingsNode;
use crate::schema::CLASS;
use crate::value::{Mapping, Setting};

/// An object constructed by a [`Factory`].
///
/// Components expose named attributes so that a [`MergedView`] can fall back
/// to them and so that filters can select among instances.
pub trait Component: Any + Send + Sync + fmt::Debug {
    /// Value of a native attribute, if the component has it.
    fn attribute(&self, name: &str) -> Option<Setting>;

    /// Whether the component natively has the attribute.
    fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }
}

/// Shared handle to a constructed component.
pub type Instance = Arc<dyn Component>;

/// Borrow an instance as its concrete type.
#[must_use]
pub fn downcast<T: Component>(instance: &Instance) -> Option<&T> {
    let any: &dyn Any = instance.as_ref();
    any.downcast_ref::<T>()
}

/// Constructs components from a settings node.
pub trait Factory: Send + Sync {
    /// Name used in cache keys and error messages.
    fn name(&self) -> &str;

    /// Build a component from its resolved settings.
    ///
    /// # Errors
    ///
    /// Whatever resolving the settings the component needs returns.
    fn create(&self, settings: &Arc<SettingsNode>) -> SettingsResult<Instance>;
}

type CreateFn = dyn Fn(&Arc<SettingsNode>) -> SettingsResult<Instance> + Send + Sync;

/// A [`Factory`] backed by a closure.
pub struct FnFactory {
    name: String,
    create: Box<CreateFn>,
}

impl FnFactory {
    /// Wrap `create` as a factory called `name`.
    pub fn new(
        name: impl Into<String>,
        create: impl Fn(&Arc<SettingsNode>) -> SettingsResult<Instance> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            create: Box::new(create),
        }
    }
}

impl Factory for FnFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, settings: &Arc<SettingsNode>) -> SettingsResult<Instance> {
        (self.create)(settings)
    }
}

impl fmt::Debug for FnFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFactory").field("name", &self.name).finish()
    }
}

/// Cache key: blake3 of factory name and configuration fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceKey([u8; 32]);

impl InstanceKey {
    /// Derive the key for `factory` built from `config`.
    #[must_use]
    pub fn new(factory: &str, config: &serde_json::Value) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(factory.as_bytes());
        hasher.update(b"\0");
        hasher.update(config.to_string().as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Hex form, for logs.
    #[must_use]
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

type Slot = Arc<Mutex<Option<Instance>>>;

static GLOBAL: LazyLock<Arc<InstanceCache>> = LazyLock::new(|| Arc::new(InstanceCache::new()));

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Memoizing store of factory-built instances. Entries are never evicted.
#[derive(Default)]
pub struct InstanceCache {
    slots: Mutex<HashMap<InstanceKey, Slot>>,
}

impl InstanceCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    /// Return the instance `factory` builds from `config`, constructing it on
    /// first request.
    ///
    /// The check and the construction happen under the key's own slot lock,
    /// so concurrent callers with the same key get the same instance while
    /// other keys proceed independently.
    ///
    /// # Errors
    ///
    /// Propagates the factory's error; nothing is cached in that case.
    pub fn get_instance(
        &self,
        factory: &Arc<dyn Factory>,
        config: &Arc<SettingsNode>,
    ) -> SettingsResult<Instance> {
        let key = InstanceKey::new(factory.name(), &config.fingerprint());
        let slot = Arc::clone(lock(&self.slots).entry(key).or_default());

        let mut current = lock(&slot);
        if let Some(instance) = current.as_ref() {
            return Ok(Arc::clone(instance));
        }

        let instance = factory.create(config)?;
        info!(
            factory = factory.name(),
            namespace = config.namespace(),
            path = config.lookup_path(),
            key = %key.to_hex(),
            "Instance created"
        );
        *current = Some(Arc::clone(&instance));
        Ok(instance)
    }

    /// Instantiate the factory named by each node's `CLASS` attribute.
    ///
    /// A node yields one instance; lists and keyed mappings of nodes yield a
    /// same-shaped collection of instances.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidSetting`] if an element is not a
    /// settings node, or any error resolving `CLASS` or running the factory.
    pub fn instantiate(&self, config: &Setting) -> SettingsResult<Setting> {
        self.each_node(config, &|node| {
            let factory = node.factory()?;
            self.get_instance(&factory, node).map(Setting::Instance)
        })
    }

    /// Like [`InstanceCache::instantiate`], but each instance is merged with
    /// its configuration into a [`MergedView`].
    ///
    /// # Errors
    ///
    /// As [`InstanceCache::instantiate`], plus
    /// [`SettingsError::AttributeCollision`].
    pub fn wrap(&self, config: &Setting) -> SettingsResult<Setting> {
        self.each_node(config, &|node| {
            let factory = node.factory()?;
            let instance = self.get_instance(&factory, node)?;
            MergedView::new(instance, Arc::clone(node), factory.name())
                .map(|view| Setting::Wrapped(Arc::new(view)))
        })
    }

    fn each_node(
        &self,
        config: &Setting,
        apply: &dyn Fn(&Arc<SettingsNode>) -> SettingsResult<Setting>,
    ) -> SettingsResult<Setting> {
        match config {
            Setting::Node(node) => apply(node),
            Setting::List(items) => items
                .iter()
                .map(|item| self.each_node(item, apply))
                .collect::<SettingsResult<Vec<_>>>()
                .map(Setting::List),
            Setting::Map(members) => members
                .iter()
                .map(|(key, item)| Ok((key.clone(), self.each_node(item, apply)?)))
                .collect::<SettingsResult<Mapping>>()
                .map(Setting::Map),
            other => Err(SettingsError::InvalidSetting {
                namespace: String::new(),
                path: String::new(),
                name: CLASS.to_owned(),
                reason: format!(
                    "expected a settings node with a {CLASS} attribute, found {}",
                    other.kind()
                ),
            }),
        }
    }

    /// Number of constructed instances. Slots still under construction are
    /// not counted.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.slots)
            .values()
            .filter(|slot| match slot.try_lock() {
                Ok(current) => current.is_some(),
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().is_some(),
                Err(TryLockError::WouldBlock) => false,
            })
            .count()
    }

    /// Whether nothing has been constructed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for InstanceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceCache")
            .field("instances", &self.len())
            .finish()
    }
}

/// Read-only view over an instance and the configuration that built it.
///
/// Lookups consult the configuration first, then the instance.
pub struct MergedView {
    instance: Instance,
    config: Arc<SettingsNode>,
    factory: String,
}

impl MergedView {
    /// Merge `instance` with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::AttributeCollision`] if any key of the
    /// configuration's raw mapping is also a native attribute of the
    /// instance.
    pub fn new(
        instance: Instance,
        config: Arc<SettingsNode>,
        factory: impl Into<String>,
    ) -> SettingsResult<Self> {
        let factory = factory.into();
        if let Some(attribute) = config.raw().keys().find(|key| instance.has_attribute(key)) {
            return Err(SettingsError::AttributeCollision {
                factory,
                attribute: attribute.clone(),
            });
        }
        Ok(Self {
            instance,
            config,
            factory,
        })
    }

    /// Resolve `name` from the configuration, else from the instance.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::AttributeNotFound`] if neither side has it,
    /// or any non-absence error the configuration lookup raises.
    pub fn get(&self, name: &str) -> SettingsResult<Setting> {
        if let Some(value) = self.config.lookup(name)? {
            return Ok(value);
        }
        self.instance
            .attribute(name)
            .ok_or_else(|| SettingsError::AttributeNotFound {
                factory: self.factory.clone(),
                attribute: name.to_owned(),
            })
    }

    /// The wrapped instance.
    #[must_use]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// The configuration node.
    #[must_use]
    pub fn config(&self) -> &Arc<SettingsNode> {
        &self.config
    }

    /// Name of the factory that built the instance.
    #[must_use]
    pub fn factory(&self) -> &str {
        &self.factory
    }
}

impl PartialEq for MergedView {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.instance), Arc::as_ptr(&other.instance))
    }
}

impl fmt::Debug for MergedView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedView")
            .field("factory", &self.factory)
            .field("instance", &self.instance)
            .field("config", &self.config.lookup_path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Debug)]
    struct Gauge;

    impl Component for Gauge {
        fn attribute(&self, name: &str) -> Option<Setting> {
            (name == "kind").then(|| Setting::from("gauge"))
        }
    }

    #[test]
    fn test_key_depends_on_factory_and_config() {
        let a = InstanceKey::new("Redis", &json!({ "URL": "u" }));
        let b = InstanceKey::new("Redis", &json!({ "URL": "u" }));
        let c = InstanceKey::new("Memcached", &json!({ "URL": "u" }));
        let d = InstanceKey::new("Redis", &json!({ "URL": "v" }));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.to_hex().len(), 64);
    }

    #[test]
    fn test_downcast() {
        let instance: Instance = Arc::new(Gauge);
        assert!(downcast::<Gauge>(&instance).is_some());
        assert!(instance.has_attribute("kind"));
        assert!(!instance.has_attribute("other"));
    }

    #[test]
    fn test_instantiate_rejects_plain_values() {
        let cache = InstanceCache::new();
        let err = cache.instantiate(&Setting::from("x")).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidSetting { .. }));
        assert!(cache.is_empty());
    }
}
