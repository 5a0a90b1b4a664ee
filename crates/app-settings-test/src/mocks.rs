//! Mock factories, components and validators for testing.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use app_settings::{Component, Factory, Instance, Setting, SettingsNode, SettingsResult};

/// Component that exposes the attributes it was built with.
#[derive(Debug)]
pub struct MockComponent {
    /// Name of the factory that built this component.
    pub factory: String,
    /// Native attributes.
    pub attributes: Vec<(String, Setting)>,
}

impl Component for MockComponent {
    fn attribute(&self, name: &str) -> Option<Setting> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }
}

/// Factory that builds a [`MockComponent`] and counts its invocations.
///
/// Each settings name in `copied` is resolved on the configuration node and
/// copied onto the component as a native attribute named in lowercase.
#[derive(Debug, Clone)]
pub struct MockFactory {
    name: String,
    copied: Vec<String>,
    native: Vec<(String, Setting)>,
    created: Arc<AtomicUsize>,
}

impl MockFactory {
    /// Create a factory called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            copied: Vec::new(),
            native: Vec::new(),
            created: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Copy the resolved setting `name` onto each component.
    #[must_use]
    pub fn copying(mut self, name: impl Into<String>) -> Self {
        self.copied.push(name.into());
        self
    }

    /// Give each component a fixed native attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Setting>) -> Self {
        self.native.push((name.into(), value.into()));
        self
    }

    /// Shared counter of constructed components.
    #[must_use]
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.created)
    }

    /// Number of components constructed so far.
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl Factory for MockFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, settings: &Arc<SettingsNode>) -> SettingsResult<Instance> {
        let mut attributes = self.native.clone();
        for name in &self.copied {
            attributes.push((name.to_lowercase(), settings.get(name)?));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockComponent {
            factory: self.name.clone(),
            attributes,
        }))
    }
}

/// Validator that accepts everything and counts its calls.
#[derive(Debug, Clone, Default)]
pub struct CountingValidator {
    calls: Arc<AtomicUsize>,
}

impl CountingValidator {
    /// Create a validator with a zeroed counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of validations performed so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The validator callable, sharing this counter.
    pub fn callable(&self) -> impl Fn(&str, &Setting) -> bool + Send + Sync + 'static {
        let calls = Arc::clone(&self.calls);
        move |_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            true
        }
    }
}
