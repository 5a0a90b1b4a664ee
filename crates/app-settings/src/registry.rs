//! Dotted-path symbol registry.
//!
//! Settings refer to code (factories, validators, init methods) by dotted
//! `module.path.Identifier` strings. The registry is the explicitly passed
//! table those strings are imported from: a missing module and a missing
//! symbol are reported separately.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{SettingsError, SettingsResult};
use crate::instance::{Factory, InstanceCache};
use crate::value::Setting;

/// Module under which the built-in initializers are registered.
pub const INIT_MODULE: &str = "app_settings.init";

/// Validator callable: `(attribute name, value) -> accepted`.
pub type Validator = Arc<dyn Fn(&str, &Setting) -> bool + Send + Sync>;

/// Init method callable. Receives one settings node at a time.
pub type Initializer =
    Arc<dyn Fn(&Setting, &InstanceCache) -> SettingsResult<Setting> + Send + Sync>;

/// What a registered symbol is.
#[derive(Clone)]
pub enum SymbolKind {
    /// Constructs instances from a settings node.
    Factory(Arc<dyn Factory>),
    /// Init method applied by the init stage.
    Initializer(Initializer),
    /// Validator consulted by the validation stage.
    Validator(Validator),
    /// Plain value.
    Constant(Arc<Setting>),
}

impl SymbolKind {
    fn label(&self) -> &'static str {
        match self {
            Self::Factory(_) => "factory",
            Self::Initializer(_) => "initializer",
            Self::Validator(_) => "validator",
            Self::Constant(_) => "constant",
        }
    }
}

/// An imported symbol together with the dotted path it was imported from.
#[derive(Clone)]
pub struct Symbol {
    path: String,
    kind: SymbolKind,
}

impl Symbol {
    /// Dotted path the symbol was imported from.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The symbol itself.
    #[must_use]
    pub fn kind(&self) -> &SymbolKind {
        &self.kind
    }

    /// The factory, if this symbol is one.
    #[must_use]
    pub fn as_factory(&self) -> Option<&Arc<dyn Factory>> {
        match &self.kind {
            SymbolKind::Factory(f) => Some(f),
            _ => None,
        }
    }

    /// The initializer, if this symbol is one.
    #[must_use]
    pub fn as_initializer(&self) -> Option<&Initializer> {
        match &self.kind {
            SymbolKind::Initializer(i) => Some(i),
            _ => None,
        }
    }

    /// The validator, if this symbol is one.
    #[must_use]
    pub fn as_validator(&self) -> Option<&Validator> {
        match &self.kind {
            SymbolKind::Validator(v) => Some(v),
            _ => None,
        }
    }

    /// The constant, if this symbol is one.
    #[must_use]
    pub fn as_constant(&self) -> Option<&Setting> {
        match &self.kind {
            SymbolKind::Constant(c) => Some(c.as_ref()),
            _ => None,
        }
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} {}>", self.kind.label(), self.path)
    }
}

/// Why an import failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportFailure {
    /// The reference has no module part.
    NotDotted,
    /// No module registered under this path.
    MissingModule(String),
    /// The module exists but does not define the symbol.
    MissingSymbol {
        /// Module that was found.
        module: String,
        /// Identifier that was not.
        name: String,
    },
}

impl fmt::Display for ImportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotDotted => write!(f, "not a dotted module.path.Identifier reference"),
            Self::MissingModule(module) => write!(f, "no module named '{module}'"),
            Self::MissingSymbol { module, name } => {
                write!(f, "module '{module}' has no attribute '{name}'")
            },
        }
    }
}

/// Table of importable symbols grouped by module path.
#[derive(Clone, Default)]
pub struct SymbolRegistry {
    modules: HashMap<String, HashMap<String, SymbolKind>>,
}

impl SymbolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in initializers under
    /// [`INIT_MODULE`]: `get_class_from_config` and `wrap_class_with_config`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let instantiate: Initializer =
            Arc::new(|config: &Setting, cache: &InstanceCache| cache.instantiate(config));
        let wrap: Initializer =
            Arc::new(|config: &Setting, cache: &InstanceCache| cache.wrap(config));
        registry
            .modules
            .entry(INIT_MODULE.to_owned())
            .or_default()
            .extend([
                (
                    "get_class_from_config".to_owned(),
                    SymbolKind::Initializer(instantiate),
                ),
                (
                    "wrap_class_with_config".to_owned(),
                    SymbolKind::Initializer(wrap),
                ),
            ]);
        registry
    }

    /// Declare a module with no symbols yet.
    pub fn register_module(&mut self, module: impl Into<String>) {
        self.modules.entry(module.into()).or_default();
    }

    /// Register a symbol under a dotted path, creating its module.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::ImportResolution`] if `path` has no module
    /// part.
    pub fn register(&mut self, path: &str, kind: SymbolKind) -> SettingsResult<()> {
        let (module, name) = split_reference(path).ok_or_else(|| {
            SettingsError::ImportResolution {
                namespace: String::new(),
                path: String::new(),
                reference: path.to_owned(),
                reason: ImportFailure::NotDotted.to_string(),
            }
        })?;
        self.modules
            .entry(module.to_owned())
            .or_default()
            .insert(name.to_owned(), kind);
        Ok(())
    }

    /// Register a factory under a dotted path.
    ///
    /// # Errors
    ///
    /// See [`SymbolRegistry::register`].
    pub fn register_factory(
        &mut self,
        path: &str,
        factory: impl Factory + 'static,
    ) -> SettingsResult<()> {
        self.register(path, SymbolKind::Factory(Arc::new(factory)))
    }

    /// Register a validator under a dotted path.
    ///
    /// # Errors
    ///
    /// See [`SymbolRegistry::register`].
    pub fn register_validator(
        &mut self,
        path: &str,
        validator: impl Fn(&str, &Setting) -> bool + Send + Sync + 'static,
    ) -> SettingsResult<()> {
        self.register(path, SymbolKind::Validator(Arc::new(validator)))
    }

    /// Register an init method under a dotted path.
    ///
    /// # Errors
    ///
    /// See [`SymbolRegistry::register`].
    pub fn register_initializer(
        &mut self,
        path: &str,
        initializer: impl Fn(&Setting, &InstanceCache) -> SettingsResult<Setting>
        + Send
        + Sync
        + 'static,
    ) -> SettingsResult<()> {
        self.register(path, SymbolKind::Initializer(Arc::new(initializer)))
    }

    /// Import the symbol a dotted reference names.
    ///
    /// # Errors
    ///
    /// Returns an [`ImportFailure`] naming the missing module or symbol.
    pub fn import(&self, reference: &str) -> Result<Symbol, ImportFailure> {
        let (module, name) = split_reference(reference).ok_or(ImportFailure::NotDotted)?;
        let symbols = self
            .modules
            .get(module)
            .ok_or_else(|| ImportFailure::MissingModule(module.to_owned()))?;
        let kind = symbols
            .get(name)
            .ok_or_else(|| ImportFailure::MissingSymbol {
                module: module.to_owned(),
                name: name.to_owned(),
            })?;
        Ok(Symbol {
            path: reference.to_owned(),
            kind: kind.clone(),
        })
    }

    /// Number of registered symbols across all modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.values().map(HashMap::len).sum()
    }

    /// Whether no symbols are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SymbolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut modules: Vec<&String> = self.modules.keys().collect();
        modules.sort();
        f.debug_struct("SymbolRegistry")
            .field("modules", &modules)
            .finish()
    }
}

/// Split `a.b.Name` into (`a.b`, `Name`).
fn split_reference(reference: &str) -> Option<(&str, &str)> {
    let (module, name) = reference.rsplit_once('.')?;
    (!module.is_empty() && !name.is_empty()).then_some((module, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_initializers() {
        let registry = SymbolRegistry::with_builtins();
        let symbol = registry
            .import("app_settings.init.get_class_from_config")
            .unwrap();
        assert!(symbol.as_initializer().is_some());
        assert_eq!(symbol.path(), "app_settings.init.get_class_from_config");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_import_distinguishes_module_and_symbol() {
        let mut registry = SymbolRegistry::new();
        registry
            .register(
                "my_app.consts.LIMIT",
                SymbolKind::Constant(Arc::new(Setting::from(3))),
            )
            .unwrap();

        assert_eq!(
            registry.import("other.LIMIT").unwrap_err(),
            ImportFailure::MissingModule("other".to_owned())
        );
        assert_eq!(
            registry.import("my_app.consts.OTHER").unwrap_err(),
            ImportFailure::MissingSymbol {
                module: "my_app.consts".to_owned(),
                name: "OTHER".to_owned(),
            }
        );
        assert_eq!(
            registry.import("LIMIT").unwrap_err(),
            ImportFailure::NotDotted
        );
        let symbol = registry.import("my_app.consts.LIMIT").unwrap();
        assert_eq!(symbol.as_constant(), Some(&Setting::from(3)));
    }

    #[test]
    fn test_register_rejects_undotted_path() {
        let mut registry = SymbolRegistry::new();
        let err = registry
            .register_validator("validate", |_, _| true)
            .unwrap_err();
        assert!(matches!(err, SettingsError::ImportResolution { .. }));
    }

    #[test]
    fn test_empty_module_reports_missing_symbol() {
        let mut registry = SymbolRegistry::new();
        registry.register_module("my_app.backends");
        assert!(matches!(
            registry.import("my_app.backends.Redis"),
            Err(ImportFailure::MissingSymbol { .. })
        ));
    }
}
