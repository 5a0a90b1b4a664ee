//! Immutable description of one configuration namespace.
//!
//! A [`Schema`] is built once from a [`SchemaDocument`] (deserialized from
//! JSON or TOML, or assembled with [`SchemaBuilder`]) and then shared by
//! every node of its namespace.

mod document;
mod scope;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

pub use document::SchemaDocument;
pub use scope::{
    Alias, CLASS, DEPRECATED_PREFIX, INSTANCE, Link, NAMED_COLLECTION_SUFFIX, PARENT, Scope,
    VALIDATE_PREFIX, is_named_collection,
};

use crate::error::SettingsResult;
use crate::merge::{get_nested, split_path};
use crate::registry::{ImportFailure, Symbol, SymbolRegistry, Validator};
use crate::validate::{resolve_validator, validate_document};
use crate::value::{Setting, mapping_from_json};

/// A validated, immutable schema.
pub struct Schema {
    name: String,
    root: Arc<Scope>,
    globals: HashSet<String>,
    validation_method: Option<Validator>,
    registry: Arc<SymbolRegistry>,
    document: SchemaDocument,
    identity: String,
}

impl Schema {
    /// Build a schema from a document, importing symbols from `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::MissingName`](crate::SettingsError::MissingName)
    /// without a `NAME`, [`SettingsError::InvalidSchema`](crate::SettingsError::InvalidSchema)
    /// for malformed declarations, and
    /// [`SettingsError::ImportResolution`](crate::SettingsError::ImportResolution)
    /// when a declared validator cannot be imported.
    pub fn from_document(
        document: SchemaDocument,
        registry: Arc<SymbolRegistry>,
    ) -> SettingsResult<Arc<Self>> {
        validate_document(&document, &registry)?;
        let name = document.name.clone().unwrap_or_default();

        let validation_method = document
            .validation_method
            .as_deref()
            .map(|reference| resolve_validator(&name, "VALIDATION_METHOD", reference, &registry))
            .transpose()?;

        let whitelist = match &document.settings {
            serde_json::Value::Object(entries) => entries.clone(),
            serde_json::Value::Array(names) => names
                .iter()
                .filter_map(serde_json::Value::as_str)
                .map(|n| (n.to_owned(), serde_json::Value::Null))
                .collect(),
            _ => serde_json::Map::new(),
        };
        let aliases = document
            .one_to_many
            .iter()
            .filter_map(|(plural, decl)| Alias::parse(decl).map(|a| (plural.clone(), a)))
            .collect();
        let links = document
            .link
            .iter()
            .filter_map(|(attr, decl)| Link::parse(decl).map(|l| (attr.clone(), l)))
            .collect();
        let root = Scope::closed(
            whitelist,
            mapping_from_json(document.defaults.clone()),
            aliases,
            links,
            document.import_strings.clone(),
            document.init.clone(),
        );

        tracing::debug!(namespace = %name, "schema built");

        Ok(Arc::new(Self {
            identity: document_identity(&document),
            globals: document.globals.iter().cloned().collect(),
            name,
            root: Arc::new(root),
            validation_method,
            registry,
            document,
        }))
    }

    /// Deserialize and build a schema from a JSON value.
    ///
    /// # Errors
    ///
    /// See [`Schema::from_document`]; also fails with
    /// [`SettingsError::Parse`](crate::SettingsError::Parse).
    pub fn from_value(
        value: serde_json::Value,
        registry: Arc<SymbolRegistry>,
    ) -> SettingsResult<Arc<Self>> {
        Self::from_document(SchemaDocument::from_value(value)?, registry)
    }

    /// Parse and build a schema from TOML text.
    ///
    /// # Errors
    ///
    /// See [`Schema::from_value`].
    pub fn from_toml_str(text: &str, registry: Arc<SymbolRegistry>) -> SettingsResult<Arc<Self>> {
        Self::from_document(SchemaDocument::from_toml_str(text)?, registry)
    }

    /// A schema accepting every attribute and declaring nothing, used to
    /// wrap a host application's global settings as a fallback namespace.
    #[must_use]
    pub fn open(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        let document = SchemaDocument {
            name: Some(name.clone()),
            ..SchemaDocument::default()
        };
        Arc::new(Self {
            root: Arc::new(Scope::open()),
            globals: HashSet::new(),
            validation_method: None,
            registry: Arc::new(SymbolRegistry::with_builtins()),
            identity: format!("open:{}", document_identity(&document)),
            document,
            name,
        })
    }

    /// Start a programmatic schema.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    /// Namespace identifier.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hex digest of the document this schema was built from. Part of every
    /// node fingerprint.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Declarations seen by the namespace root.
    #[must_use]
    pub fn root_scope(&self) -> &Arc<Scope> {
        &self.root
    }

    /// Whether `name` falls back to ancestor nodes.
    #[must_use]
    pub fn is_global(&self, name: &str) -> bool {
        self.globals.contains(name)
    }

    /// The schema-wide validator.
    #[must_use]
    pub fn validation_method(&self) -> Option<&Validator> {
        self.validation_method.as_ref()
    }

    /// Registry dotted references are imported from.
    #[must_use]
    pub fn registry(&self) -> &Arc<SymbolRegistry> {
        &self.registry
    }

    /// The document this schema was built from.
    #[must_use]
    pub fn document(&self) -> &SchemaDocument {
        &self.document
    }

    /// Import a dotted reference from this schema's registry.
    ///
    /// # Errors
    ///
    /// Returns the [`ImportFailure`] reported by the registry.
    pub fn import(&self, reference: &str) -> Result<Symbol, ImportFailure> {
        self.registry.import(reference)
    }

    /// Look up a default by dotted path, e.g. `"BACKEND.STORE"`.
    #[must_use]
    pub fn default_at(&self, path: &str) -> Option<&Setting> {
        get_nested(self.root.defaults(), &split_path(path)?)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("open", &self.root.is_open())
            .field("globals", &self.globals)
            .finish_non_exhaustive()
    }
}

/// Assembles a [`SchemaDocument`] in code.
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    document: SchemaDocument,
    entries: serde_json::Map<String, serde_json::Value>,
}

impl SchemaBuilder {
    /// Start a schema for namespace `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            document: SchemaDocument {
                name: Some(name.into()),
                ..SchemaDocument::default()
            },
            entries: serde_json::Map::new(),
        }
    }

    /// Whitelist a leaf attribute.
    #[must_use]
    pub fn setting(mut self, name: impl Into<String>) -> Self {
        self.entries.insert(name.into(), serde_json::Value::Null);
        self
    }

    /// Whitelist a dict-shaped attribute with its own nested whitelist.
    #[must_use]
    pub fn nested(mut self, name: impl Into<String>, whitelist: serde_json::Value) -> Self {
        self.entries.insert(name.into(), whitelist);
        self
    }

    /// Set a default value.
    #[must_use]
    pub fn default(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.document.defaults.insert(name.into(), value);
        self
    }

    /// Declare an attribute (dotted for nested ones) as holding import
    /// references.
    #[must_use]
    pub fn import_string(mut self, name: impl Into<String>) -> Self {
        self.document.import_strings.push(name.into());
        self
    }

    /// Declare a one-to-many alias, `singular` or `singular|field`.
    #[must_use]
    pub fn one_to_many(mut self, plural: impl Into<String>, decl: impl Into<String>) -> Self {
        self.document.one_to_many.insert(plural.into(), decl.into());
        self
    }

    /// Declare a link, `target|field`.
    #[must_use]
    pub fn link(mut self, name: impl Into<String>, decl: impl Into<String>) -> Self {
        self.document.link.insert(name.into(), decl.into());
        self
    }

    /// Declare the init method of an attribute.
    #[must_use]
    pub fn init(mut self, name: impl Into<String>, reference: impl Into<String>) -> Self {
        self.document.init.insert(name.into(), reference.into());
        self
    }

    /// Set the schema-wide validator reference.
    #[must_use]
    pub fn validation_method(mut self, reference: impl Into<String>) -> Self {
        self.document.validation_method = Some(reference.into());
        self
    }

    /// Mark an attribute as falling back to ancestor nodes.
    #[must_use]
    pub fn global(mut self, name: impl Into<String>) -> Self {
        self.document.globals.push(name.into());
        self
    }

    /// Attach a per-attribute validator reference.
    #[must_use]
    pub fn validate(mut self, name: &str, reference: impl Into<String>) -> Self {
        self.entries.insert(
            format!("{VALIDATE_PREFIX}{name}"),
            serde_json::Value::String(reference.into()),
        );
        self
    }

    /// Mark an attribute as deprecated.
    #[must_use]
    pub fn deprecate(mut self, name: &str) -> Self {
        self.entries
            .insert(format!("{DEPRECATED_PREFIX}{name}"), serde_json::Value::Null);
        self
    }

    /// The document assembled so far.
    #[must_use]
    pub fn into_document(self) -> SchemaDocument {
        SchemaDocument {
            settings: serde_json::Value::Object(self.entries),
            ..self.document
        }
    }

    /// Validate and build the schema.
    ///
    /// # Errors
    ///
    /// See [`Schema::from_document`].
    pub fn build(self, registry: Arc<SymbolRegistry>) -> SettingsResult<Arc<Schema>> {
        Schema::from_document(self.into_document(), registry)
    }
}

fn document_identity(document: &SchemaDocument) -> String {
    let bytes = serde_json::to_vec(document).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}
