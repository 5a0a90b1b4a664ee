#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Lazily-resolved hierarchical application settings.
//!
//! Each configuration namespace is described by a [`Schema`]: the
//! whitelisted attribute names, their defaults, and declarations that turn
//! raw values into richer ones (import references, one-to-many aliases,
//! links between attributes, init methods). Raw settings come from a
//! [`SettingsSource`] and are wrapped in a [`SettingsNode`] that resolves
//! each attribute on first access and memoizes the result.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use app_settings::{AppSettings, Schema, StaticSource, SymbolRegistry};
//! use serde_json::json;
//!
//! let schema = Schema::from_value(
//!     json!({
//!         "NAME": "APP",
//!         "SETTINGS": ["LEVEL", "DEBUG"],
//!         "DEFAULTS": { "LEVEL": 1 },
//!     }),
//!     Arc::new(SymbolRegistry::with_builtins()),
//! )
//! .unwrap();
//! let source = StaticSource::from_value(json!({ "APP": { "DEBUG": true } })).unwrap();
//! let settings = AppSettings::new(schema, Arc::new(source));
//!
//! assert_eq!(settings.get("LEVEL").unwrap().as_i64(), Some(1));
//! ```
//!
//! # Resolution order
//!
//! For every attribute, the first of these that supplies a value wins:
//!
//! 1. The override layer (scoped overrides pushed with
//!    [`AppSettings::override_settings`])
//! 2. The raw namespace settings
//! 3. The fallback node (usually the host's global settings)
//! 4. The singular raw key of a one-to-many alias
//! 5. Ancestor nodes, for attributes declared global
//! 6. Schema defaults
//!
//! The value then goes through default merging, validation, nested
//! wrapping, link following, filter selection, string import and init.

/// Settings error types.
pub mod error;
/// Singleton instances and merged instance views.
pub mod instance;
/// Recursive merging of defaults and overrides.
pub mod merge;
/// Lazily resolved settings nodes.
pub mod node;
/// Override layers.
pub mod overlay;
/// Importable symbols: factories, validators, init methods.
pub mod registry;
/// Schema documents and per-node declaration scopes.
pub mod schema;
/// Raw settings sources and the per-namespace handle.
pub mod source;
/// Schema document validation.
pub mod validate;
/// Dynamic setting values.
pub mod value;

// Re-export primary types at the crate root.
pub use error::{SettingsError, SettingsResult};
pub use instance::{Component, Factory, FnFactory, Instance, InstanceCache, MergedView, downcast};
pub use merge::{FieldSources, ValueSource};
pub use node::{RootOptions, SettingsNode};
pub use overlay::Overlay;
pub use registry::{ImportFailure, Symbol, SymbolKind, SymbolRegistry};
pub use schema::{Schema, SchemaBuilder, SchemaDocument};
pub use source::{AppSettings, OverrideGuard, SettingsSource, StaticSource};
pub use value::{Mapping, Setting};
