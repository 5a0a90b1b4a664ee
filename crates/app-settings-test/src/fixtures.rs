//! Test fixtures: schemas, raw settings and sources.

use std::sync::Arc;

use app_settings::{Mapping, Schema, Setting, SettingsSource, StaticSource, SymbolRegistry};
use serde_json::{Value, json};

/// Convert a JSON object literal into a [`Mapping`].
///
/// # Panics
///
/// Panics if `value` is not a JSON object.
#[must_use]
pub fn mapping(value: Value) -> Mapping {
    match Setting::from(value) {
        Setting::Map(map) => map,
        other => panic!("expected a JSON object, found {}", other.kind()),
    }
}

/// Build a schema from a JSON document with the built-in registry.
///
/// # Panics
///
/// Panics if the document is not a valid schema.
#[must_use]
pub fn test_schema(document: Value) -> Arc<Schema> {
    test_schema_with(document, SymbolRegistry::with_builtins())
}

/// Build a schema from a JSON document with a custom registry.
///
/// # Panics
///
/// Panics if the document is not a valid schema.
#[must_use]
pub fn test_schema_with(document: Value, registry: SymbolRegistry) -> Arc<Schema> {
    match Schema::from_value(document, Arc::new(registry)) {
        Ok(schema) => schema,
        Err(e) => panic!("invalid test schema: {e}"),
    }
}

/// `APP` namespace with `DEBUG` and `LEVEL`; `LEVEL` defaults to 1.
#[must_use]
pub fn level_schema() -> Arc<Schema> {
    test_schema(json!({
        "NAME": "APP",
        "SETTINGS": { "DEBUG": null, "LEVEL": null },
        "DEFAULTS": { "LEVEL": 1 },
    }))
}

/// `APP` namespace with a `BACKENDS` collection keyed by `NAME`, read
/// through the singular `BACKEND`, and a `DEFAULT_BACKEND` link into it.
#[must_use]
pub fn backends_schema() -> Arc<Schema> {
    test_schema(json!({
        "NAME": "APP",
        "SETTINGS": {
            "LEVEL": null,
            "DEFAULT_BACKEND": null,
            "BACKEND": { "NAME": null, "URL": null, "TIMEOUT": null },
        },
        "DEFAULTS": { "LEVEL": 1 },
        "ONE_TO_MANY": { "BACKENDS": "BACKEND|NAME" },
        "LINK": { "DEFAULT_BACKEND": "BACKENDS|NAME" },
    }))
}

/// Two backends, `primary` and `replica`, with `primary` as the default.
#[must_use]
pub fn backends_settings() -> Mapping {
    mapping(json!({
        "BACKENDS": [
            { "NAME": "primary", "URL": "postgres://primary", "TIMEOUT": 5 },
            { "NAME": "replica", "URL": "postgres://replica", "TIMEOUT": 30 },
        ],
        "DEFAULT_BACKEND": "primary",
    }))
}

/// A source holding [`backends_settings`] under `APP`.
#[must_use]
pub fn backends_source() -> Arc<dyn SettingsSource> {
    Arc::new(StaticSource::new().with_namespace("APP", backends_settings()))
}

/// A source holding `raw` under `namespace`.
#[must_use]
pub fn source_with(namespace: &str, raw: Value) -> Arc<dyn SettingsSource> {
    Arc::new(StaticSource::new().with_namespace(namespace, mapping(raw)))
}
