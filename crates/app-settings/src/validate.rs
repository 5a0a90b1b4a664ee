//! Schema document validation.
//!
//! Checks that a [`SchemaDocument`] is structurally sound before a
//! [`Schema`](crate::Schema) is built from it, and that every validator it
//! references can be imported from the registry.

use crate::error::{SettingsError, SettingsResult};
use crate::registry::{SymbolRegistry, Validator};
use crate::schema::{Alias, Link, SchemaDocument, VALIDATE_PREFIX};

/// Validate a schema document against the registry it will import from.
///
/// # Errors
///
/// Returns [`SettingsError::MissingName`] if `NAME` is absent or empty, and
/// [`SettingsError::InvalidSchema`] for the first structural problem found.
pub fn validate_document(doc: &SchemaDocument, registry: &SymbolRegistry) -> SettingsResult<()> {
    let name = match doc.name.as_deref() {
        Some(name) if !name.trim().is_empty() => name,
        _ => return Err(SettingsError::MissingName),
    };

    validate_settings(name, &doc.settings, "", registry)?;
    validate_one_to_many(name, doc)?;
    validate_links(name, doc)?;
    validate_import_strings(name, doc)?;
    validate_globals(name, doc)?;
    Ok(())
}

/// Resolve the schema-wide `VALIDATION_METHOD`, if declared.
///
/// # Errors
///
/// Returns [`SettingsError::ImportResolution`] if the reference cannot be
/// imported and [`SettingsError::InvalidSchema`] if it names something other
/// than a validator.
pub(crate) fn resolve_validator(
    namespace: &str,
    path: &str,
    reference: &str,
    registry: &SymbolRegistry,
) -> SettingsResult<Validator> {
    let symbol = registry
        .import(reference)
        .map_err(|failure| SettingsError::ImportResolution {
            namespace: namespace.to_owned(),
            path: path.to_owned(),
            reference: reference.to_owned(),
            reason: failure.to_string(),
        })?;
    symbol
        .as_validator()
        .cloned()
        .ok_or_else(|| SettingsError::InvalidSchema {
            namespace: namespace.to_owned(),
            message: format!("'{reference}' for '{path}' is not a validator"),
        })
}

fn invalid(namespace: &str, message: String) -> SettingsError {
    SettingsError::InvalidSchema {
        namespace: namespace.to_owned(),
        message,
    }
}

fn validate_settings(
    namespace: &str,
    settings: &serde_json::Value,
    prefix: &str,
    registry: &SymbolRegistry,
) -> SettingsResult<()> {
    match settings {
        serde_json::Value::Null => Ok(()),
        serde_json::Value::Array(names) => {
            if let Some(bad) = names.iter().find(|n| !n.is_string()) {
                return Err(invalid(
                    namespace,
                    format!("SETTINGS{prefix} lists a non-string name: {bad}"),
                ));
            }
            Ok(())
        },
        serde_json::Value::Object(entries) => {
            for (key, entry) in entries {
                let path = format!("{prefix}.{key}");
                if let Some(attr) = key.strip_prefix(VALIDATE_PREFIX)
                    && let Some(reference) = entry.as_str()
                    && !reference.is_empty()
                {
                    resolve_validator(namespace, attr, reference, registry)?;
                    continue;
                }
                if entry.is_object() {
                    validate_settings(namespace, entry, &path, registry)?;
                }
            }
            Ok(())
        },
        other => Err(invalid(
            namespace,
            format!("SETTINGS{prefix} must be a list or a table, found {other}"),
        )),
    }
}

fn validate_one_to_many(namespace: &str, doc: &SchemaDocument) -> SettingsResult<()> {
    for (plural, decl) in &doc.one_to_many {
        let Some(alias) = Alias::parse(decl) else {
            return Err(invalid(
                namespace,
                format!("ONE_TO_MANY.{plural} must be 'singular' or 'singular|field', found '{decl}'"),
            ));
        };
        if alias.raw == *plural {
            return Err(invalid(
                namespace,
                format!("ONE_TO_MANY.{plural} aliases itself"),
            ));
        }
    }
    Ok(())
}

fn validate_links(namespace: &str, doc: &SchemaDocument) -> SettingsResult<()> {
    match doc
        .link
        .iter()
        .find(|(_, decl)| Link::parse(decl).is_none())
    {
        Some((attr, decl)) => Err(invalid(
            namespace,
            format!("LINK.{attr} must be 'target|field', found '{decl}'"),
        )),
        None => Ok(()),
    }
}

fn validate_import_strings(namespace: &str, doc: &SchemaDocument) -> SettingsResult<()> {
    for entry in &doc.import_strings {
        let mut current = &doc.settings;
        let mut nested = false;
        for segment in entry.split('.') {
            nested = false;
            match current.get(segment) {
                Some(sub) if sub.is_object() => {
                    current = sub;
                    nested = true;
                },
                _ => break,
            }
        }
        if nested {
            return Err(invalid(
                namespace,
                format!("IMPORT_STRINGS entry '{entry}' names a nested SETTINGS table"),
            ));
        }
    }
    Ok(())
}

fn validate_globals(namespace: &str, doc: &SchemaDocument) -> SettingsResult<()> {
    match doc.globals.iter().find(|g| g.is_empty() || g.contains('.')) {
        Some(bad) => Err(invalid(
            namespace,
            format!("GLOBALS entry '{bad}' must be a plain attribute name"),
        )),
        None => Ok(()),
    }
}
