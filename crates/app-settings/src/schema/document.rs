//! Serializable schema document.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::SettingsResult;

/// The declarative form of a schema, as written in JSON or TOML.
///
/// Keys follow the wire format: `NAME`, `SETTINGS`, `DEFAULTS`,
/// `IMPORT_STRINGS`, `ONE_TO_MANY`, `LINK`, `INIT`, `VALIDATION_METHOD` and
/// `GLOBALS`. Every key except `NAME` may be omitted.
///
/// `SETTINGS` is either a list of attribute names or a table mapping each
/// name to a leaf marker (`null`, `true`, `""`), a nested table (a
/// dict-shaped attribute with its own whitelist), or, for
/// `_VALIDATE_<name>` entries, the dotted reference of a validator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SchemaDocument {
    /// Namespace identifier. Required.
    pub name: Option<String>,
    /// Whitelist of attribute names.
    pub settings: serde_json::Value,
    /// Default values, nested like the settings they apply to.
    pub defaults: serde_json::Map<String, serde_json::Value>,
    /// Attributes (dotted for nested ones) holding import references.
    pub import_strings: Vec<String>,
    /// Plural alias → `singular` or `singular|filter_field`.
    pub one_to_many: IndexMap<String, String>,
    /// Attribute → `target|filter_field`.
    pub link: IndexMap<String, String>,
    /// Attribute → dotted reference of its init method.
    pub init: IndexMap<String, String>,
    /// Dotted reference of the schema-wide validator.
    pub validation_method: Option<String>,
    /// Attributes that fall back to ancestor nodes.
    pub globals: Vec<String>,
}

impl SchemaDocument {
    /// Deserialize a document from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Parse`](crate::SettingsError::Parse) if the
    /// value does not have the document's shape.
    pub fn from_value(value: serde_json::Value) -> SettingsResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Parse a document from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Parse`](crate::SettingsError::Parse) on
    /// malformed TOML.
    pub fn from_toml_str(text: &str) -> SettingsResult<Self> {
        Ok(toml::from_str(text)?)
    }
}
