//! Settings error types.

use thiserror::Error;

/// Errors produced while building schemas or resolving settings.
///
/// Resolution errors carry the namespace name and the dotted lookup path of
/// the node that raised them so a failure deep inside a nested tree can be
/// located without a debugger.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The attribute is not whitelisted, or nothing in the fallback chain
    /// supplied a value for it.
    #[error("Invalid '{namespace}{path}' setting: '{name}'")]
    UnknownSetting {
        /// Namespace the lookup ran in.
        namespace: String,
        /// Dotted lookup path of the node (prefixed with `.` when non-empty).
        path: String,
        /// Attribute that was requested.
        name: String,
    },

    /// A validator vetoed the value, or the value cannot be normalized.
    #[error("Invalid value for '{namespace}{path}' setting '{name}': {reason}")]
    InvalidSetting {
        /// Namespace the lookup ran in.
        namespace: String,
        /// Dotted lookup path of the node.
        path: String,
        /// Attribute that was requested.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A declared link resolved on neither the namespace root nor the
    /// declaring node.
    #[error("Broken link '{link}' on '{namespace}{path}' setting '{name}' for key '{key}'")]
    BrokenLink {
        /// Namespace the lookup ran in.
        namespace: String,
        /// Dotted lookup path of the node.
        path: String,
        /// Attribute that declares the link.
        name: String,
        /// Link declaration in `target|field` form.
        link: String,
        /// Filter key that could not be matched.
        key: String,
    },

    /// Following links revisited a link that is already being resolved.
    #[error("Link cycle on '{namespace}{path}' setting '{name}' for key '{key}'")]
    LinkCycle {
        /// Namespace the lookup ran in.
        namespace: String,
        /// Dotted lookup path of the node.
        path: String,
        /// Attribute that declares the link.
        name: String,
        /// Filter key being followed when the cycle closed.
        key: String,
    },

    /// An explicit filter found no matching element.
    #[error("No element of '{namespace}{path}' setting '{name}' has {field} == '{value}'")]
    FilterNotMatched {
        /// Namespace the lookup ran in.
        namespace: String,
        /// Dotted lookup path of the node.
        path: String,
        /// Attribute that was filtered.
        name: String,
        /// Field compared on each element.
        field: String,
        /// Value the field had to equal.
        value: String,
    },

    /// A dotted import reference could not be resolved.
    #[error("Could not import '{reference}' for '{namespace}' setting '{path}': {reason}")]
    ImportResolution {
        /// Namespace the lookup ran in.
        namespace: String,
        /// Fully qualified setting path that holds the reference.
        path: String,
        /// The dotted reference.
        reference: String,
        /// Missing module or missing symbol.
        reason: String,
    },

    /// An instance and its configuration both define the same attribute.
    #[error("Can't wrap instance of '{factory}' with its config: attribute '{attribute}' found in both")]
    AttributeCollision {
        /// Factory that produced the instance.
        factory: String,
        /// Attribute present on both sides.
        attribute: String,
    },

    /// Neither the configuration nor the instance has the attribute.
    #[error("Attribute '{attribute}' not found in config/instance of '{factory}'")]
    AttributeNotFound {
        /// Factory that produced the instance.
        factory: String,
        /// Attribute that was requested.
        attribute: String,
    },

    /// A merge tried to override a sibling of a protected default key.
    #[error("Protected setting '{path}' cannot override '{key}'")]
    ProtectedSettingOverride {
        /// Dotted path of the protected mapping.
        path: String,
        /// Offending override key.
        key: String,
    },

    /// Resolution or merge recursion went past the configured limit.
    #[error("Recursion limit of {limit} exceeded at '{path}'")]
    DepthExceeded {
        /// Dotted path where the limit was hit.
        path: String,
        /// The limit.
        limit: usize,
    },

    /// A schema document has no `NAME`.
    #[error("app_config.NAME should be defined")]
    MissingName,

    /// A schema document is structurally invalid.
    #[error("Invalid schema '{namespace}': {message}")]
    InvalidSchema {
        /// Namespace named by the document.
        namespace: String,
        /// What is wrong with it.
        message: String,
    },

    /// A schema or source document failed to parse.
    #[error("Failed to parse {what}: {message}")]
    Parse {
        /// What was being parsed.
        what: String,
        /// Parser message.
        message: String,
    },
}

impl SettingsError {
    /// Whether the error means "nothing was found" rather than "something
    /// was wrong". Link fallback and optional lookups treat these as absence.
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        matches!(
            self,
            Self::UnknownSetting { .. } | Self::FilterNotMatched { .. }
        )
    }
}

impl From<toml::de::Error> for SettingsError {
    fn from(e: toml::de::Error) -> Self {
        Self::Parse {
            what: "TOML document".to_owned(),
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse {
            what: "JSON document".to_owned(),
            message: e.to_string(),
        }
    }
}

/// Result type for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;
