use indexmap::IndexMap;

/// Which precedence layer supplied an attribute's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// Runtime override layer.
    Overlay,
    /// The node's own raw mapping.
    Raw,
    /// The fallback namespace.
    Fallback,
    /// The singular raw key of a one-to-many alias.
    Alias,
    /// An ancestor node, for a global attribute.
    Ancestor,
    /// The schema defaults.
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Overlay => write!(f, "overlay"),
            Self::Raw => write!(f, "raw settings"),
            Self::Fallback => write!(f, "fallback settings"),
            Self::Alias => write!(f, "one-to-many alias"),
            Self::Ancestor => write!(f, "ancestor (global)"),
            Self::Default => write!(f, "defaults"),
        }
    }
}

/// Tracks which layer supplied each resolved attribute.
pub type FieldSources = IndexMap<String, ValueSource>;
