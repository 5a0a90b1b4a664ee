//! The slice of a schema that applies to one node.
//!
//! The root node sees the whole document. A child created for attribute
//! `X` sees `SETTINGS[X]` as its whitelist, `DEFAULTS[X]` as its defaults,
//! and every `X.`-prefixed import, alias, link and init declaration with the
//! prefix stripped.

use indexmap::IndexMap;

use crate::value::{Mapping, Setting};

/// Returns the parent node.
pub const PARENT: &str = "_PARENT";
/// Triggers factory-init on the node itself.
pub const INSTANCE: &str = "_INSTANCE";
/// Whitelist prefix for a per-attribute validator reference.
pub const VALIDATE_PREFIX: &str = "_VALIDATE_";
/// Whitelist prefix marking an attribute as deprecated.
pub const DEPRECATED_PREFIX: &str = "_DEPRECATED_";
/// Attribute naming the factory of a configuration node.
pub const CLASS: &str = "CLASS";
/// Attribute-name suffix marking a named collection of nested nodes.
pub const NAMED_COLLECTION_SUFFIX: &str = "_ITEMS";

/// A one-to-many alias: a plural name read through a singular raw key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    /// Singular raw key.
    pub raw: String,
    /// Field members are keyed by, if any.
    pub filter: Option<String>,
}

impl Alias {
    /// Parse `singular` or `singular|field`.
    #[must_use]
    pub fn parse(decl: &str) -> Option<Self> {
        match decl.split_once('|') {
            Some((raw, field)) if !raw.is_empty() && !field.is_empty() => Some(Self {
                raw: raw.to_owned(),
                filter: Some(field.to_owned()),
            }),
            Some(_) => None,
            None if !decl.is_empty() => Some(Self {
                raw: decl.to_owned(),
                filter: None,
            }),
            None => None,
        }
    }
}

/// A link: the attribute's value is a filter key into another attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Attribute looked up on the namespace root.
    pub target: String,
    /// Field of the target's elements compared with the key.
    pub field: String,
}

impl Link {
    /// Parse `target|field`.
    #[must_use]
    pub fn parse(decl: &str) -> Option<Self> {
        let (target, field) = decl.split_once('|')?;
        (!target.is_empty() && !field.is_empty()).then(|| Self {
            target: target.to_owned(),
            field: field.to_owned(),
        })
    }
}

impl std::fmt::Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}", self.target, self.field)
    }
}

#[derive(Debug, Clone)]
enum Whitelist {
    Closed(serde_json::Map<String, serde_json::Value>),
    Open,
}

/// Declarations visible to one node.
#[derive(Debug, Clone)]
pub struct Scope {
    whitelist: Whitelist,
    defaults: Mapping,
    aliases: IndexMap<String, Alias>,
    links: IndexMap<String, Link>,
    imports: Vec<String>,
    inits: IndexMap<String, String>,
}

impl Scope {
    pub(crate) fn closed(
        whitelist: serde_json::Map<String, serde_json::Value>,
        defaults: Mapping,
        aliases: IndexMap<String, Alias>,
        links: IndexMap<String, Link>,
        imports: Vec<String>,
        inits: IndexMap<String, String>,
    ) -> Self {
        Self {
            whitelist: Whitelist::Closed(whitelist),
            defaults,
            aliases,
            links,
            imports,
            inits,
        }
    }

    /// A scope that accepts every attribute and declares nothing.
    #[must_use]
    pub fn open() -> Self {
        Self {
            whitelist: Whitelist::Open,
            defaults: Mapping::new(),
            aliases: IndexMap::new(),
            links: IndexMap::new(),
            imports: Vec::new(),
            inits: IndexMap::new(),
        }
    }

    /// Whether any attribute name is accepted.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self.whitelist, Whitelist::Open)
    }

    /// Whether `name` may be requested on a node with this scope.
    #[must_use]
    pub fn allows(&self, name: &str) -> bool {
        match &self.whitelist {
            Whitelist::Open => true,
            Whitelist::Closed(entries) => {
                entries.contains_key(name) || self.aliases.contains_key(name)
            },
        }
    }

    /// Whitelisted attribute names, without validator and deprecation
    /// markers.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        match &self.whitelist {
            Whitelist::Open => Vec::new(),
            Whitelist::Closed(entries) => entries
                .keys()
                .map(String::as_str)
                .filter(|name| {
                    !name.starts_with(VALIDATE_PREFIX) && !name.starts_with(DEPRECATED_PREFIX)
                })
                .collect(),
        }
    }

    fn entry(&self, name: &str) -> Option<&serde_json::Value> {
        match &self.whitelist {
            Whitelist::Open => None,
            Whitelist::Closed(entries) => entries.get(name),
        }
    }

    /// Whether the whitelist gives `name` its own nested whitelist.
    #[must_use]
    pub fn is_dict_shaped(&self, name: &str) -> bool {
        self.entry(name).is_some_and(serde_json::Value::is_object)
    }

    /// Whether values of `name` are wrapped into child nodes.
    #[must_use]
    pub fn is_nested(&self, name: &str) -> bool {
        self.is_dict_shaped(name)
            || self
                .alias(name)
                .is_some_and(|alias| self.is_dict_shaped(&alias.raw))
            || is_named_collection(name)
    }

    /// Whether `name` holds a mapping of members keyed by name.
    #[must_use]
    pub fn is_keyed_collection(&self, name: &str) -> bool {
        self.alias(name).is_some_and(|alias| alias.filter.is_some()) || is_named_collection(name)
    }

    /// The one-to-many alias declared for `name`.
    #[must_use]
    pub fn alias(&self, name: &str) -> Option<&Alias> {
        self.aliases.get(name)
    }

    /// The link declared for `name` or its singular raw key.
    #[must_use]
    pub fn link(&self, name: &str) -> Option<&Link> {
        self.links.get(name).or_else(|| {
            self.alias(name)
                .and_then(|alias| self.links.get(&alias.raw))
        })
    }

    /// Whether `name` or its singular raw key holds import references.
    #[must_use]
    pub fn is_import(&self, name: &str) -> bool {
        let declared = |n: &str| self.imports.iter().any(|i| i == n);
        declared(name) || self.alias(name).is_some_and(|alias| declared(&alias.raw))
    }

    /// The init method reference for `name` or its singular raw key.
    #[must_use]
    pub fn init(&self, name: &str) -> Option<&str> {
        self.inits
            .get(name)
            .or_else(|| self.alias(name).and_then(|alias| self.inits.get(&alias.raw)))
            .map(String::as_str)
    }

    /// The non-null default for `name`.
    #[must_use]
    pub fn default_for(&self, name: &str) -> Option<&Setting> {
        self.defaults.get(name).filter(|v| !v.is_null())
    }

    /// All defaults of this scope.
    #[must_use]
    pub fn defaults(&self) -> &Mapping {
        &self.defaults
    }

    /// Reference of the per-attribute validator for `name`.
    #[must_use]
    pub fn validator_ref(&self, name: &str) -> Option<&str> {
        self.entry(&format!("{VALIDATE_PREFIX}{name}"))
            .and_then(serde_json::Value::as_str)
            .filter(|reference| !reference.is_empty())
    }

    /// Whether `name` is marked deprecated.
    #[must_use]
    pub fn is_deprecated(&self, name: &str) -> bool {
        self.entry(&format!("{DEPRECATED_PREFIX}{name}")).is_some()
    }

    /// Derive the scope of a child node created for `name`.
    ///
    /// `decl` is the name the child's declarations are filed under: the
    /// singular raw key for a one-to-many alias, otherwise `name` itself.
    #[must_use]
    pub fn child(&self, name: &str, decl: &str) -> Self {
        let whitelist = match &self.whitelist {
            Whitelist::Open => Whitelist::Open,
            Whitelist::Closed(entries) => match entries.get(decl) {
                Some(serde_json::Value::Object(sub)) => Whitelist::Closed(sub.clone()),
                _ if is_named_collection(decl) => Whitelist::Open,
                _ => Whitelist::Closed(serde_json::Map::new()),
            },
        };

        let defaults = match self.defaults.get(decl) {
            Some(Setting::Map(sub)) if !is_named_collection(decl) => sub.clone(),
            _ => Mapping::new(),
        };

        let prefixes = if name == decl {
            vec![format!("{decl}.")]
        } else {
            vec![format!("{decl}."), format!("{name}.")]
        };
        let strip = |key: &str| -> Option<String> {
            prefixes
                .iter()
                .find_map(|prefix| key.strip_prefix(prefix.as_str()))
                .map(str::to_owned)
        };

        let aliases = self
            .aliases
            .iter()
            .filter_map(|(key, alias)| {
                strip(key).map(|key| {
                    let raw = strip(&alias.raw).unwrap_or_else(|| alias.raw.clone());
                    (
                        key,
                        Alias {
                            raw,
                            filter: alias.filter.clone(),
                        },
                    )
                })
            })
            .collect();
        let links = self
            .links
            .iter()
            .filter_map(|(key, link)| strip(key).map(|key| (key, link.clone())))
            .collect();
        let imports = self.imports.iter().filter_map(|i| strip(i)).collect();
        let inits = self
            .inits
            .iter()
            .filter_map(|(key, init)| strip(key).map(|key| (key, init.clone())))
            .collect();

        Self {
            whitelist,
            defaults,
            aliases,
            links,
            imports,
            inits,
        }
    }
}

/// Whether `name` carries the named-collection suffix.
#[must_use]
pub fn is_named_collection(name: &str) -> bool {
    name.len() > NAMED_COLLECTION_SUFFIX.len() && name.ends_with(NAMED_COLLECTION_SUFFIX)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn scope() -> Scope {
        let whitelist = json!({
            "BACKEND": { "NAME": null, "CLASS": null, "STORE": null },
            "BACKENDS": null,
            "LEVEL": null,
            "_VALIDATE_LEVEL": "my_app.checks.level",
            "_DEPRECATED_LEVEL": null,
        });
        let serde_json::Value::Object(whitelist) = whitelist else {
            unreachable!()
        };
        let Setting::Map(defaults) = Setting::from(json!({
            "BACKEND": { "STORE": "default" },
            "LEVEL": 1,
        })) else {
            unreachable!()
        };
        Scope::closed(
            whitelist,
            defaults,
            IndexMap::from([(
                "BACKENDS".to_owned(),
                Alias::parse("BACKEND|NAME").unwrap(),
            )]),
            IndexMap::from([(
                "BACKEND.STORE".to_owned(),
                Link::parse("STORES|NAME").unwrap(),
            )]),
            vec!["BACKEND.CLASS".to_owned()],
            IndexMap::from([(
                "BACKENDS".to_owned(),
                "app_settings.init.get_class_from_config".to_owned(),
            )]),
        )
    }

    #[test]
    fn test_alias_and_link_parse() {
        assert_eq!(
            Alias::parse("BACKEND|NAME"),
            Some(Alias {
                raw: "BACKEND".to_owned(),
                filter: Some("NAME".to_owned())
            })
        );
        assert_eq!(Alias::parse("BACKEND").unwrap().filter, None);
        assert_eq!(Alias::parse("BACKEND|"), None);
        assert_eq!(Link::parse("STORES"), None);
        assert_eq!(Link::parse("STORES|NAME").unwrap().to_string(), "STORES|NAME");
    }

    #[test]
    fn test_root_lookups() {
        let scope = scope();
        assert!(scope.allows("LEVEL"));
        assert!(scope.allows("BACKENDS"));
        assert!(!scope.allows("OTHER"));
        assert!(scope.is_nested("BACKENDS"));
        assert!(scope.is_keyed_collection("BACKENDS"));
        assert!(!scope.is_nested("LEVEL"));
        assert_eq!(scope.validator_ref("LEVEL"), Some("my_app.checks.level"));
        assert!(scope.is_deprecated("LEVEL"));
        assert_eq!(
            scope.init("BACKENDS"),
            Some("app_settings.init.get_class_from_config")
        );
        assert_eq!(scope.names(), ["BACKEND", "BACKENDS", "LEVEL"]);
    }

    #[test]
    fn test_child_strips_prefixes() {
        let child = scope().child("BACKENDS", "BACKEND");
        assert!(child.allows("NAME"));
        assert!(!child.allows("LEVEL"));
        assert!(child.is_import("CLASS"));
        assert_eq!(child.link("STORE").unwrap().target, "STORES");
        assert_eq!(child.default_for("STORE"), Some(&Setting::from("default")));
    }

    #[test]
    fn test_named_collection_members_are_open() {
        let scope = Scope::closed(
            serde_json::Map::new(),
            Mapping::new(),
            IndexMap::new(),
            IndexMap::new(),
            Vec::new(),
            IndexMap::new(),
        );
        assert!(is_named_collection("CACHE_ITEMS"));
        assert!(!is_named_collection("_ITEMS"));
        assert!(scope.child("CACHE_ITEMS", "CACHE_ITEMS").is_open());
        assert!(!scope.child("CACHE", "CACHE").is_open());
    }
}
