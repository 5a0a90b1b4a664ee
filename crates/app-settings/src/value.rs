//! Resolved setting values.
//!
//! A [`Setting`] is what a lookup hands back: plain JSON-shaped data, a
//! nested [`SettingsNode`], an imported [`Symbol`], or a constructed
//! instance. Mappings keep insertion order so that collections re-keyed by a
//! filter field iterate in declaration order.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::json;

use crate::instance::{Instance, MergedView};
use crate::node::SettingsNode;
use crate::registry::Symbol;

/// Ordered string-keyed mapping of settings.
pub type Mapping = IndexMap<String, Setting>;

/// A raw or resolved setting value.
#[derive(Clone, Default)]
pub enum Setting {
    /// Absent. Raw `null` values never win a precedence lookup.
    #[default]
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Numeric scalar.
    Number(serde_json::Number),
    /// String scalar.
    String(String),
    /// Ordered collection.
    List(Vec<Setting>),
    /// Ordered mapping.
    Map(Mapping),
    /// Nested settings node produced by wrapping a mapping.
    Node(Arc<SettingsNode>),
    /// Symbol produced by string-import resolution.
    Symbol(Symbol),
    /// Instance produced by factory-init.
    Instance(Instance),
    /// Instance merged with the configuration it was built from.
    Wrapped(Arc<MergedView>),
}

impl Setting {
    /// Whether this is [`Setting::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the variant, for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "mapping",
            Self::Node(_) => "node",
            Self::Symbol(_) => "symbol",
            Self::Instance(_) => "instance",
            Self::Wrapped(_) => "wrapped instance",
        }
    }

    /// Borrow as a string slice.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Read as a boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Read as a signed integer.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// Read as a float.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    /// Borrow as a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Setting]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow as a mapping.
    #[must_use]
    pub fn as_map(&self) -> Option<&Mapping> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Borrow as a nested node.
    #[must_use]
    pub fn as_node(&self) -> Option<&Arc<SettingsNode>> {
        match self {
            Self::Node(n) => Some(n),
            _ => None,
        }
    }

    /// Borrow as an imported symbol.
    #[must_use]
    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Self::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow as a constructed instance.
    #[must_use]
    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Self::Instance(i) => Some(i),
            _ => None,
        }
    }

    /// Borrow as a merged instance view.
    #[must_use]
    pub fn as_wrapped(&self) -> Option<&Arc<MergedView>> {
        match self {
            Self::Wrapped(w) => Some(w),
            _ => None,
        }
    }

    /// String form of a scalar used as a filter or link key.
    ///
    /// Strings are used verbatim, numbers and booleans are rendered. Every
    /// other variant has no key.
    #[must_use]
    pub fn filter_key(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Number(n) => Some(n.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Plain JSON rendering. Nodes render as their raw mapping, symbols as
    /// their dotted path, instances as their debug form.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Value::Number(n.clone()),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => items.iter().map(Self::to_json).collect(),
            Self::Map(m) => mapping_to_json(m),
            Self::Node(n) => mapping_to_json(n.raw()),
            Self::Symbol(s) => serde_json::Value::String(s.path().to_owned()),
            Self::Instance(i) => serde_json::Value::String(format!("{i:?}")),
            Self::Wrapped(w) => serde_json::Value::String(format!("{:?}", w.instance())),
        }
    }

    /// Canonical identity of the value.
    ///
    /// Equal fingerprints mean equal settings: nodes are identified by
    /// namespace, lookup path, raw mapping and overlay; instances by address.
    #[must_use]
    pub fn fingerprint(&self) -> serde_json::Value {
        match self {
            Self::List(items) => items.iter().map(Self::fingerprint).collect(),
            Self::Map(m) => mapping_fingerprint(m),
            Self::Node(n) => n.fingerprint(),
            Self::Symbol(s) => json!({ "@symbol": s.path() }),
            Self::Instance(i) => json!({ "@instance": format!("{:p}", Arc::as_ptr(i)) }),
            Self::Wrapped(w) => {
                json!({ "@wrapped": format!("{:p}", Arc::as_ptr(w.instance())) })
            },
            scalar => scalar.to_json(),
        }
    }
}

/// Convert a JSON object into a [`Mapping`].
#[must_use]
pub fn mapping_from_json(map: serde_json::Map<String, serde_json::Value>) -> Mapping {
    map.into_iter().map(|(k, v)| (k, Setting::from(v))).collect()
}

/// Fingerprint of a [`Mapping`], as [`Setting::fingerprint`] computes it.
/// Keys are sorted so that insertion order does not affect identity.
#[must_use]
pub fn mapping_fingerprint(map: &Mapping) -> serde_json::Value {
    let mut entries: Vec<(&String, &Setting)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    serde_json::Value::Object(
        entries
            .into_iter()
            .map(|(k, v)| (k.clone(), v.fingerprint()))
            .collect(),
    )
}

/// Render a [`Mapping`] as a JSON object.
#[must_use]
pub fn mapping_to_json(map: &Mapping) -> serde_json::Value {
    serde_json::Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

impl From<serde_json::Value> for Setting {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from).collect())
            },
            serde_json::Value::Object(map) => Self::Map(mapping_from_json(map)),
        }
    }
}

impl From<&str> for Setting {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Setting {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Setting {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Setting {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<i32> for Setting {
    fn from(n: i32) -> Self {
        Self::Number(n.into())
    }
}

impl From<u64> for Setting {
    fn from(n: u64) -> Self {
        Self::Number(n.into())
    }
}

impl From<Mapping> for Setting {
    fn from(m: Mapping) -> Self {
        Self::Map(m)
    }
}

impl From<Vec<Setting>> for Setting {
    fn from(items: Vec<Setting>) -> Self {
        Self::List(items)
    }
}

impl From<Arc<SettingsNode>> for Setting {
    fn from(node: Arc<SettingsNode>) -> Self {
        Self::Node(node)
    }
}

impl PartialEq for Setting {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Node(a), Self::Node(b)) => {
                Arc::ptr_eq(a, b) || a.fingerprint() == b.fingerprint()
            },
            (Self::Symbol(a), Self::Symbol(b)) => a == b,
            (Self::Instance(a), Self::Instance(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            },
            (Self::Wrapped(a), Self::Wrapped(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Self::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Self::String(s) => f.debug_tuple("String").field(s).finish(),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Map(m) => f.debug_tuple("Map").field(m).finish(),
            Self::Node(n) => f.debug_tuple("Node").field(n).finish(),
            Self::Symbol(s) => f.debug_tuple("Symbol").field(s).finish(),
            Self::Instance(i) => f.debug_tuple("Instance").field(i).finish(),
            Self::Wrapped(w) => f.debug_tuple("Wrapped").field(w).finish(),
        }
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl Serialize for Setting {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_keeps_order() {
        let setting = Setting::from(json!({ "b": 1, "a": 2, "c": 3 }));
        let keys: Vec<&str> = setting
            .as_map()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, ["b", "a", "c"]);
    }

    #[test]
    fn test_filter_key_renders_scalars() {
        assert_eq!(Setting::from("x").filter_key().as_deref(), Some("x"));
        assert_eq!(Setting::from(5).filter_key().as_deref(), Some("5"));
        assert_eq!(Setting::from(true).filter_key().as_deref(), Some("true"));
        assert_eq!(Setting::from(json!({ "a": 1 })).filter_key(), None);
    }

    #[test]
    fn test_to_json_round_trips_plain_data() {
        let raw = json!({ "NAME": "x", "PORTS": [1, 2], "TLS": { "ON": true } });
        assert_eq!(Setting::from(raw.clone()).to_json(), raw);
    }

    #[test]
    fn test_fingerprint_ignores_key_order() {
        let a = Setting::from(json!({ "A": 1, "B": { "C": 2, "D": 3 } }));
        let b = Setting::from(json!({ "B": { "D": 3, "C": 2 }, "A": 1 }));
        assert_eq!(a.fingerprint().to_string(), b.fingerprint().to_string());
    }

    #[test]
    fn test_display_strings_are_bare() {
        assert_eq!(Setting::from("abc").to_string(), "abc");
        assert_eq!(Setting::from(json!([1, 2])).to_string(), "[1,2]");
    }
}
