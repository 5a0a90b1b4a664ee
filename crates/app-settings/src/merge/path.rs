use crate::value::{Mapping, Setting};

/// Join a dotted prefix and a key. An empty prefix yields the key alone.
#[must_use]
pub fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Split a dotted path into segments. Returns `None` if any segment is empty.
#[must_use]
pub fn split_path(path: &str) -> Option<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').collect();
    segments
        .iter()
        .all(|segment| !segment.is_empty())
        .then_some(segments)
}

/// Navigate into nested mappings by path segments.
#[must_use]
pub fn get_nested<'a>(map: &'a Mapping, path: &[&str]) -> Option<&'a Setting> {
    let (first, rest) = path.split_first()?;
    let mut current = map.get(*first)?;
    for segment in rest {
        current = current.as_map()?.get(*segment)?;
    }
    Some(current)
}
