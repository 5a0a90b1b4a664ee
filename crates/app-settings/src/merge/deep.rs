use crate::error::{SettingsError, SettingsResult};
use crate::value::{Mapping, Setting};

use super::path::join_path;
use super::protect::check_protected;

/// Nesting limit for [`merge_defaults`].
pub const MAX_MERGE_DEPTH: usize = 64;

/// Recursively deep-merge `overlay` into `base`.
///
/// - Mappings merge recursively per key.
/// - Everything else from the overlay **replaces** the base value.
pub fn deep_merge(base: &mut Mapping, overlay: &Mapping) {
    for (key, overlay_val) in overlay {
        let merged_in_place = match (base.get_mut(key), overlay_val) {
            (Some(Setting::Map(base_map)), Setting::Map(overlay_map)) => {
                deep_merge(base_map, overlay_map);
                true
            },
            _ => false,
        };
        if !merged_in_place {
            base.insert(key.clone(), overlay_val.clone());
        }
    }
}

/// Merge a configured mapping over a default mapping.
///
/// For every key in `overrides`: when both sides hold mappings the merge
/// recurses, otherwise the override replaces the default outright. If
/// `defaults` itself or any default sub-mapping carries a
/// [`PROTECTED`](super::PROTECTED) entry, the override may only touch
/// `filter_field` there.
///
/// `path` is the dotted location of `defaults`, used in error messages.
///
/// # Errors
///
/// Returns [`SettingsError::ProtectedSettingOverride`] when a protected key
/// is overridden, or [`SettingsError::DepthExceeded`] past
/// [`MAX_MERGE_DEPTH`] levels.
pub fn merge_defaults(
    defaults: &Mapping,
    overrides: &Mapping,
    filter_field: Option<&str>,
    path: &str,
) -> SettingsResult<Mapping> {
    check_protected(defaults, overrides, filter_field, path)?;
    merge_at(defaults, overrides, filter_field, path, 0)
}

fn merge_at(
    base: &Mapping,
    overrides: &Mapping,
    filter_field: Option<&str>,
    path: &str,
    depth: usize,
) -> SettingsResult<Mapping> {
    if depth > MAX_MERGE_DEPTH {
        return Err(SettingsError::DepthExceeded {
            path: path.to_owned(),
            limit: MAX_MERGE_DEPTH,
        });
    }

    let mut result = base.clone();
    for (key, override_val) in overrides {
        let key_path = join_path(path, key);
        let merged = match (result.get(key), override_val) {
            (Some(Setting::Map(base_map)), Setting::Map(override_map)) => {
                check_protected(base_map, override_map, filter_field, &key_path)?;
                Setting::Map(merge_at(
                    base_map,
                    override_map,
                    filter_field,
                    &key_path,
                    depth.saturating_add(1),
                )?)
            },
            _ => override_val.clone(),
        };
        result.insert(key.clone(), merged);
    }
    Ok(result)
}
