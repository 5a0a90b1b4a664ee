use crate::error::{SettingsError, SettingsResult};
use crate::value::{Mapping, Setting};

/// Reserved key marking a default mapping as protected.
///
/// `PROTECTED = true` protects every sibling key; a list of names protects
/// only those (and the marker itself).
pub const PROTECTED: &str = "PROTECTED";

/// Reject `overrides` if it touches a protected key of `base` other than the
/// active filter field.
pub(super) fn check_protected(
    base: &Mapping,
    overrides: &Mapping,
    filter_field: Option<&str>,
    path: &str,
) -> SettingsResult<()> {
    let Some(flag) = base.get(PROTECTED) else {
        return Ok(());
    };

    match overrides
        .keys()
        .filter(|key| Some(key.as_str()) != filter_field)
        .find(|key| is_protected(flag, key))
    {
        Some(key) => Err(SettingsError::ProtectedSettingOverride {
            path: path.to_owned(),
            key: key.clone(),
        }),
        None => Ok(()),
    }
}

fn is_protected(flag: &Setting, key: &str) -> bool {
    match flag {
        Setting::Bool(all) => *all,
        Setting::String(name) => name == key || key == PROTECTED,
        Setting::List(names) => {
            key == PROTECTED || names.iter().any(|name| name.as_str() == Some(key))
        },
        _ => false,
    }
}
