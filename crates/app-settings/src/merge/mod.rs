//! Recursive default/override merging with protection rules.
//!
//! Two merges live here. [`deep_merge`] layers overlay mappings onto each
//! other and never fails. [`merge_defaults`] combines a schema default with
//! a configured value; it produces a fresh mapping (the default tree is never
//! aliased) and refuses to override siblings of a protected default key.

mod deep;
mod path;
mod protect;
mod types;

pub use deep::{MAX_MERGE_DEPTH, deep_merge, merge_defaults};
pub use path::{get_nested, join_path, split_path};
pub use protect::PROTECTED;
pub use types::{FieldSources, ValueSource};
