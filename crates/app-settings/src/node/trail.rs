//! Per-call resolution state.

use std::sync::Arc;

use crate::error::{SettingsError, SettingsResult};

use super::SettingsNode;

/// Recursion limit for one top-level lookup.
pub const MAX_RESOLVE_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
struct LinkVisit {
    path: String,
    name: String,
    key: String,
}

/// State threaded through one top-level lookup: the links currently being
/// followed, the node a secondary root resolves on behalf of, and the
/// recursion depth.
#[derive(Debug, Default)]
pub(crate) struct Trail {
    links: Vec<LinkVisit>,
    resolving_for: Option<Arc<SettingsNode>>,
    depth: usize,
}

impl Trail {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Run `f` one level deeper.
    pub(crate) fn descend<T>(
        &mut self,
        path: &str,
        f: impl FnOnce(&mut Self) -> SettingsResult<T>,
    ) -> SettingsResult<T> {
        if self.depth >= MAX_RESOLVE_DEPTH {
            return Err(SettingsError::DepthExceeded {
                path: path.to_owned(),
                limit: MAX_RESOLVE_DEPTH,
            });
        }
        self.depth = self.depth.saturating_add(1);
        let result = f(self);
        self.depth = self.depth.saturating_sub(1);
        result
    }

    /// Run `f` while following the link `(path, name, key)`.
    ///
    /// Returns `None` without running `f` if that link is already being
    /// followed further up the stack.
    pub(crate) fn follow<T>(
        &mut self,
        path: &str,
        name: &str,
        key: &str,
        f: impl FnOnce(&mut Self) -> T,
    ) -> Option<T> {
        let visit = LinkVisit {
            path: path.to_owned(),
            name: name.to_owned(),
            key: key.to_owned(),
        };
        if self.links.contains(&visit) {
            return None;
        }
        self.links.push(visit);
        let result = f(self);
        self.links.pop();
        Some(result)
    }

    /// The node a secondary root currently resolves for.
    pub(crate) fn resolving_for(&self) -> Option<&Arc<SettingsNode>> {
        self.resolving_for.as_ref()
    }

    /// Run `f` with the resolving-for pointer replaced, restoring it after.
    pub(crate) fn resolving_as<T>(
        &mut self,
        node: Option<Arc<SettingsNode>>,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let previous = std::mem::replace(&mut self.resolving_for, node);
        let result = f(self);
        self.resolving_for = previous;
        result
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.depth
    }
}
