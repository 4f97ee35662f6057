//! Path resolution.
//!
//! Resolves string paths (absolute from the mount root, or relative to
//! the session cwd) into node references, expanding symlinks met along
//! the way. Expansion is bounded; exceeding the bound classifies as a
//! symlink loop whether the cycle is self-referential or spread across
//! several links.

use crate::error::{ClientError, Result};
use crate::probe::fetch_with_probe;
use driftfs_meta::types::NodeId;
use driftfs_meta::{MetadataService, ServiceError};
use std::collections::VecDeque;
use tracing::debug;

/// One resolved component of the cwd stack: entry name plus the node it
/// referred to when resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathComponent {
    /// Entry name within its parent.
    pub name: String,
    /// Node the component resolved to.
    pub node: NodeId,
}

/// Renders a component stack as an absolute path; the empty stack is the
/// root, rendered `"/"`.
pub fn render_path(components: &[PathComponent]) -> String {
    if components.is_empty() {
        return "/".to_string();
    }
    let mut out = String::new();
    for comp in components {
        out.push('/');
        out.push_str(&comp.name);
    }
    out
}

/// Splits a path into meaningful components. Empty components from
/// doubled separators and no-op `"."` components are dropped, so
/// `"dir//child"` and `"dir/./child"` behave like `"dir/child"`.
fn split_components(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .map(str::to_string)
        .collect()
}

/// Reads a symlink's target text, re-probing with a larger buffer if the
/// target grew between the size lookup and the read (the two are not
/// atomic with respect to concurrent modification).
pub(crate) fn read_link_text(
    meta: &dyn MetadataService,
    node: NodeId,
    size_hint: u64,
) -> Result<String> {
    let initial = (size_hint as usize).saturating_add(1);
    let raw = fetch_with_probe(initial, |buf| {
        meta.read_link(node, buf).map_err(ClientError::from)
    })?;
    String::from_utf8(raw).map_err(|_| ClientError::invalid("symlink target is not valid UTF-8"))
}

/// Path walker bound to one metadata service and mount root.
pub struct Resolver<'a> {
    meta: &'a dyn MetadataService,
    root: NodeId,
    max_follows: u32,
}

impl<'a> Resolver<'a> {
    /// Creates a walker anchored at `root`.
    pub fn new(meta: &'a dyn MetadataService, root: NodeId, max_follows: u32) -> Self {
        Self {
            meta,
            root,
            max_follows,
        }
    }

    /// Resolves `path` to a full component stack. `follow_final` selects
    /// whether a terminal symlink is expanded (stat vs lstat).
    pub fn resolve(
        &self,
        cwd: &[PathComponent],
        path: &str,
        follow_final: bool,
    ) -> Result<Vec<PathComponent>> {
        let mut stack: Vec<PathComponent> = if path.starts_with('/') {
            Vec::new()
        } else {
            cwd.to_vec()
        };
        let mut work: VecDeque<String> = split_components(path).into();
        let mut follows = 0u32;

        while let Some(name) = work.pop_front() {
            if name == ".." {
                // the root is its own parent
                stack.pop();
                continue;
            }
            let dir = stack.last().map(|c| c.node).unwrap_or(self.root);
            let node = self.meta.lookup(dir, &name).map_err(|e| match e {
                ServiceError::NotFound { .. } => ClientError::NotFound { path: path.into() },
                ServiceError::NotADirectory { .. } => {
                    ClientError::NotADirectory { path: path.into() }
                }
                other => other.into(),
            })?;
            let attrs = self.meta.get_attrs(node)?;
            if attrs.is_symlink() && (follow_final || !work.is_empty()) {
                follows += 1;
                if follows > self.max_follows {
                    debug!("resolver: symlink bound {} exceeded at {}", self.max_follows, name);
                    return Err(ClientError::SymlinkLoop { path: path.into() });
                }
                let target = read_link_text(self.meta, node, attrs.size)?;
                if target.starts_with('/') {
                    stack.clear();
                }
                for comp in split_components(&target).into_iter().rev() {
                    work.push_front(comp);
                }
                continue;
            }
            stack.push(PathComponent { name, node });
        }
        Ok(stack)
    }

    /// Resolves `path` to its final node.
    pub fn resolve_node(
        &self,
        cwd: &[PathComponent],
        path: &str,
        follow_final: bool,
    ) -> Result<NodeId> {
        let stack = self.resolve(cwd, path, follow_final)?;
        Ok(stack.last().map(|c| c.node).unwrap_or(self.root))
    }

    /// Resolves the directory containing `path`'s leaf, returning the
    /// directory node and the leaf name. The leaf itself need not exist;
    /// create-type operations use this.
    pub fn resolve_parent(&self, cwd: &[PathComponent], path: &str) -> Result<(NodeId, String)> {
        let mut components = split_components(path);
        let leaf = components.pop().ok_or_else(|| {
            ClientError::invalid(format!("path {:?} has no final component", path))
        })?;
        if leaf == ".." {
            return Err(ClientError::invalid(format!(
                "path {:?} may not end in \"..\"",
                path
            )));
        }
        let mut prefix = if path.starts_with('/') {
            "/".to_string()
        } else {
            String::new()
        };
        prefix.push_str(&components.join("/"));
        let prefix = if prefix.is_empty() { "." } else { &prefix };

        let stack = self.resolve(cwd, prefix, true)?;
        let dir = stack.last().map(|c| c.node).unwrap_or(self.root);
        let attrs = self.meta.get_attrs(dir)?;
        if !attrs.is_dir() {
            return Err(ClientError::NotADirectory { path: path.into() });
        }
        Ok((dir, leaf))
    }
}
