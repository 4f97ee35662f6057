//! Path-based attribute operations.

use crate::error::{ClientError, Result};
use crate::session::Session;
use driftfs_meta::types::{
    FsStats, NodeAttrs, SETATTR_GID, SETATTR_MODE, SETATTR_UID,
};
use driftfs_meta::MetadataService;

impl Session {
    /// Attribute snapshot of the node `path` names, following a terminal
    /// symlink.
    pub fn stat(&self, path: &str) -> Result<NodeAttrs> {
        self.ensure_mounted()?;
        let node = self.resolve_node(path, true)?;
        self.meta.get_attrs(node).map_err(Into::into)
    }

    /// Like [`stat`](Self::stat) but a terminal symlink is described
    /// itself rather than followed.
    pub fn lstat(&self, path: &str) -> Result<NodeAttrs> {
        self.ensure_mounted()?;
        let node = self.resolve_node(path, false)?;
        self.meta.get_attrs(node).map_err(Into::into)
    }

    /// Applies the attribute fields selected by `mask`; unselected
    /// fields are ignored even if populated. Follows a terminal symlink.
    pub fn setattr(&self, path: &str, attrs: &NodeAttrs, mask: u32) -> Result<()> {
        self.ensure_mounted()?;
        let node = self.resolve_node(path, true)?;
        self.meta
            .set_attrs(node, attrs, mask)
            .map_err(|e| ClientError::from(e).with_path(path))
    }

    /// Changes permission bits by path.
    pub fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        self.ensure_mounted()?;
        let node = self.resolve_node(path, true)?;
        let mut attrs = self.meta.get_attrs(node)?;
        attrs.mode = mode;
        self.meta
            .set_attrs(node, &attrs, SETATTR_MODE)
            .map_err(|e| ClientError::from(e).with_path(path))
    }

    /// Changes ownership by path, following a terminal symlink.
    pub fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<()> {
        self.ensure_mounted()?;
        let node = self.resolve_node(path, true)?;
        let mut attrs = self.meta.get_attrs(node)?;
        attrs.uid = uid;
        attrs.gid = gid;
        self.meta
            .set_attrs(node, &attrs, SETATTR_UID | SETATTR_GID)
            .map_err(|e| ClientError::from(e).with_path(path))
    }

    /// Filesystem-wide statistics as seen from `path`.
    pub fn statfs(&self, path: &str) -> Result<FsStats> {
        self.ensure_mounted()?;
        let node = self.resolve_node(path, true)?;
        self.meta.statfs(node).map_err(Into::into)
    }
}
