//! Extended attribute operations.
//!
//! Every operation comes in two flavors: the plain form follows a
//! terminal symlink, the `l`-prefixed form addresses the link itself.

use crate::error::{ClientError, Result};
use crate::session::Session;
use driftfs_meta::types::{NodeId, XattrDisposition};
use driftfs_meta::MetadataService;

impl Session {
    /// Fetches an attribute value into `buf`, returning its length.
    /// `None` (or a zero-length buffer with a non-empty value) acts as a
    /// size probe: the length is returned without copying anything. An
    /// undersized buffer fails range-too-small carrying the needed size.
    pub fn getxattr(&self, path: &str, name: &str, buf: Option<&mut [u8]>) -> Result<usize> {
        let node = self.xattr_node(path, true)?;
        self.getxattr_node(node, name, buf)
    }

    /// [`getxattr`](Self::getxattr) without following a terminal symlink.
    pub fn lgetxattr(&self, path: &str, name: &str, buf: Option<&mut [u8]>) -> Result<usize> {
        let node = self.xattr_node(path, false)?;
        self.getxattr_node(node, name, buf)
    }

    /// Sets an attribute value under the given conflict disposition:
    /// create-only fails already-exists on a present name, replace-only
    /// fails no-such-attr on a missing one.
    pub fn setxattr(
        &self,
        path: &str,
        name: &str,
        value: &[u8],
        disposition: XattrDisposition,
    ) -> Result<()> {
        let node = self.xattr_node(path, true)?;
        self.meta
            .set_xattr(node, name, value, disposition)
            .map_err(|e| ClientError::from(e).with_path(path))
    }

    /// [`setxattr`](Self::setxattr) without following a terminal symlink.
    pub fn lsetxattr(
        &self,
        path: &str,
        name: &str,
        value: &[u8],
        disposition: XattrDisposition,
    ) -> Result<()> {
        let node = self.xattr_node(path, false)?;
        self.meta
            .set_xattr(node, name, value, disposition)
            .map_err(|e| ClientError::from(e).with_path(path))
    }

    /// Attribute names on the node `path` names.
    pub fn listxattr(&self, path: &str) -> Result<Vec<String>> {
        let node = self.xattr_node(path, true)?;
        self.meta.list_xattrs(node).map_err(Into::into)
    }

    /// [`listxattr`](Self::listxattr) without following a terminal
    /// symlink.
    pub fn llistxattr(&self, path: &str) -> Result<Vec<String>> {
        let node = self.xattr_node(path, false)?;
        self.meta.list_xattrs(node).map_err(Into::into)
    }

    /// Removes one attribute; a missing name fails no-such-attr.
    pub fn removexattr(&self, path: &str, name: &str) -> Result<()> {
        let node = self.xattr_node(path, true)?;
        self.meta.remove_xattr(node, name).map_err(Into::into)
    }

    /// [`removexattr`](Self::removexattr) without following a terminal
    /// symlink.
    pub fn lremovexattr(&self, path: &str, name: &str) -> Result<()> {
        let node = self.xattr_node(path, false)?;
        self.meta.remove_xattr(node, name).map_err(Into::into)
    }

    fn xattr_node(&self, path: &str, follow: bool) -> Result<NodeId> {
        self.ensure_mounted()?;
        self.resolve_node(path, follow)
    }

    fn getxattr_node(&self, node: NodeId, name: &str, buf: Option<&mut [u8]>) -> Result<usize> {
        match buf {
            Some(buf) => self.meta.get_xattr(node, name, buf).map_err(Into::into),
            None => {
                // size probe: a zero-length fetch either fits an empty
                // value or reports the required size
                match self.meta.get_xattr(node, name, &mut []) {
                    Ok(len) => Ok(len),
                    Err(driftfs_meta::ServiceError::RangeTooSmall {
                        needed: Some(needed),
                    }) => Ok(needed),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }
}
