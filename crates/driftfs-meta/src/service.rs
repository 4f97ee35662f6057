//! Service traits the session core is written against.
//!
//! The session never talks to a concrete backend; it holds trait objects
//! for metadata and data operations. [`crate::MemoryFs`] implements both
//! for tests and single-process use; a cluster client would implement the
//! same contract over its transport.

use crate::error::Result;
use crate::types::{
    DirEntry, EntryPage, FileLayout, FsStats, NodeAttrs, NodeId, XattrDisposition,
};
use bytes::Bytes;
use std::path::Path;

/// Namespace and attribute operations.
///
/// Name-taking operations address an entry within a parent directory;
/// node-taking operations address a resolved object directly. `lookup`
/// resolves `"."` and `".."` itself so callers can walk without special
/// cases.
pub trait MetadataService: Send + Sync {
    /// The root directory of this service.
    fn root(&self) -> NodeId;

    /// Resolves one name within a directory.
    fn lookup(&self, parent: NodeId, name: &str) -> Result<NodeId>;

    /// Creates a regular file. Fails with already-exists if the name is
    /// taken. When a layout is given it is validated before the node is
    /// created; an invalid layout never leaves a partial file behind.
    fn create_file(
        &self,
        parent: NodeId,
        name: &str,
        mode: u32,
        layout: Option<&FileLayout>,
    ) -> Result<NodeId>;

    /// Creates a directory.
    fn mkdir(&self, parent: NodeId, name: &str, mode: u32) -> Result<NodeId>;

    /// Creates a symbolic link carrying `target` as its text.
    fn symlink(&self, parent: NodeId, name: &str, target: &str) -> Result<NodeId>;

    /// Creates a hard link to an existing node. Directories are rejected.
    fn link(&self, parent: NodeId, name: &str, node: NodeId) -> Result<()>;

    /// Removes a non-directory entry, decrementing the link count. Node
    /// content is reclaimed when the last link goes away.
    fn remove(&self, parent: NodeId, name: &str) -> Result<()>;

    /// Removes an empty directory.
    fn rmdir(&self, parent: NodeId, name: &str) -> Result<()>;

    /// Moves an entry, replacing a non-directory target if present.
    fn rename(
        &self,
        from_parent: NodeId,
        from_name: &str,
        to_parent: NodeId,
        to_name: &str,
    ) -> Result<()>;

    /// Lists up to `max` entries starting at `continuation` (0 for the
    /// first page). `"."` and `".."` are not included. Order is stable for
    /// an unchanged directory.
    fn list_entries(&self, node: NodeId, continuation: u64, max: usize) -> Result<EntryPage>;

    /// Snapshot of a node's attributes.
    fn get_attrs(&self, node: NodeId) -> Result<NodeAttrs>;

    /// Applies the fields selected by `mask` from `attrs`; unselected
    /// fields are ignored even if populated.
    fn set_attrs(&self, node: NodeId, attrs: &NodeAttrs, mask: u32) -> Result<()>;

    /// Copies the link target text into `buf`, returning the length.
    /// Fails with range-too-small when the text does not fit; the backend
    /// does not report the required size (target text may change between
    /// calls, so callers size-probe and retry).
    fn read_link(&self, node: NodeId, buf: &mut [u8]) -> Result<usize>;

    /// Copies an attribute value into `buf`, returning the length. Fails
    /// with range-too-small carrying the required size when `buf` is
    /// undersized, so a zero-length buffer works as a size probe.
    fn get_xattr(&self, node: NodeId, name: &str, buf: &mut [u8]) -> Result<usize>;

    /// Sets an attribute value under the given conflict disposition.
    fn set_xattr(
        &self,
        node: NodeId,
        name: &str,
        value: &[u8],
        disposition: XattrDisposition,
    ) -> Result<()>;

    /// Attribute names on a node, stable within one call.
    fn list_xattrs(&self, node: NodeId) -> Result<Vec<String>>;

    /// Removes one attribute.
    fn remove_xattr(&self, node: NodeId, name: &str) -> Result<()>;

    /// Filesystem-wide statistics as seen from `node`.
    fn statfs(&self, node: NodeId) -> Result<FsStats>;

    /// The striping layout of a file node.
    fn get_layout(&self, node: NodeId) -> Result<FileLayout>;
}

/// Byte-range file content operations.
pub trait DataService: Send + Sync {
    /// Reads up to `len` bytes at `offset`. Short or empty past EOF,
    /// never an error.
    fn read(&self, node: NodeId, offset: u64, len: usize) -> Result<Bytes>;

    /// Writes `data` at `offset`, extending the file as needed. Returns
    /// the number of bytes written.
    fn write(&self, node: NodeId, offset: u64, data: &[u8]) -> Result<usize>;

    /// Sets the file size: extending pads with zero bytes, shrinking
    /// discards trailing data.
    fn truncate(&self, node: NodeId, size: u64) -> Result<()>;

    /// Flushes file content, and metadata too unless `data_only`.
    fn flush(&self, node: NodeId, data_only: bool) -> Result<()>;
}

/// Black-box key/value option source a session consults.
pub trait ConfigStore: Send + Sync {
    /// Fetches a value, if set.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores a value.
    fn set(&self, key: &str, value: &str);

    /// Loads options from a file, returning how many were read.
    fn load_file(&self, path: &Path) -> Result<usize>;
}

/// Convenience: collects a full listing by following continuations.
/// Intended for tests and tools, not the session's paged enumerator.
pub fn collect_entries(meta: &dyn MetadataService, node: NodeId) -> Result<Vec<DirEntry>> {
    let mut out = Vec::new();
    let mut continuation = 0u64;
    loop {
        let page = meta.list_entries(node, continuation, 256)?;
        out.extend(page.entries);
        match page.next {
            Some(next) => continuation = next,
            None => return Ok(out),
        }
    }
}
