//! In-memory reference backend.
//!
//! Implements the full [`MetadataService`] and [`DataService`] contract
//! over a sharded node table. Used by the client test suites and for
//! single-process mounts. Never holds two table references at once, so
//! concurrent callers cannot deadlock on the shard locks.

use crate::error::{Result, ServiceError};
use crate::service::{DataService, MetadataService};
use crate::types::{
    DirEntry, EntryPage, FileLayout, FsStats, NodeAttrs, NodeId, NodeKind, Timestamp,
    XattrDisposition, SETATTR_ATIME, SETATTR_GID, SETATTR_MODE, SETATTR_MTIME, SETATTR_UID,
};
use bytes::Bytes;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

const BLKSIZE: u32 = 4096;
const NAME_MAX: usize = 255;
const XATTR_NAME_MAX: usize = 255;
const XATTR_VALUE_MAX: usize = 64 * 1024;
const TOTAL_BLOCKS: u64 = 1 << 22;
const TOTAL_FILES: u64 = 1 << 20;

#[derive(Debug)]
enum NodeContent {
    File { data: Vec<u8>, layout: FileLayout },
    Directory { entries: BTreeMap<String, NodeId> },
    Symlink { target: String },
}

#[derive(Debug)]
struct NodeRecord {
    attrs: NodeAttrs,
    /// Parent directory; meaningful for directories (backs `..` lookup).
    parent: NodeId,
    content: NodeContent,
    xattrs: BTreeMap<String, Vec<u8>>,
}

fn blocks_for(size: u64) -> u64 {
    size.div_ceil(512)
}

/// Largest byte extent a file may occupy; offsets past it cannot be
/// indexed into a `Vec`.
const MAX_FILE_SIZE: u64 = isize::MAX as u64;

fn content_end(offset: u64, len: usize) -> Result<usize> {
    offset
        .checked_add(len as u64)
        .filter(|end| *end <= MAX_FILE_SIZE)
        .map(|end| end as usize)
        .ok_or(ServiceError::NoSpace)
}

fn new_attrs(kind: NodeKind, mode: u32, size: u64) -> NodeAttrs {
    let now = Timestamp::now();
    NodeAttrs {
        kind,
        mode,
        uid: 0,
        gid: 0,
        nlink: if kind == NodeKind::Directory { 2 } else { 1 },
        size,
        blksize: BLKSIZE,
        blocks: blocks_for(size),
        atime: now,
        mtime: now,
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') {
        return Err(ServiceError::InvalidArgument {
            msg: format!("bad entry name {:?}", name),
        });
    }
    if name.len() > NAME_MAX {
        return Err(ServiceError::InvalidArgument {
            msg: format!("entry name exceeds {} bytes", NAME_MAX),
        });
    }
    Ok(())
}

/// In-memory filesystem backend.
pub struct MemoryFs {
    nodes: DashMap<NodeId, NodeRecord>,
    next_id: AtomicU64,
    default_layout: FileLayout,
}

impl MemoryFs {
    /// Creates an empty filesystem with a root directory.
    pub fn new() -> Self {
        let nodes = DashMap::new();
        nodes.insert(
            NodeId::ROOT,
            NodeRecord {
                attrs: new_attrs(NodeKind::Directory, 0o755, 0),
                parent: NodeId::ROOT,
                content: NodeContent::Directory {
                    entries: BTreeMap::new(),
                },
                xattrs: BTreeMap::new(),
            },
        );
        Self {
            nodes,
            next_id: AtomicU64::new(NodeId::ROOT.as_u64() + 1),
            default_layout: FileLayout::default(),
        }
    }

    fn alloc_id(&self) -> NodeId {
        NodeId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Inserts `name` into `parent`'s entry map after verifying the name
    /// is free, then registers the freshly built record.
    fn insert_child(&self, parent: NodeId, name: &str, record: NodeRecord) -> Result<NodeId> {
        check_name(name)?;
        let id = self.alloc_id();
        let is_dir = matches!(record.content, NodeContent::Directory { .. });
        {
            let mut parent_ref = self
                .nodes
                .get_mut(&parent)
                .ok_or_else(|| ServiceError::not_found(parent.to_string()))?;
            let rec = parent_ref.value_mut();
            let entries = match &mut rec.content {
                NodeContent::Directory { entries } => entries,
                _ => return Err(ServiceError::NotADirectory { name: name.into() }),
            };
            if entries.contains_key(name) {
                return Err(ServiceError::already_exists(name));
            }
            entries.insert(name.to_string(), id);
            rec.attrs.mtime = Timestamp::now();
            if is_dir {
                rec.attrs.nlink += 1;
            }
        }
        self.nodes.insert(id, record);
        debug!("memfs: created node {} as {:?} under {}", id, name, parent);
        Ok(id)
    }

    fn child_of(&self, parent: NodeId, name: &str) -> Result<NodeId> {
        let parent_ref = self
            .nodes
            .get(&parent)
            .ok_or_else(|| ServiceError::not_found(name))?;
        match &parent_ref.value().content {
            NodeContent::Directory { entries } => entries
                .get(name)
                .copied()
                .ok_or_else(|| ServiceError::not_found(name)),
            _ => Err(ServiceError::NotADirectory { name: name.into() }),
        }
    }

}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataService for MemoryFs {
    fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    fn lookup(&self, parent: NodeId, name: &str) -> Result<NodeId> {
        let parent_ref = self
            .nodes
            .get(&parent)
            .ok_or_else(|| ServiceError::not_found(name))?;
        let rec = parent_ref.value();
        let entries = match &rec.content {
            NodeContent::Directory { entries } => entries,
            _ => return Err(ServiceError::NotADirectory { name: name.into() }),
        };
        match name {
            "." => Ok(parent),
            ".." => Ok(rec.parent),
            _ => entries
                .get(name)
                .copied()
                .ok_or_else(|| ServiceError::not_found(name)),
        }
    }

    fn create_file(
        &self,
        parent: NodeId,
        name: &str,
        mode: u32,
        layout: Option<&FileLayout>,
    ) -> Result<NodeId> {
        // Validate before creating anything so a bad layout never leaves
        // a partial file behind.
        if let Some(layout) = layout {
            layout.validate()?;
        }
        let layout = layout.cloned().unwrap_or_else(|| self.default_layout.clone());
        self.insert_child(
            parent,
            name,
            NodeRecord {
                attrs: new_attrs(NodeKind::File, mode, 0),
                parent,
                content: NodeContent::File {
                    data: Vec::new(),
                    layout,
                },
                xattrs: BTreeMap::new(),
            },
        )
    }

    fn mkdir(&self, parent: NodeId, name: &str, mode: u32) -> Result<NodeId> {
        self.insert_child(
            parent,
            name,
            NodeRecord {
                attrs: new_attrs(NodeKind::Directory, mode, 0),
                parent,
                content: NodeContent::Directory {
                    entries: BTreeMap::new(),
                },
                xattrs: BTreeMap::new(),
            },
        )
    }

    fn symlink(&self, parent: NodeId, name: &str, target: &str) -> Result<NodeId> {
        self.insert_child(
            parent,
            name,
            NodeRecord {
                attrs: new_attrs(NodeKind::Symlink, 0o777, target.len() as u64),
                parent,
                content: NodeContent::Symlink {
                    target: target.to_string(),
                },
                xattrs: BTreeMap::new(),
            },
        )
    }

    fn link(&self, parent: NodeId, name: &str, node: NodeId) -> Result<()> {
        check_name(name)?;
        {
            let mut target = self
                .nodes
                .get_mut(&node)
                .ok_or_else(|| ServiceError::not_found(name))?;
            let rec = target.value_mut();
            if rec.attrs.is_dir() {
                return Err(ServiceError::IsADirectory { name: name.into() });
            }
            rec.attrs.nlink += 1;
        }
        let mut parent_ref = match self.nodes.get_mut(&parent) {
            Some(r) => r,
            None => {
                // roll back the link count bump
                if let Some(mut t) = self.nodes.get_mut(&node) {
                    t.value_mut().attrs.nlink -= 1;
                }
                return Err(ServiceError::not_found(name));
            }
        };
        let rec = parent_ref.value_mut();
        let entries = match &mut rec.content {
            NodeContent::Directory { entries } => entries,
            _ => {
                drop(parent_ref);
                if let Some(mut t) = self.nodes.get_mut(&node) {
                    t.value_mut().attrs.nlink -= 1;
                }
                return Err(ServiceError::NotADirectory { name: name.into() });
            }
        };
        if entries.contains_key(name) {
            drop(parent_ref);
            if let Some(mut t) = self.nodes.get_mut(&node) {
                t.value_mut().attrs.nlink -= 1;
            }
            return Err(ServiceError::already_exists(name));
        }
        entries.insert(name.to_string(), node);
        rec.attrs.mtime = Timestamp::now();
        Ok(())
    }

    fn remove(&self, parent: NodeId, name: &str) -> Result<()> {
        let child = {
            let mut parent_ref = self
                .nodes
                .get_mut(&parent)
                .ok_or_else(|| ServiceError::not_found(name))?;
            let rec = parent_ref.value_mut();
            let entries = match &mut rec.content {
                NodeContent::Directory { entries } => entries,
                _ => return Err(ServiceError::NotADirectory { name: name.into() }),
            };
            let child = *entries
                .get(name)
                .ok_or_else(|| ServiceError::not_found(name))?;
            // directories go through rmdir
            if let Some(child_ref) = self.nodes.get(&child) {
                if child_ref.value().attrs.is_dir() {
                    return Err(ServiceError::IsADirectory { name: name.into() });
                }
            }
            entries.remove(name);
            rec.attrs.mtime = Timestamp::now();
            child
        };
        let gone = {
            let mut child_ref = match self.nodes.get_mut(&child) {
                Some(r) => r,
                None => return Ok(()),
            };
            let attrs = &mut child_ref.value_mut().attrs;
            attrs.nlink = attrs.nlink.saturating_sub(1);
            attrs.nlink == 0
        };
        if gone {
            self.nodes.remove(&child);
            debug!("memfs: reclaimed node {} after last unlink", child);
        }
        Ok(())
    }

    fn rmdir(&self, parent: NodeId, name: &str) -> Result<()> {
        let child = self.child_of(parent, name)?;
        {
            let child_ref = self
                .nodes
                .get(&child)
                .ok_or_else(|| ServiceError::not_found(name))?;
            match &child_ref.value().content {
                NodeContent::Directory { entries } => {
                    if !entries.is_empty() {
                        return Err(ServiceError::NotEmpty { name: name.into() });
                    }
                }
                _ => return Err(ServiceError::NotADirectory { name: name.into() }),
            }
        }
        {
            let mut parent_ref = self
                .nodes
                .get_mut(&parent)
                .ok_or_else(|| ServiceError::not_found(name))?;
            let rec = parent_ref.value_mut();
            if let NodeContent::Directory { entries } = &mut rec.content {
                entries.remove(name);
                rec.attrs.nlink = rec.attrs.nlink.saturating_sub(1);
                rec.attrs.mtime = Timestamp::now();
            }
        }
        self.nodes.remove(&child);
        Ok(())
    }

    fn rename(
        &self,
        from_parent: NodeId,
        from_name: &str,
        to_parent: NodeId,
        to_name: &str,
    ) -> Result<()> {
        check_name(to_name)?;
        // Replace a pre-existing non-directory target first.
        match self.child_of(to_parent, to_name) {
            Ok(existing) => {
                let is_dir = self
                    .nodes
                    .get(&existing)
                    .map(|r| r.value().attrs.is_dir())
                    .unwrap_or(false);
                if is_dir {
                    return Err(ServiceError::IsADirectory {
                        name: to_name.into(),
                    });
                }
                self.remove(to_parent, to_name)?;
            }
            Err(ServiceError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        let moved = {
            let mut from_ref = self
                .nodes
                .get_mut(&from_parent)
                .ok_or_else(|| ServiceError::not_found(from_name))?;
            let rec = from_ref.value_mut();
            let entries = match &mut rec.content {
                NodeContent::Directory { entries } => entries,
                _ => {
                    return Err(ServiceError::NotADirectory {
                        name: from_name.into(),
                    })
                }
            };
            let moved = entries
                .remove(from_name)
                .ok_or_else(|| ServiceError::not_found(from_name))?;
            rec.attrs.mtime = Timestamp::now();
            moved
        };
        {
            let mut to_ref = match self.nodes.get_mut(&to_parent) {
                Some(r) => r,
                None => {
                    // destination vanished; put the entry back
                    if let Some(mut from_ref) = self.nodes.get_mut(&from_parent) {
                        if let NodeContent::Directory { entries } =
                            &mut from_ref.value_mut().content
                        {
                            entries.insert(from_name.to_string(), moved);
                        }
                    }
                    return Err(ServiceError::not_found(to_name));
                }
            };
            let rec = to_ref.value_mut();
            match &mut rec.content {
                NodeContent::Directory { entries } => {
                    entries.insert(to_name.to_string(), moved);
                    rec.attrs.mtime = Timestamp::now();
                }
                _ => {
                    drop(to_ref);
                    if let Some(mut from_ref) = self.nodes.get_mut(&from_parent) {
                        if let NodeContent::Directory { entries } =
                            &mut from_ref.value_mut().content
                        {
                            entries.insert(from_name.to_string(), moved);
                        }
                    }
                    return Err(ServiceError::NotADirectory {
                        name: to_name.into(),
                    });
                }
            }
        }
        // a moved directory answers ".." from its new parent
        if let Some(mut moved_ref) = self.nodes.get_mut(&moved) {
            let rec = moved_ref.value_mut();
            if rec.attrs.is_dir() {
                rec.parent = to_parent;
            }
        }
        Ok(())
    }

    fn list_entries(&self, node: NodeId, continuation: u64, max: usize) -> Result<EntryPage> {
        let (names, total): (Vec<(String, NodeId)>, usize) = {
            let node_ref = self
                .nodes
                .get(&node)
                .ok_or_else(|| ServiceError::not_found(node.to_string()))?;
            match &node_ref.value().content {
                NodeContent::Directory { entries } => {
                    let total = entries.len();
                    let page = entries
                        .iter()
                        .skip(continuation as usize)
                        .take(max)
                        .map(|(n, id)| (n.clone(), *id))
                        .collect();
                    (page, total)
                }
                _ => {
                    return Err(ServiceError::NotADirectory {
                        name: node.to_string(),
                    })
                }
            }
        };
        let taken = names.len();
        let mut out = Vec::with_capacity(taken);
        for (name, id) in names {
            // entry may have raced away between the two table reads
            if let Some(child) = self.nodes.get(&id) {
                out.push(DirEntry {
                    name,
                    node: id,
                    kind: child.value().attrs.kind,
                });
            }
        }
        let consumed = continuation as usize + taken;
        Ok(EntryPage {
            entries: out,
            next: if consumed < total {
                Some(consumed as u64)
            } else {
                None
            },
        })
    }

    fn get_attrs(&self, node: NodeId) -> Result<NodeAttrs> {
        self.nodes
            .get(&node)
            .map(|r| r.value().attrs)
            .ok_or_else(|| ServiceError::not_found(node.to_string()))
    }

    fn set_attrs(&self, node: NodeId, attrs: &NodeAttrs, mask: u32) -> Result<()> {
        let mut node_ref = self
            .nodes
            .get_mut(&node)
            .ok_or_else(|| ServiceError::not_found(node.to_string()))?;
        let cur = &mut node_ref.value_mut().attrs;
        if mask & SETATTR_MODE != 0 {
            cur.mode = attrs.mode;
        }
        if mask & SETATTR_UID != 0 {
            cur.uid = attrs.uid;
        }
        if mask & SETATTR_GID != 0 {
            cur.gid = attrs.gid;
        }
        if mask & SETATTR_MTIME != 0 {
            cur.mtime = attrs.mtime;
        }
        if mask & SETATTR_ATIME != 0 {
            cur.atime = attrs.atime;
        }
        Ok(())
    }

    fn read_link(&self, node: NodeId, buf: &mut [u8]) -> Result<usize> {
        let node_ref = self
            .nodes
            .get(&node)
            .ok_or_else(|| ServiceError::not_found(node.to_string()))?;
        match &node_ref.value().content {
            NodeContent::Symlink { target } => {
                let bytes = target.as_bytes();
                if buf.len() < bytes.len() {
                    return Err(ServiceError::RangeTooSmall { needed: None });
                }
                buf[..bytes.len()].copy_from_slice(bytes);
                Ok(bytes.len())
            }
            _ => Err(ServiceError::InvalidArgument {
                msg: format!("node {} is not a symlink", node),
            }),
        }
    }

    fn get_xattr(&self, node: NodeId, name: &str, buf: &mut [u8]) -> Result<usize> {
        let node_ref = self
            .nodes
            .get(&node)
            .ok_or_else(|| ServiceError::not_found(node.to_string()))?;
        let value = node_ref
            .value()
            .xattrs
            .get(name)
            .ok_or_else(|| ServiceError::NoSuchAttr { name: name.into() })?;
        if buf.len() < value.len() {
            return Err(ServiceError::RangeTooSmall {
                needed: Some(value.len()),
            });
        }
        buf[..value.len()].copy_from_slice(value);
        Ok(value.len())
    }

    fn set_xattr(
        &self,
        node: NodeId,
        name: &str,
        value: &[u8],
        disposition: XattrDisposition,
    ) -> Result<()> {
        if name.is_empty() || name.len() > XATTR_NAME_MAX {
            return Err(ServiceError::InvalidArgument {
                msg: format!("bad xattr name {:?}", name),
            });
        }
        if value.len() > XATTR_VALUE_MAX {
            return Err(ServiceError::InvalidArgument {
                msg: format!("xattr value exceeds {} bytes", XATTR_VALUE_MAX),
            });
        }
        let mut node_ref = self
            .nodes
            .get_mut(&node)
            .ok_or_else(|| ServiceError::not_found(node.to_string()))?;
        let xattrs = &mut node_ref.value_mut().xattrs;
        let exists = xattrs.contains_key(name);
        match disposition {
            XattrDisposition::Create if exists => {
                return Err(ServiceError::already_exists(name));
            }
            XattrDisposition::Replace if !exists => {
                return Err(ServiceError::NoSuchAttr { name: name.into() });
            }
            _ => {}
        }
        xattrs.insert(name.to_string(), value.to_vec());
        Ok(())
    }

    fn list_xattrs(&self, node: NodeId) -> Result<Vec<String>> {
        let node_ref = self
            .nodes
            .get(&node)
            .ok_or_else(|| ServiceError::not_found(node.to_string()))?;
        Ok(node_ref.value().xattrs.keys().cloned().collect())
    }

    fn remove_xattr(&self, node: NodeId, name: &str) -> Result<()> {
        let mut node_ref = self
            .nodes
            .get_mut(&node)
            .ok_or_else(|| ServiceError::not_found(node.to_string()))?;
        if node_ref.value_mut().xattrs.remove(name).is_none() {
            return Err(ServiceError::NoSuchAttr { name: name.into() });
        }
        Ok(())
    }

    fn statfs(&self, node: NodeId) -> Result<FsStats> {
        if !self.nodes.contains_key(&node) {
            return Err(ServiceError::not_found(node.to_string()));
        }
        let used: u64 = self
            .nodes
            .iter()
            .map(|r| r.value().attrs.blocks * 512 / BLKSIZE as u64)
            .sum();
        let files = self.nodes.len() as u64;
        Ok(FsStats {
            bsize: BLKSIZE as u64,
            frsize: BLKSIZE as u64,
            blocks: TOTAL_BLOCKS,
            bfree: TOTAL_BLOCKS.saturating_sub(used).max(1),
            bavail: TOTAL_BLOCKS.saturating_sub(used).max(1),
            files: TOTAL_FILES,
            ffree: TOTAL_FILES.saturating_sub(files),
            namemax: NAME_MAX as u64,
        })
    }

    fn get_layout(&self, node: NodeId) -> Result<FileLayout> {
        let node_ref = self
            .nodes
            .get(&node)
            .ok_or_else(|| ServiceError::not_found(node.to_string()))?;
        match &node_ref.value().content {
            NodeContent::File { layout, .. } => Ok(layout.clone()),
            _ => Err(ServiceError::InvalidArgument {
                msg: format!("node {} is not a regular file", node),
            }),
        }
    }
}

impl DataService for MemoryFs {
    fn read(&self, node: NodeId, offset: u64, len: usize) -> Result<Bytes> {
        let node_ref = self
            .nodes
            .get(&node)
            .ok_or_else(|| ServiceError::not_found(node.to_string()))?;
        match &node_ref.value().content {
            NodeContent::File { data, .. } => {
                let start = offset.min(data.len() as u64) as usize;
                let end = start.saturating_add(len).min(data.len());
                Ok(Bytes::copy_from_slice(&data[start..end]))
            }
            NodeContent::Directory { .. } => Err(ServiceError::IsADirectory {
                name: node.to_string(),
            }),
            NodeContent::Symlink { .. } => Err(ServiceError::InvalidArgument {
                msg: format!("node {} is not a regular file", node),
            }),
        }
    }

    fn write(&self, node: NodeId, offset: u64, data: &[u8]) -> Result<usize> {
        let mut node_ref = self
            .nodes
            .get_mut(&node)
            .ok_or_else(|| ServiceError::not_found(node.to_string()))?;
        let rec = node_ref.value_mut();
        match &mut rec.content {
            NodeContent::File { data: content, .. } => {
                let end = content_end(offset, data.len())?;
                if end > content.len() {
                    content.resize(end, 0);
                }
                content[offset as usize..end].copy_from_slice(data);
                rec.attrs.size = content.len() as u64;
                rec.attrs.blocks = blocks_for(rec.attrs.size);
                rec.attrs.mtime = Timestamp::now();
                Ok(data.len())
            }
            NodeContent::Directory { .. } => Err(ServiceError::IsADirectory {
                name: node.to_string(),
            }),
            NodeContent::Symlink { .. } => Err(ServiceError::InvalidArgument {
                msg: format!("node {} is not a regular file", node),
            }),
        }
    }

    fn truncate(&self, node: NodeId, size: u64) -> Result<()> {
        let mut node_ref = self
            .nodes
            .get_mut(&node)
            .ok_or_else(|| ServiceError::not_found(node.to_string()))?;
        let rec = node_ref.value_mut();
        match &mut rec.content {
            NodeContent::File { data, .. } => {
                let end = content_end(size, 0)?;
                data.resize(end, 0);
                rec.attrs.size = size;
                rec.attrs.blocks = blocks_for(size);
                rec.attrs.mtime = Timestamp::now();
                Ok(())
            }
            NodeContent::Directory { .. } => Err(ServiceError::IsADirectory {
                name: node.to_string(),
            }),
            NodeContent::Symlink { .. } => Err(ServiceError::InvalidArgument {
                msg: format!("node {} is not a regular file", node),
            }),
        }
    }

    fn flush(&self, node: NodeId, _data_only: bool) -> Result<()> {
        // content is always durable in memory; just validate the node
        if self.nodes.contains_key(&node) {
            Ok(())
        } else {
            Err(ServiceError::not_found(node.to_string()))
        }
    }
}
