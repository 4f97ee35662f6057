//! Open-file and directory-cursor tables.
//!
//! File descriptors are small non-negative integers allocated
//! lowest-free-slot, so a descriptor is reused promptly after close.
//! Directory cursors live in a separate, monotonically-keyed space and
//! never collide with file descriptors.

use crate::dirstream::DirStream;
use crate::error::{ClientError, Result};
use driftfs_meta::types::{FileLayout, NodeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Read access requested.
pub const O_RDONLY: u32 = 0;
/// Write-only access requested.
pub const O_WRONLY: u32 = 1;
/// Read-write access requested.
pub const O_RDWR: u32 = 2;
/// Create the file if missing.
pub const O_CREAT: u32 = 1 << 6;
/// With `O_CREAT`, fail if the file exists.
pub const O_EXCL: u32 = 1 << 7;
/// Truncate to zero length on open.
pub const O_TRUNC: u32 = 1 << 9;
/// Every write lands at end of file.
pub const O_APPEND: u32 = 1 << 10;

const ACCESS_MASK: u32 = 0o3;

/// Capability bitset for `open`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OpenFlags(u32);

impl OpenFlags {
    /// Wraps raw flag bits.
    pub fn new(bits: u32) -> Self {
        OpenFlags(bits)
    }

    /// The raw bits.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// True when the handle may read.
    pub fn is_readable(&self) -> bool {
        matches!(self.0 & ACCESS_MASK, O_RDONLY | O_RDWR)
    }

    /// True when the handle may write.
    pub fn is_writable(&self) -> bool {
        matches!(self.0 & ACCESS_MASK, O_WRONLY | O_RDWR)
    }

    /// True when the file should be created if missing.
    pub fn wants_create(&self) -> bool {
        self.0 & O_CREAT != 0
    }

    /// True when create must not find an existing file.
    pub fn is_exclusive(&self) -> bool {
        self.0 & O_EXCL != 0
    }

    /// True when the file is truncated on open.
    pub fn wants_truncate(&self) -> bool {
        self.0 & O_TRUNC != 0
    }

    /// True when writes always land at end of file.
    pub fn is_append(&self) -> bool {
        self.0 & O_APPEND != 0
    }
}

/// Origin for `lseek`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SeekWhence {
    /// From the start of the file.
    Set,
    /// From the handle's current offset.
    Cur,
    /// From end of file.
    End,
}

/// State of one `open()` result. Shared via `Arc` so table locks are not
/// held across service calls; the offset has its own mutex so two
/// concurrent reads on one descriptor cannot corrupt the advance.
#[derive(Debug)]
pub struct OpenFile {
    /// Node the descriptor refers to.
    pub node: NodeId,
    /// Flags the file was opened with.
    pub flags: OpenFlags,
    /// Striping layout captured at open.
    pub layout: Option<FileLayout>,
    /// Current byte offset.
    pub offset: Mutex<u64>,
}

/// Descriptor table with lowest-free-slot allocation.
#[derive(Default)]
pub struct FileTable {
    entries: HashMap<i32, Arc<OpenFile>>,
}

impl FileTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an open file under the smallest free descriptor.
    pub fn insert(&mut self, file: OpenFile) -> i32 {
        let mut fd = 0;
        while self.entries.contains_key(&fd) {
            fd += 1;
        }
        debug!("handle: opened fd {} for node {}", fd, file.node);
        self.entries.insert(fd, Arc::new(file));
        fd
    }

    /// Looks up a descriptor. Unknown or negative descriptors fail with
    /// bad-descriptor; the check has no side effects.
    pub fn get(&self, fd: i32) -> Result<Arc<OpenFile>> {
        if fd < 0 {
            return Err(ClientError::BadDescriptor { fd });
        }
        self.entries
            .get(&fd)
            .cloned()
            .ok_or(ClientError::BadDescriptor { fd })
    }

    /// Removes a descriptor, returning its state.
    pub fn remove(&mut self, fd: i32) -> Result<Arc<OpenFile>> {
        if fd < 0 {
            return Err(ClientError::BadDescriptor { fd });
        }
        let file = self
            .entries
            .remove(&fd)
            .ok_or(ClientError::BadDescriptor { fd })?;
        debug!("handle: closed fd {}", fd);
        Ok(file)
    }

    /// Snapshot of all open files.
    pub fn all(&self) -> Vec<Arc<OpenFile>> {
        self.entries.values().cloned().collect()
    }

    /// Number of open descriptors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no descriptor is open.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry (session unmount).
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Opaque handle identifying an open directory enumeration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DirCursor(u64);

impl DirCursor {
    /// The raw cursor id, for adapter-layer registries.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Cursor table. Keys are never reused within a session, so a stale
/// cursor reliably fails rather than aliasing a newer enumeration.
#[derive(Default)]
pub struct DirTable {
    next: u64,
    entries: HashMap<DirCursor, Arc<Mutex<DirStream>>>,
}

impl DirTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an enumeration and hands back its cursor.
    pub fn insert(&mut self, stream: DirStream) -> DirCursor {
        let cursor = DirCursor(self.next);
        self.next += 1;
        self.entries.insert(cursor, Arc::new(Mutex::new(stream)));
        debug!("handle: opened dir cursor {}", cursor.0);
        cursor
    }

    /// Looks up a cursor; a closed cursor fails with bad-descriptor.
    pub fn get(&self, cursor: DirCursor) -> Result<Arc<Mutex<DirStream>>> {
        self.entries
            .get(&cursor)
            .cloned()
            .ok_or(ClientError::BadDescriptor {
                fd: cursor.0 as i32,
            })
    }

    /// Removes a cursor.
    pub fn remove(&mut self, cursor: DirCursor) -> Result<()> {
        self.entries
            .remove(&cursor)
            .map(|_| debug!("handle: closed dir cursor {}", cursor.0))
            .ok_or(ClientError::BadDescriptor {
                fd: cursor.0 as i32,
            })
    }

    /// Drops every cursor (session unmount).
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_file(node: u64) -> OpenFile {
        OpenFile {
            node: NodeId::new(node),
            flags: OpenFlags::new(O_RDWR),
            layout: None,
            offset: Mutex::new(0),
        }
    }

    #[test]
    fn descriptors_start_at_zero_and_ascend() {
        let mut table = FileTable::new();
        assert_eq!(table.insert(open_file(1)), 0);
        assert_eq!(table.insert(open_file(2)), 1);
        assert_eq!(table.insert(open_file(3)), 2);
    }

    #[test]
    fn closed_descriptor_is_reused_lowest_first() {
        let mut table = FileTable::new();
        let fd0 = table.insert(open_file(1));
        let fd1 = table.insert(open_file(2));
        table.insert(open_file(3));
        table.remove(fd1).unwrap();
        table.remove(fd0).unwrap();
        assert_eq!(table.insert(open_file(4)), fd0);
        assert_eq!(table.insert(open_file(5)), fd1);
    }

    #[test]
    fn negative_descriptor_is_bad() {
        let table = FileTable::new();
        assert!(matches!(
            table.get(-1),
            Err(ClientError::BadDescriptor { fd: -1 })
        ));
    }

    #[test]
    fn unknown_descriptor_is_bad() {
        let table = FileTable::new();
        assert!(matches!(
            table.get(7),
            Err(ClientError::BadDescriptor { fd: 7 })
        ));
    }

    #[test]
    fn get_after_remove_is_bad() {
        let mut table = FileTable::new();
        let fd = table.insert(open_file(1));
        table.remove(fd).unwrap();
        assert!(table.get(fd).is_err());
    }

    #[test]
    fn clear_empties_table() {
        let mut table = FileTable::new();
        table.insert(open_file(1));
        table.insert(open_file(2));
        table.clear();
        assert!(table.is_empty());
    }

    #[test]
    fn open_flags_access_predicates() {
        assert!(OpenFlags::new(O_RDONLY).is_readable());
        assert!(!OpenFlags::new(O_RDONLY).is_writable());
        assert!(!OpenFlags::new(O_WRONLY).is_readable());
        assert!(OpenFlags::new(O_WRONLY).is_writable());
        assert!(OpenFlags::new(O_RDWR).is_readable());
        assert!(OpenFlags::new(O_RDWR).is_writable());
    }

    #[test]
    fn open_flags_modifier_predicates() {
        let flags = OpenFlags::new(O_WRONLY | O_CREAT | O_EXCL | O_TRUNC | O_APPEND);
        assert!(flags.wants_create());
        assert!(flags.is_exclusive());
        assert!(flags.wants_truncate());
        assert!(flags.is_append());
    }

    #[test]
    fn dir_cursors_are_not_reused() {
        let mut table = DirTable::new();
        let root = NodeId::ROOT;
        let c0 = table.insert(DirStream::new(root, root, 16));
        table.remove(c0).unwrap();
        let c1 = table.insert(DirStream::new(root, root, 16));
        assert_ne!(c0, c1);
        assert!(table.get(c0).is_err());
        assert!(table.get(c1).is_ok());
    }

    #[test]
    fn removing_unknown_cursor_is_bad_descriptor() {
        let mut table = DirTable::new();
        let root = NodeId::ROOT;
        let c = table.insert(DirStream::new(root, root, 16));
        table.remove(c).unwrap();
        assert!(matches!(
            table.remove(c),
            Err(ClientError::BadDescriptor { .. })
        ));
    }
}
