//! Shared data model for the DriftFS service contract.

use crate::error::{Result, ServiceError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier for a filesystem object as known to the metadata
/// service. Two equal ids denote the same object regardless of the path
/// used to reach it; hardlinked entries share one id.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    /// The root directory node (always 1).
    pub const ROOT: NodeId = NodeId(1);

    /// Creates a new NodeId from a raw u64 value
    pub fn new(id: u64) -> Self {
        NodeId(id)
    }

    /// Returns the raw u64 value of this node ID
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of filesystem object a node represents.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
}

/// Represents a point in time with second and nanosecond precision
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds since Unix epoch
    pub secs: u64,
    /// Nanoseconds within the second
    pub nanos: u32,
}

impl Timestamp {
    /// A zero timestamp (the epoch).
    pub const ZERO: Timestamp = Timestamp { secs: 0, nanos: 0 };

    /// Returns the current timestamp
    pub fn now() -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time before epoch");
        Self {
            secs: now.as_secs(),
            nanos: now.subsec_nanos(),
        }
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.secs
            .cmp(&other.secs)
            .then_with(|| self.nanos.cmp(&other.nanos))
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Select the mode field in a setattr mask.
pub const SETATTR_MODE: u32 = 1 << 0;
/// Select the uid field in a setattr mask.
pub const SETATTR_UID: u32 = 1 << 1;
/// Select the gid field in a setattr mask.
pub const SETATTR_GID: u32 = 1 << 2;
/// Select the mtime field in a setattr mask.
pub const SETATTR_MTIME: u32 = 1 << 3;
/// Select the atime field in a setattr mask.
pub const SETATTR_ATIME: u32 = 1 << 4;

/// Snapshot of node metadata. Always value-copied out to callers, never a
/// live view of backend state.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAttrs {
    /// Object kind
    pub kind: NodeKind,
    /// Permission bits
    pub mode: u32,
    /// Owner user id
    pub uid: u32,
    /// Owner group id
    pub gid: u32,
    /// Hard link count
    pub nlink: u32,
    /// Size in bytes (symlinks: target text length)
    pub size: u64,
    /// Preferred I/O block size
    pub blksize: u32,
    /// Allocated 512-byte blocks
    pub blocks: u64,
    /// Last access time
    pub atime: Timestamp,
    /// Last modification time
    pub mtime: Timestamp,
}

impl NodeAttrs {
    /// True for regular files.
    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    /// True for directories.
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// True for symbolic links.
    pub fn is_symlink(&self) -> bool {
        self.kind == NodeKind::Symlink
    }
}

/// One directory entry as reported by the metadata service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name within its parent
    pub name: String,
    /// Node the entry refers to
    pub node: NodeId,
    /// Kind of the referenced node
    pub kind: NodeKind,
}

/// One page of a directory listing plus the continuation token for the
/// next page, if any.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EntryPage {
    /// Entries in this page, in listing order
    pub entries: Vec<DirEntry>,
    /// Token to pass back for the next page; None at end of directory
    pub next: Option<u64>,
}

/// File striping layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLayout {
    /// Bytes written to one object before moving to the next
    pub stripe_unit: u32,
    /// Number of objects striped across
    pub stripe_count: u32,
    /// Maximum size of one backing object
    pub object_size: u32,
    /// Data pool the objects live in; None selects the default pool
    pub pool: Option<String>,
}

impl FileLayout {
    /// Checks the layout for self-consistency: every numeric field must be
    /// non-zero and the object size must be a whole multiple of the stripe
    /// unit, at least one stripe unit large.
    pub fn validate(&self) -> Result<()> {
        if self.stripe_unit == 0 || self.stripe_count == 0 || self.object_size == 0 {
            return Err(ServiceError::InvalidArgument {
                msg: "layout fields must be non-zero".into(),
            });
        }
        if self.object_size < self.stripe_unit || self.object_size % self.stripe_unit != 0 {
            return Err(ServiceError::InvalidArgument {
                msg: format!(
                    "object size {} is not a multiple of stripe unit {}",
                    self.object_size, self.stripe_unit
                ),
            });
        }
        Ok(())
    }
}

impl Default for FileLayout {
    fn default() -> Self {
        Self {
            stripe_unit: 64 * 1024,
            stripe_count: 1,
            object_size: 4 * 1024 * 1024,
            pool: None,
        }
    }
}

/// Filesystem-wide statistics (statfs record).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsStats {
    /// Preferred I/O block size
    pub bsize: u64,
    /// Fundamental fragment size
    pub frsize: u64,
    /// Total blocks
    pub blocks: u64,
    /// Free blocks
    pub bfree: u64,
    /// Blocks available to unprivileged callers
    pub bavail: u64,
    /// Total file nodes
    pub files: u64,
    /// Free file nodes
    pub ffree: u64,
    /// Maximum filename length
    pub namemax: u64,
}

/// Conflict behavior for setting an extended attribute.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum XattrDisposition {
    /// Fail if the key already exists
    Create,
    /// Fail if the key does not exist
    Replace,
    /// Create or overwrite
    Either,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_root() {
        assert_eq!(NodeId::ROOT.as_u64(), 1);
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(format!("{}", NodeId::new(42)), "42");
    }

    #[test]
    fn test_timestamp_ordering() {
        let a = Timestamp { secs: 1, nanos: 5 };
        let b = Timestamp { secs: 1, nanos: 9 };
        let c = Timestamp { secs: 2, nanos: 0 };
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_timestamp_now_is_after_epoch() {
        assert!(Timestamp::now() > Timestamp::ZERO);
    }

    #[test]
    fn test_attrs_kind_predicates() {
        let mut attrs = NodeAttrs {
            kind: NodeKind::File,
            mode: 0o644,
            uid: 0,
            gid: 0,
            nlink: 1,
            size: 0,
            blksize: 4096,
            blocks: 0,
            atime: Timestamp::ZERO,
            mtime: Timestamp::ZERO,
        };
        assert!(attrs.is_file());
        attrs.kind = NodeKind::Directory;
        assert!(attrs.is_dir());
        attrs.kind = NodeKind::Symlink;
        assert!(attrs.is_symlink());
    }

    #[test]
    fn test_setattr_masks_are_distinct_bits() {
        let all = SETATTR_MODE | SETATTR_UID | SETATTR_GID | SETATTR_MTIME | SETATTR_ATIME;
        assert_eq!(all.count_ones(), 5);
    }

    #[test]
    fn test_default_layout_is_valid() {
        assert!(FileLayout::default().validate().is_ok());
    }

    #[test]
    fn test_layout_zero_stripe_unit_invalid() {
        let layout = FileLayout {
            stripe_unit: 0,
            ..FileLayout::default()
        };
        assert!(matches!(
            layout.validate(),
            Err(ServiceError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_layout_object_size_smaller_than_stripe_unit_invalid() {
        let layout = FileLayout {
            stripe_unit: 1 << 20,
            stripe_count: 1,
            object_size: 19,
            pool: None,
        };
        assert!(matches!(
            layout.validate(),
            Err(ServiceError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_layout_object_size_not_multiple_invalid() {
        let layout = FileLayout {
            stripe_unit: 4096,
            stripe_count: 2,
            object_size: 10_000,
            pool: None,
        };
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_layout_wide_stripe_valid() {
        let layout = FileLayout {
            stripe_unit: 1 << 20,
            stripe_count: 7,
            object_size: 1 << 20,
            pool: None,
        };
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn test_entry_page_default_is_empty() {
        let page = EntryPage::default();
        assert!(page.entries.is_empty());
        assert!(page.next.is_none());
    }
}
