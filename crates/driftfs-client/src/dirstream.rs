//! Lazy, resumable directory enumeration.
//!
//! A [`DirStream`] delivers `"."` then `".."` exactly once per open or
//! rewind, then pages the backend listing through a read-ahead buffer.
//! Positions are opaque [`DirPos`] tokens: the logical count of entries
//! delivered so far, from which the backend continuation is recomputed on
//! seek. Entries created or removed during an open enumeration may or may
//! not be observed; dot-entry delivery and positional resumability hold
//! regardless.

use crate::error::Result;
use driftfs_meta::types::{DirEntry, NodeAttrs, NodeId, NodeKind, Timestamp};
use driftfs_meta::MetadataService;
use std::collections::VecDeque;

/// Mode field is valid in a readdirplus stat snapshot.
pub const STAT_MASK_MODE: u32 = 1 << 0;
/// Uid/gid fields are valid.
pub const STAT_MASK_OWNER: u32 = 1 << 1;
/// Size/blocks fields are valid.
pub const STAT_MASK_SIZE: u32 = 1 << 2;
/// Timestamps are valid.
pub const STAT_MASK_TIMES: u32 = 1 << 3;
/// Every stat field is valid.
pub const STAT_MASK_ALL: u32 = STAT_MASK_MODE | STAT_MASK_OWNER | STAT_MASK_SIZE | STAT_MASK_TIMES;

/// Opaque position token within a directory enumeration. Callers must
/// not assume arithmetic meaning.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DirPos(u64);

impl DirPos {
    /// The position of a freshly opened enumeration.
    pub const START: DirPos = DirPos(0);
}

/// A directory entry fused with a stat snapshot and a mask of which stat
/// fields are valid.
#[derive(Clone, Debug)]
pub struct DirEntryPlus {
    /// The entry itself.
    pub entry: DirEntry,
    /// Attribute snapshot taken while enumerating.
    pub attrs: NodeAttrs,
    /// Which fields of `attrs` are valid; 0 when the node raced away
    /// between listing and stat.
    pub stat_mask: u32,
}

/// One open directory enumeration.
pub struct DirStream {
    node: NodeId,
    parent: NodeId,
    page_size: usize,
    /// Logical entries delivered so far, dot entries included.
    pos: u64,
    /// Fetched but undelivered entries.
    pending: VecDeque<DirEntry>,
    /// Next backend continuation to fetch.
    continuation: u64,
    /// Backend reported end of listing.
    exhausted: bool,
}

impl DirStream {
    /// Opens an enumeration over `node`, whose parent is `parent` (used
    /// for the `".."` entry; the root directory is its own parent).
    pub fn new(node: NodeId, parent: NodeId, page_size: usize) -> Self {
        Self {
            node,
            parent,
            page_size: page_size.max(1),
            pos: 0,
            pending: VecDeque::new(),
            continuation: 0,
            exhausted: false,
        }
    }

    /// The directory being enumerated.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Delivers the next entry, or `None` at end of directory.
    pub fn next(&mut self, meta: &dyn MetadataService) -> Result<Option<DirEntry>> {
        if self.pos == 0 {
            self.pos = 1;
            return Ok(Some(DirEntry {
                name: ".".to_string(),
                node: self.node,
                kind: NodeKind::Directory,
            }));
        }
        if self.pos == 1 {
            self.pos = 2;
            return Ok(Some(DirEntry {
                name: "..".to_string(),
                node: self.parent,
                kind: NodeKind::Directory,
            }));
        }
        loop {
            if let Some(entry) = self.pending.pop_front() {
                self.pos += 1;
                return Ok(Some(entry));
            }
            if self.exhausted {
                return Ok(None);
            }
            let page = meta.list_entries(self.node, self.continuation, self.page_size)?;
            if page.entries.is_empty() {
                self.exhausted = true;
                continue;
            }
            match page.next {
                Some(next) => self.continuation = next,
                None => self.exhausted = true,
            }
            self.pending.extend(page.entries);
        }
    }

    /// Delivers the next entry fused with a stat snapshot.
    pub fn next_plus(&mut self, meta: &dyn MetadataService) -> Result<Option<DirEntryPlus>> {
        let Some(entry) = self.next(meta)? else {
            return Ok(None);
        };
        match meta.get_attrs(entry.node) {
            Ok(attrs) => Ok(Some(DirEntryPlus {
                entry,
                attrs,
                stat_mask: STAT_MASK_ALL,
            })),
            // entry raced away between listing and stat
            Err(driftfs_meta::ServiceError::NotFound { .. }) => {
                let placeholder = NodeAttrs {
                    kind: entry.kind,
                    mode: 0,
                    uid: 0,
                    gid: 0,
                    nlink: 0,
                    size: 0,
                    blksize: 0,
                    blocks: 0,
                    atime: Timestamp::ZERO,
                    mtime: Timestamp::ZERO,
                };
                Ok(Some(DirEntryPlus {
                    entry,
                    attrs: placeholder,
                    stat_mask: 0,
                }))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Backs out exactly one just-delivered entry so the very next call
    /// to [`next`](Self::next) returns it again. Used by bulk packing to
    /// avoid consuming an entry that does not fit.
    pub fn unread(&mut self, entry: DirEntry) {
        debug_assert!(self.pos > 0, "unread without a prior read");
        self.pos -= 1;
        // positions 0 and 1 are synthesized; only buffered entries return
        // to the read-ahead queue
        if self.pos >= 2 {
            self.pending.push_front(entry);
        }
    }

    /// Current position as an opaque token.
    pub fn tell(&self) -> DirPos {
        DirPos(self.pos)
    }

    /// Resumes delivery from a previously told position; token 0 restores
    /// the dot entries too.
    pub fn seek(&mut self, pos: DirPos) {
        self.pos = pos.0;
        self.pending.clear();
        self.continuation = pos.0.saturating_sub(2);
        self.exhausted = false;
    }

    /// Equivalent to seeking the initial token.
    pub fn rewind(&mut self) {
        self.seek(DirPos::START);
    }
}
