//! Namespace operations and directory cursors.
//!
//! Path-taking operations resolve through the session resolver and
//! address the metadata service by (parent, leaf). Cursor-taking
//! operations drive a [`DirStream`] held in the session's cursor table;
//! each cursor has its own mutex, so enumerating one directory never
//! blocks another.

use crate::config::{DEFAULT_READDIR_PAGE_SIZE, KEY_READDIR_PAGE_SIZE};
use crate::dirstream::{DirEntryPlus, DirPos, DirStream};
use crate::error::{ClientError, Result};
use crate::handle::DirCursor;
use crate::resolver::read_link_text;
use crate::session::Session;
use driftfs_meta::types::DirEntry;
use driftfs_meta::{DataService, MetadataService};
use std::sync::{Arc, Mutex};
use tracing::debug;

impl Session {
    /// Creates a directory. The parent must already exist.
    pub fn mkdir(&self, path: &str, mode: u32) -> Result<()> {
        self.ensure_mounted()?;
        let (parent, leaf) = self.resolve_parent(path)?;
        self.meta
            .mkdir(parent, &leaf, mode)
            .map(|node| debug!("dirops: mkdir {:?} -> node {}", path, node))
            .map_err(|e| ClientError::from(e).with_path(path))
    }

    /// Creates a directory and any missing intermediates. Fails with
    /// already-exists when the leaf itself pre-exists; pre-existing
    /// intermediates are fine.
    pub fn mkdirs(&self, path: &str, mode: u32) -> Result<()> {
        self.ensure_mounted()?;
        let absolute = path.starts_with('/');
        let components: Vec<&str> = path
            .split('/')
            .filter(|c| !c.is_empty() && *c != ".")
            .collect();
        if components.is_empty() {
            return Err(ClientError::AlreadyExists { path: path.into() });
        }
        // Walk the longest existing prefix through the resolver so a
        // symlinked intermediate behaves exactly as it does for mkdir.
        let mut dir = if absolute {
            self.mount_root()
        } else {
            self.cwd_snapshot()
                .last()
                .map(|c| c.node)
                .unwrap_or_else(|| self.mount_root())
        };
        let mut existing = 0;
        while existing < components.len() {
            let mut prefix = if absolute {
                String::from("/")
            } else {
                String::new()
            };
            prefix.push_str(&components[..existing + 1].join("/"));
            match self.resolve_node(&prefix, true) {
                Ok(node) => {
                    dir = node;
                    existing += 1;
                }
                Err(ClientError::NotFound { .. }) => break,
                Err(e) => return Err(e.with_path(path)),
            }
        }
        if existing == components.len() {
            return Err(ClientError::AlreadyExists { path: path.into() });
        }
        for component in &components[existing..] {
            if *component == ".." {
                return Err(ClientError::invalid("cannot create a '..' entry"));
            }
            dir = self
                .meta
                .mkdir(dir, component, mode)
                .map_err(|e| ClientError::from(e).with_path(path))?;
        }
        Ok(())
    }

    /// Removes an empty directory.
    pub fn rmdir(&self, path: &str) -> Result<()> {
        self.ensure_mounted()?;
        let (parent, leaf) = self.resolve_parent(path)?;
        self.meta
            .rmdir(parent, &leaf)
            .map_err(|e| ClientError::from(e).with_path(path))
    }

    /// Moves an entry. A non-directory target at the destination is
    /// replaced.
    pub fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.ensure_mounted()?;
        let (from_parent, from_leaf) = self.resolve_parent(from)?;
        let (to_parent, to_leaf) = self.resolve_parent(to)?;
        self.meta
            .rename(from_parent, &from_leaf, to_parent, &to_leaf)
            .map_err(|e| ClientError::from(e).with_path(from))
    }

    /// Creates a hard link at `new_path` to the node `existing` names.
    /// The existing path is not followed through a terminal symlink.
    pub fn link(&self, existing: &str, new_path: &str) -> Result<()> {
        self.ensure_mounted()?;
        let node = self.resolve_node(existing, false)?;
        let (parent, leaf) = self.resolve_parent(new_path)?;
        self.meta
            .link(parent, &leaf, node)
            .map_err(|e| ClientError::from(e).with_path(new_path))
    }

    /// Removes a non-directory entry. The last link's removal reclaims
    /// the node.
    pub fn unlink(&self, path: &str) -> Result<()> {
        self.ensure_mounted()?;
        let (parent, leaf) = self.resolve_parent(path)?;
        self.meta
            .remove(parent, &leaf)
            .map_err(|e| ClientError::from(e).with_path(path))
    }

    /// Creates a symbolic link at `link_path` carrying `target` as its
    /// text. The target is stored verbatim and not required to resolve.
    pub fn symlink(&self, target: &str, link_path: &str) -> Result<()> {
        self.ensure_mounted()?;
        let (parent, leaf) = self.resolve_parent(link_path)?;
        self.meta
            .symlink(parent, &leaf, target)
            .map(|node| debug!("dirops: symlink {:?} -> node {}", link_path, node))
            .map_err(|e| ClientError::from(e).with_path(link_path))
    }

    /// Reads a symlink's target text. The size lookup and the read are
    /// not atomic, so an undersized first fetch grows and retries.
    pub fn readlink(&self, path: &str) -> Result<String> {
        self.ensure_mounted()?;
        let node = self.resolve_node(path, false)?;
        let attrs = self.meta.get_attrs(node)?;
        if !attrs.is_symlink() {
            return Err(ClientError::invalid(format!(
                "{:?} is not a symbolic link",
                path
            )));
        }
        read_link_text(self.meta.as_ref(), node, attrs.size)
    }

    /// Collects every entry name in a directory, `"."` and `".."`
    /// excluded. The cursor opened for the walk is closed on every exit
    /// path.
    pub fn listdir(&self, path: &str) -> Result<Vec<String>> {
        let cursor = self.opendir(path)?;
        let walk = (|| -> Result<Vec<String>> {
            let mut names = Vec::new();
            while let Some(entry) = self.readdir(cursor)? {
                if entry.name != "." && entry.name != ".." {
                    names.push(entry.name);
                }
            }
            Ok(names)
        })();
        let _ = self.closedir(cursor);
        walk
    }

    /// Flushes every node reachable from an open descriptor, content and
    /// metadata both.
    pub fn sync_fs(&self) -> Result<()> {
        self.ensure_mounted()?;
        let open = self.files.lock().expect("file table poisoned").all();
        for file in open {
            self.data.flush(file.node, false)?;
        }
        Ok(())
    }

    /// Opens a directory enumeration and returns its cursor.
    pub fn opendir(&self, path: &str) -> Result<DirCursor> {
        self.ensure_mounted()?;
        let stack = self.resolver().resolve(&self.cwd_snapshot(), path, true)?;
        let node = stack
            .last()
            .map(|c| c.node)
            .unwrap_or_else(|| self.mount_root());
        if !self.meta.get_attrs(node)?.is_dir() {
            return Err(ClientError::NotADirectory { path: path.into() });
        }
        // the mount root is its own parent for ".." purposes
        let parent = if stack.len() >= 2 {
            stack[stack.len() - 2].node
        } else {
            self.mount_root()
        };
        let page_size = self
            .config
            .get_parsed(KEY_READDIR_PAGE_SIZE, DEFAULT_READDIR_PAGE_SIZE);
        Ok(self
            .dirs
            .lock()
            .expect("dir table poisoned")
            .insert(DirStream::new(node, parent, page_size)))
    }

    /// Closes a directory cursor. The cursor value is never reused.
    pub fn closedir(&self, cursor: DirCursor) -> Result<()> {
        self.ensure_mounted()?;
        self.dirs.lock().expect("dir table poisoned").remove(cursor)
    }

    /// Delivers the next entry, or `None` at end of directory. The first
    /// two deliveries are always `"."` then `".."`.
    pub fn readdir(&self, cursor: DirCursor) -> Result<Option<DirEntry>> {
        self.ensure_mounted()?;
        let stream = self.dir(cursor)?;
        let mut stream = stream.lock().expect("dir stream poisoned");
        stream.next(self.meta.as_ref())
    }

    /// Delivers the next entry fused with a stat snapshot and a validity
    /// mask.
    pub fn readdir_plus(&self, cursor: DirCursor) -> Result<Option<DirEntryPlus>> {
        self.ensure_mounted()?;
        let stream = self.dir(cursor)?;
        let mut stream = stream.lock().expect("dir stream poisoned");
        stream.next_plus(self.meta.as_ref())
    }

    /// Packs as many whole NUL-terminated entry names as fit into `buf`,
    /// returning the bytes used (0 at end of directory). When even the
    /// first pending name does not fit, fails range-too-small with the
    /// needed size and consumes nothing.
    pub fn readdir_bulk(&self, cursor: DirCursor, buf: &mut [u8]) -> Result<usize> {
        self.ensure_mounted()?;
        let stream = self.dir(cursor)?;
        let mut stream = stream.lock().expect("dir stream poisoned");
        let mut used = 0usize;
        while let Some(entry) = stream.next(self.meta.as_ref())? {
            let need = entry.name.len() + 1;
            if used + need > buf.len() {
                let first = used == 0;
                stream.unread(entry);
                if first {
                    return Err(ClientError::RangeTooSmall { needed: Some(need) });
                }
                break;
            }
            buf[used..used + entry.name.len()].copy_from_slice(entry.name.as_bytes());
            buf[used + entry.name.len()] = 0;
            used += need;
        }
        Ok(used)
    }

    /// Current enumeration position as an opaque token.
    pub fn telldir(&self, cursor: DirCursor) -> Result<DirPos> {
        self.ensure_mounted()?;
        let stream = self.dir(cursor)?;
        let stream = stream.lock().expect("dir stream poisoned");
        Ok(stream.tell())
    }

    /// Resumes enumeration at a previously told position.
    pub fn seekdir(&self, cursor: DirCursor, pos: DirPos) -> Result<()> {
        self.ensure_mounted()?;
        let stream = self.dir(cursor)?;
        stream.lock().expect("dir stream poisoned").seek(pos);
        Ok(())
    }

    /// Restarts enumeration from the beginning, dot entries included.
    pub fn rewinddir(&self, cursor: DirCursor) -> Result<()> {
        self.ensure_mounted()?;
        let stream = self.dir(cursor)?;
        stream.lock().expect("dir stream poisoned").rewind();
        Ok(())
    }

    fn dir(&self, cursor: DirCursor) -> Result<Arc<Mutex<DirStream>>> {
        self.dirs.lock().expect("dir table poisoned").get(cursor)
    }
}
