//! Descriptor-based file I/O.
//!
//! Capability checks against permission bits happen at open time only;
//! an already-open descriptor keeps its access even if the mode changes
//! afterward, the same way an open file description outlives a chmod.

use crate::error::{ClientError, Result};
use crate::handle::{OpenFile, OpenFlags, SeekWhence};
use crate::session::Session;
use bytes::Bytes;
use driftfs_meta::types::{
    FileLayout, NodeAttrs, SETATTR_GID, SETATTR_MODE, SETATTR_UID,
};
use driftfs_meta::{DataService, MetadataService, ServiceError};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Owner-class read permission bit.
const MODE_OWNER_READ: u32 = 0o400;
/// Owner-class write permission bit.
const MODE_OWNER_WRITE: u32 = 0o200;

fn check_open_access(attrs: &NodeAttrs, flags: OpenFlags, path: &str) -> Result<()> {
    if flags.is_readable() && attrs.mode & MODE_OWNER_READ == 0 {
        return Err(ClientError::PermissionDenied { path: path.into() });
    }
    if flags.is_writable() && attrs.mode & MODE_OWNER_WRITE == 0 {
        return Err(ClientError::PermissionDenied { path: path.into() });
    }
    Ok(())
}

impl Session {
    /// Opens (or with `O_CREAT`, creates) a file and returns its
    /// descriptor. Descriptors are non-negative and the lowest free one
    /// is handed out.
    pub fn open(&self, path: &str, flags: OpenFlags, mode: u32) -> Result<i32> {
        self.open_impl(path, flags, mode, None)
    }

    /// Like [`open`](Self::open) but a freshly created file gets the
    /// given striping layout. The layout is validated before anything is
    /// touched; an invalid layout fails without a partial create.
    pub fn open_with_layout(
        &self,
        path: &str,
        flags: OpenFlags,
        mode: u32,
        layout: &FileLayout,
    ) -> Result<i32> {
        layout.validate()?;
        self.open_impl(path, flags, mode, Some(layout))
    }

    fn open_impl(
        &self,
        path: &str,
        flags: OpenFlags,
        mode: u32,
        layout: Option<&FileLayout>,
    ) -> Result<i32> {
        self.ensure_mounted()?;
        let (node, created) = if flags.wants_create() {
            let (parent, leaf) = self.resolve_parent(path)?;
            match self.meta.lookup(parent, &leaf) {
                Ok(existing) => {
                    if flags.is_exclusive() {
                        return Err(ClientError::AlreadyExists { path: path.into() });
                    }
                    // an existing terminal symlink is followed
                    if self.meta.get_attrs(existing)?.is_symlink() {
                        (self.resolve_node(path, true)?, false)
                    } else {
                        (existing, false)
                    }
                }
                Err(ServiceError::NotFound { .. }) => {
                    match self.meta.create_file(parent, &leaf, mode, layout) {
                        Ok(node) => (node, true),
                        // lost a create race; the entry exists now, open it
                        Err(ServiceError::AlreadyExists { .. }) if !flags.is_exclusive() => {
                            (self.resolve_node(path, true)?, false)
                        }
                        Err(e) => return Err(ClientError::from(e).with_path(path)),
                    }
                }
                Err(e) => return Err(ClientError::from(e).with_path(path)),
            }
        } else {
            (self.resolve_node(path, true)?, false)
        };

        let attrs = self.meta.get_attrs(node)?;
        if attrs.is_dir() && (flags.is_writable() || flags.wants_truncate()) {
            return Err(ClientError::IsADirectory { path: path.into() });
        }
        if !created {
            check_open_access(&attrs, flags, path)?;
        }
        if flags.wants_truncate() && flags.is_writable() && attrs.is_file() && attrs.size > 0 {
            self.data.truncate(node, 0)?;
        }
        let layout = if attrs.is_file() {
            self.meta.get_layout(node).ok()
        } else {
            None
        };
        let fd = self
            .files
            .lock()
            .expect("file table poisoned")
            .insert(OpenFile {
                node,
                flags,
                layout,
                offset: Mutex::new(0),
            });
        debug!("fileops: open {:?} -> fd {}", path, fd);
        Ok(fd)
    }

    /// Closes a descriptor. The descriptor number becomes free for the
    /// next open.
    pub fn close(&self, fd: i32) -> Result<()> {
        self.ensure_mounted()?;
        self.files
            .lock()
            .expect("file table poisoned")
            .remove(fd)
            .map(|_| ())
    }

    /// Reads up to `len` bytes. `offset: None` reads at the handle
    /// offset and advances it; `Some(n)` reads at `n` and leaves the
    /// handle offset alone. Short or empty at end of file.
    pub fn read(&self, fd: i32, offset: Option<u64>, len: usize) -> Result<Bytes> {
        self.ensure_mounted()?;
        let file = self.file(fd)?;
        if !file.flags.is_readable() {
            return Err(ClientError::BadDescriptor { fd });
        }
        match offset {
            Some(at) => self.data.read(file.node, at, len).map_err(Into::into),
            None => {
                let mut pos = file.offset.lock().expect("offset lock poisoned");
                let chunk = self.data.read(file.node, *pos, len)?;
                *pos += chunk.len() as u64;
                Ok(chunk)
            }
        }
    }

    /// Writes `buf`. Offset handling mirrors [`read`](Self::read); a
    /// descriptor opened with append ignores both and writes at end of
    /// file.
    pub fn write(&self, fd: i32, offset: Option<u64>, buf: &[u8]) -> Result<usize> {
        self.ensure_mounted()?;
        let file = self.file(fd)?;
        if !file.flags.is_writable() {
            return Err(ClientError::BadDescriptor { fd });
        }
        if file.flags.is_append() {
            let mut pos = file.offset.lock().expect("offset lock poisoned");
            let end = self.meta.get_attrs(file.node)?.size;
            let written = self.data.write(file.node, end, buf)?;
            *pos = end + written as u64;
            return Ok(written);
        }
        match offset {
            Some(at) => self.data.write(file.node, at, buf).map_err(Into::into),
            None => {
                let mut pos = file.offset.lock().expect("offset lock poisoned");
                let written = self.data.write(file.node, *pos, buf)?;
                *pos += written as u64;
                Ok(written)
            }
        }
    }

    /// Repositions the handle offset, returning the new offset. Seeking
    /// before the start of the file is invalid; seeking past end of file
    /// is allowed.
    pub fn lseek(&self, fd: i32, offset: i64, whence: SeekWhence) -> Result<u64> {
        self.ensure_mounted()?;
        let file = self.file(fd)?;
        let mut pos = file.offset.lock().expect("offset lock poisoned");
        let base = match whence {
            SeekWhence::Set => 0i128,
            SeekWhence::Cur => *pos as i128,
            SeekWhence::End => self.meta.get_attrs(file.node)?.size as i128,
        };
        let target = base + offset as i128;
        if target < 0 || target > u64::MAX as i128 {
            return Err(ClientError::invalid("seek offset out of range"));
        }
        *pos = target as u64;
        Ok(*pos)
    }

    /// Sets a file's size by path, following a terminal symlink.
    pub fn truncate(&self, path: &str, size: u64) -> Result<()> {
        self.ensure_mounted()?;
        let node = self.resolve_node(path, true)?;
        if self.meta.get_attrs(node)?.is_dir() {
            return Err(ClientError::IsADirectory { path: path.into() });
        }
        self.data.truncate(node, size).map_err(Into::into)
    }

    /// Sets a file's size through a write-capable descriptor.
    pub fn ftruncate(&self, fd: i32, size: u64) -> Result<()> {
        self.ensure_mounted()?;
        let file = self.file(fd)?;
        if !file.flags.is_writable() {
            return Err(ClientError::invalid("descriptor not open for writing"));
        }
        self.data.truncate(file.node, size).map_err(Into::into)
    }

    /// Flushes a file's content, and its metadata too unless
    /// `data_only`.
    pub fn fsync(&self, fd: i32, data_only: bool) -> Result<()> {
        self.ensure_mounted()?;
        let file = self.file(fd)?;
        self.data.flush(file.node, data_only).map_err(Into::into)
    }

    /// Attribute snapshot through a descriptor.
    pub fn fstat(&self, fd: i32) -> Result<NodeAttrs> {
        self.ensure_mounted()?;
        let file = self.file(fd)?;
        self.meta.get_attrs(file.node).map_err(Into::into)
    }

    /// Changes permission bits through a descriptor. Valid on any open
    /// descriptor regardless of its access mode.
    pub fn fchmod(&self, fd: i32, mode: u32) -> Result<()> {
        self.ensure_mounted()?;
        let file = self.file(fd)?;
        let mut attrs = self.meta.get_attrs(file.node)?;
        attrs.mode = mode;
        self.meta
            .set_attrs(file.node, &attrs, SETATTR_MODE)
            .map_err(Into::into)
    }

    /// Changes ownership through a descriptor.
    pub fn fchown(&self, fd: i32, uid: u32, gid: u32) -> Result<()> {
        self.ensure_mounted()?;
        let file = self.file(fd)?;
        let mut attrs = self.meta.get_attrs(file.node)?;
        attrs.uid = uid;
        attrs.gid = gid;
        self.meta
            .set_attrs(file.node, &attrs, SETATTR_UID | SETATTR_GID)
            .map_err(Into::into)
    }

    /// Stripe unit of the file behind `fd`, in bytes.
    pub fn get_file_stripe_unit(&self, fd: i32) -> Result<u32> {
        Ok(self.file_layout(fd)?.stripe_unit)
    }

    /// Number of objects the file behind `fd` stripes across.
    pub fn get_file_replication(&self, fd: i32) -> Result<u32> {
        Ok(self.file_layout(fd)?.stripe_count)
    }

    /// Name of the data pool backing the file behind `fd`.
    pub fn get_file_pool_name(&self, fd: i32) -> Result<String> {
        Ok(self
            .file_layout(fd)?
            .pool
            .unwrap_or_else(|| "default".to_string()))
    }

    fn file_layout(&self, fd: i32) -> Result<FileLayout> {
        self.ensure_mounted()?;
        let file = self.file(fd)?;
        match &file.layout {
            // captured at open; stays valid for the descriptor's lifetime
            Some(layout) => Ok(layout.clone()),
            None => self.meta.get_layout(file.node).map_err(Into::into),
        }
    }

    pub(crate) fn file(&self, fd: i32) -> Result<Arc<OpenFile>> {
        self.files.lock().expect("file table poisoned").get(fd)
    }
}
