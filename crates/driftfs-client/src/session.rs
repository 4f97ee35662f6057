//! The mount session.
//!
//! A [`Session`] owns the lifecycle state, the resolved mount root, the
//! cwd component stack, the configuration overlay, and the open-handle
//! tables. Operations are grouped by concern across the sibling modules
//! (`fileops`, `dirops`, `attrops`, `xattr`); this module holds the
//! shared state and the lifecycle transitions themselves.
//!
//! All methods take `&self`; internal locks serialize table mutations
//! while service calls run outside any table lock, so slow backend
//! operations never block unrelated descriptors.

use crate::config::{ConfigOverlay, DEFAULT_MAX_FOLLOW_SYMLINKS, KEY_MAX_FOLLOW_SYMLINKS};
use crate::error::{ClientError, Result};
use crate::handle::{DirTable, FileTable};
use crate::lifecycle::MountState;
use crate::resolver::{render_path, PathComponent, Resolver};
use driftfs_meta::service::ConfigStore;
use driftfs_meta::types::NodeId;
use driftfs_meta::{DataService, MetadataService};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

/// One client mount session over a metadata/data service pair.
pub struct Session {
    pub(crate) meta: Arc<dyn MetadataService>,
    pub(crate) data: Arc<dyn DataService>,
    pub(crate) state: RwLock<MountState>,
    /// Node the session is rooted at; only meaningful while mounted.
    pub(crate) root: RwLock<NodeId>,
    /// Current directory as a component stack; empty means the root.
    pub(crate) cwd: RwLock<Vec<PathComponent>>,
    pub(crate) config: ConfigOverlay,
    pub(crate) files: Mutex<FileTable>,
    pub(crate) dirs: Mutex<DirTable>,
}

impl Session {
    /// Creates a session in the `Created` state. Nothing but
    /// configuration is permitted until [`mount`](Self::mount).
    pub fn new(meta: Arc<dyn MetadataService>, data: Arc<dyn DataService>) -> Self {
        let root = meta.root();
        Self {
            meta,
            data,
            state: RwLock::new(MountState::Created),
            root: RwLock::new(root),
            cwd: RwLock::new(Vec::new()),
            config: ConfigOverlay::new(),
            files: Mutex::new(FileTable::new()),
            dirs: Mutex::new(DirTable::new()),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MountState {
        *self.state.read().expect("state lock poisoned")
    }

    /// Mounts the session, rooting it at `root_path` within the service
    /// namespace (`"/"` or the empty string for the service root). The
    /// path must name a directory. Allowed from `Created` and
    /// `Unmounted`; remounting keeps configuration but starts with a
    /// fresh cwd and empty handle tables.
    pub fn mount(&self, root_path: &str) -> Result<()> {
        let mut state = self.state.write().expect("state lock poisoned");
        state.check_mount()?;

        let path = if root_path.is_empty() { "/" } else { root_path };
        let resolver = Resolver::new(self.meta.as_ref(), self.meta.root(), self.max_follows());
        let node = resolver.resolve_node(&[], path, true)?;
        if !self.meta.get_attrs(node)?.is_dir() {
            return Err(ClientError::NotADirectory { path: path.into() });
        }

        *self.root.write().expect("root lock poisoned") = node;
        self.cwd.write().expect("cwd lock poisoned").clear();
        *state = MountState::Mounted;
        debug!("session: mounted at {:?} (node {})", path, node);
        Ok(())
    }

    /// Unmounts the session. Every open descriptor and directory cursor
    /// is invalidated; configuration is retained for a later remount.
    pub fn unmount(&self) -> Result<()> {
        let mut state = self.state.write().expect("state lock poisoned");
        state.check_unmount()?;
        self.files.lock().expect("file table poisoned").clear();
        self.dirs.lock().expect("dir table poisoned").clear();
        self.cwd.write().expect("cwd lock poisoned").clear();
        *state = MountState::Unmounted;
        debug!("session: unmounted");
        Ok(())
    }

    /// Releases the session. Terminal; fails with already-mounted while
    /// the session is still mounted.
    pub fn release(&self) -> Result<()> {
        let mut state = self.state.write().expect("state lock poisoned");
        state.check_release()?;
        *state = MountState::Released;
        debug!("session: released");
        Ok(())
    }

    /// Sets one configuration option. Permitted in any state but
    /// `Released`.
    pub fn conf_set(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_not_released()?;
        self.config.set(key, value);
        Ok(())
    }

    /// Reads one configuration option.
    pub fn conf_get(&self, key: &str) -> Result<Option<String>> {
        self.ensure_not_released()?;
        Ok(self.config.get(key))
    }

    /// Loads options from a configuration file, returning how many were
    /// read.
    pub fn conf_read_file(&self, path: &Path) -> Result<usize> {
        self.ensure_not_released()?;
        self.config.load_file(path).map_err(ClientError::from)
    }

    /// Changes the current directory. The path must resolve to a
    /// directory; the resolved component stack is installed atomically.
    pub fn chdir(&self, path: &str) -> Result<()> {
        self.ensure_mounted()?;
        let stack = self.resolver().resolve(&self.cwd_snapshot(), path, true)?;
        let node = stack
            .last()
            .map(|c| c.node)
            .unwrap_or_else(|| self.mount_root());
        if !self.meta.get_attrs(node)?.is_dir() {
            return Err(ClientError::NotADirectory { path: path.into() });
        }
        *self.cwd.write().expect("cwd lock poisoned") = stack;
        Ok(())
    }

    /// Renders the current directory as an absolute path.
    pub fn getcwd(&self) -> Result<String> {
        self.ensure_mounted()?;
        Ok(render_path(&self.cwd_snapshot()))
    }

    pub(crate) fn ensure_mounted(&self) -> Result<()> {
        if self.state().is_mounted() {
            Ok(())
        } else {
            Err(ClientError::NotMounted)
        }
    }

    fn ensure_not_released(&self) -> Result<()> {
        if self.state() == MountState::Released {
            Err(ClientError::NotConnected)
        } else {
            Ok(())
        }
    }

    pub(crate) fn mount_root(&self) -> NodeId {
        *self.root.read().expect("root lock poisoned")
    }

    pub(crate) fn cwd_snapshot(&self) -> Vec<PathComponent> {
        self.cwd.read().expect("cwd lock poisoned").clone()
    }

    pub(crate) fn max_follows(&self) -> u32 {
        self.config
            .get_parsed(KEY_MAX_FOLLOW_SYMLINKS, DEFAULT_MAX_FOLLOW_SYMLINKS)
    }

    pub(crate) fn resolver(&self) -> Resolver<'_> {
        Resolver::new(self.meta.as_ref(), self.mount_root(), self.max_follows())
    }

    /// Resolves `path` to a node; `follow_final` selects terminal-symlink
    /// expansion.
    pub(crate) fn resolve_node(&self, path: &str, follow_final: bool) -> Result<NodeId> {
        self.resolver()
            .resolve_node(&self.cwd_snapshot(), path, follow_final)
    }

    /// Resolves the directory containing `path`'s leaf plus the leaf
    /// name, for create-type operations.
    pub(crate) fn resolve_parent(&self, path: &str) -> Result<(NodeId, String)> {
        self.resolver().resolve_parent(&self.cwd_snapshot(), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftfs_meta::MemoryFs;

    fn session() -> (Arc<MemoryFs>, Session) {
        let fs = Arc::new(MemoryFs::new());
        let session = Session::new(fs.clone(), fs.clone());
        (fs, session)
    }

    #[test]
    fn new_session_is_created() {
        let (_fs, s) = session();
        assert_eq!(s.state(), MountState::Created);
    }

    #[test]
    fn mount_unmount_release_happy_path() {
        let (_fs, s) = session();
        s.mount("/").unwrap();
        assert_eq!(s.state(), MountState::Mounted);
        s.unmount().unwrap();
        assert_eq!(s.state(), MountState::Unmounted);
        s.release().unwrap();
        assert_eq!(s.state(), MountState::Released);
    }

    #[test]
    fn double_mount_is_already_mounted() {
        let (_fs, s) = session();
        s.mount("/").unwrap();
        assert!(matches!(s.mount("/"), Err(ClientError::AlreadyMounted)));
    }

    #[test]
    fn unmount_without_mount_is_not_connected() {
        let (_fs, s) = session();
        assert!(matches!(s.unmount(), Err(ClientError::NotConnected)));
    }

    #[test]
    fn release_while_mounted_is_already_mounted() {
        let (_fs, s) = session();
        s.mount("/").unwrap();
        assert!(matches!(s.release(), Err(ClientError::AlreadyMounted)));
    }

    #[test]
    fn release_without_ever_mounting_succeeds() {
        let (_fs, s) = session();
        s.release().unwrap();
        assert_eq!(s.state(), MountState::Released);
    }

    #[test]
    fn remount_after_unmount_succeeds() {
        let (_fs, s) = session();
        s.mount("/").unwrap();
        s.unmount().unwrap();
        s.mount("/").unwrap();
        assert_eq!(s.state(), MountState::Mounted);
    }

    #[test]
    fn mount_at_subdirectory_roots_the_namespace_there() {
        let (fs, s) = session();
        let sub = fs.mkdir(fs.root(), "sub", 0o755).unwrap();
        let inner = fs.create_file(sub, "inner", 0o644, None).unwrap();
        s.mount("/sub").unwrap();
        assert_eq!(s.resolve_node("/inner", true).unwrap(), inner);
    }

    #[test]
    fn mount_at_file_is_not_a_directory() {
        let (fs, s) = session();
        fs.create_file(fs.root(), "f", 0o644, None).unwrap();
        assert!(matches!(
            s.mount("/f"),
            Err(ClientError::NotADirectory { .. })
        ));
    }

    #[test]
    fn mount_at_missing_path_is_not_found() {
        let (_fs, s) = session();
        assert!(matches!(
            s.mount("/nowhere"),
            Err(ClientError::NotFound { .. })
        ));
    }

    #[test]
    fn empty_mount_path_means_service_root() {
        let (fs, s) = session();
        s.mount("").unwrap();
        assert_eq!(s.mount_root(), fs.root());
    }

    #[test]
    fn config_survives_unmount_and_remount() {
        let (_fs, s) = session();
        s.conf_set("client_readdir_page_size", "7").unwrap();
        s.mount("/").unwrap();
        s.unmount().unwrap();
        assert_eq!(
            s.conf_get("client_readdir_page_size").unwrap().as_deref(),
            Some("7")
        );
        s.mount("/").unwrap();
        assert_eq!(
            s.conf_get("client_readdir_page_size").unwrap().as_deref(),
            Some("7")
        );
    }

    #[test]
    fn config_rejected_after_release() {
        let (_fs, s) = session();
        s.release().unwrap();
        assert!(matches!(
            s.conf_set("k", "v"),
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(s.conf_get("k"), Err(ClientError::NotConnected)));
    }

    #[test]
    fn cwd_starts_at_root() {
        let (_fs, s) = session();
        s.mount("/").unwrap();
        assert_eq!(s.getcwd().unwrap(), "/");
    }

    #[test]
    fn chdir_and_getcwd_round_trip() {
        let (fs, s) = session();
        let a = fs.mkdir(fs.root(), "a", 0o755).unwrap();
        fs.mkdir(a, "b", 0o755).unwrap();
        s.mount("/").unwrap();
        s.chdir("/a/b").unwrap();
        assert_eq!(s.getcwd().unwrap(), "/a/b");
        s.chdir("..").unwrap();
        assert_eq!(s.getcwd().unwrap(), "/a");
    }

    #[test]
    fn chdir_to_file_is_not_a_directory() {
        let (fs, s) = session();
        fs.create_file(fs.root(), "f", 0o644, None).unwrap();
        s.mount("/").unwrap();
        assert!(matches!(
            s.chdir("/f"),
            Err(ClientError::NotADirectory { .. })
        ));
    }

    #[test]
    fn chdir_requires_mount() {
        let (_fs, s) = session();
        assert!(matches!(s.chdir("/"), Err(ClientError::NotMounted)));
        assert!(matches!(s.getcwd(), Err(ClientError::NotMounted)));
    }

    #[test]
    fn cwd_resets_on_remount() {
        let (fs, s) = session();
        fs.mkdir(fs.root(), "a", 0o755).unwrap();
        s.mount("/").unwrap();
        s.chdir("/a").unwrap();
        s.unmount().unwrap();
        s.mount("/").unwrap();
        assert_eq!(s.getcwd().unwrap(), "/");
    }

    #[test]
    fn symlink_bound_is_configurable() {
        let (fs, s) = session();
        fs.create_file(fs.root(), "end", 0o644, None).unwrap();
        fs.symlink(fs.root(), "l0", "/end").unwrap();
        for i in 1..6 {
            fs.symlink(fs.root(), &format!("l{}", i), &format!("/l{}", i - 1))
                .unwrap();
        }
        s.conf_set(KEY_MAX_FOLLOW_SYMLINKS, "3").unwrap();
        s.mount("/").unwrap();
        assert!(matches!(
            s.resolve_node("/l5", true),
            Err(ClientError::SymlinkLoop { .. })
        ));
        s.conf_set(KEY_MAX_FOLLOW_SYMLINKS, "40").unwrap();
        assert!(s.resolve_node("/l5", true).is_ok());
    }
}
