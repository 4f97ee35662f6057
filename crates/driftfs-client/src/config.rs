//! Session configuration overlay.
//!
//! A key/value store queried by the session core. Values set here are
//! retained across mount/unmount cycles and discarded only when the
//! session is released.

use driftfs_meta::error::{Result as ServiceResult, ServiceError};
use driftfs_meta::service::ConfigStore;
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use tracing::debug;

/// Symlink expansion bound during path resolution.
pub const KEY_MAX_FOLLOW_SYMLINKS: &str = "client_max_follow_symlinks";
/// Entries fetched per metadata page while enumerating a directory.
pub const KEY_READDIR_PAGE_SIZE: &str = "client_readdir_page_size";

/// Default symlink expansion bound, matching the conventional loop limit.
pub const DEFAULT_MAX_FOLLOW_SYMLINKS: u32 = 40;
/// Default enumerator page size.
pub const DEFAULT_READDIR_PAGE_SIZE: usize = 1024;

/// Key/value configuration overlay.
pub struct ConfigOverlay {
    values: RwLock<HashMap<String, String>>,
}

impl ConfigOverlay {
    /// Creates an empty overlay.
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
        }
    }

    /// Reads a key and parses it, falling back to `default` when absent
    /// or unparsable.
    pub fn get_parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}

impl Default for ConfigOverlay {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for ConfigOverlay {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .expect("config lock poisoned")
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        debug!("config: set {} = {}", key, value);
        self.values
            .write()
            .expect("config lock poisoned")
            .insert(key.to_string(), value.to_string());
    }

    fn load_file(&self, path: &Path) -> ServiceResult<usize> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ServiceError::not_found(path.display().to_string())
            } else {
                ServiceError::Io { msg: e.to_string() }
            }
        })?;
        let mut loaded = 0;
        let mut values = self.values.write().expect("config lock poisoned");
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            // section headers are tolerated and ignored
            if line.starts_with('[') && line.ends_with(']') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ServiceError::InvalidArgument {
                    msg: format!("malformed config line {:?}", line),
                });
            };
            values.insert(key.trim().to_string(), value.trim().to_string());
            loaded += 1;
        }
        debug!("config: loaded {} options from {}", loaded, path.display());
        Ok(loaded)
    }
}
