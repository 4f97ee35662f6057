//! Shared scaffolding for the integration suites.

use driftfs_client::Session;
use driftfs_meta::MemoryFs;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber honoring `RUST_LOG`. Safe to call from
/// every test; only the first call wins.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A fresh session over an empty in-memory filesystem, not yet mounted.
pub fn new_session() -> (Arc<MemoryFs>, Session) {
    init_logging();
    let fs = Arc::new(MemoryFs::new());
    let session = Session::new(fs.clone(), fs.clone());
    (fs, session)
}

/// A fresh session mounted at the service root.
pub fn mounted_session() -> (Arc<MemoryFs>, Session) {
    let (fs, session) = new_session();
    session.mount("/").expect("mount fresh session");
    (fs, session)
}
