#![warn(missing_docs)]

//! DriftFS metadata subsystem: the service contract a mount session speaks,
//! the shared data model, and an in-memory reference backend.

pub mod error;
pub mod memfs;
pub mod service;
pub mod types;

pub use error::{Result, ServiceError};
pub use memfs::MemoryFs;
pub use service::{ConfigStore, DataService, MetadataService};
