#![warn(missing_docs)]

//! DriftFS client subsystem: the mount session core.
//!
//! A [`Session`] multiplexes concurrent file, directory, and extended-
//! attribute operations from many threads over abstract metadata/data
//! services, presenting POSIX-like semantics: paths, integer descriptors,
//! directory cursors, stat records, xattrs.

pub mod attrops;
pub mod config;
pub mod dirops;
pub mod dirstream;
pub mod error;
pub mod fileops;
pub mod handle;
pub mod lifecycle;
pub mod probe;
pub mod resolver;
pub mod session;
pub mod xattr;

pub use dirstream::{DirEntryPlus, DirPos, STAT_MASK_ALL};
pub use error::{ClientError, Result};
pub use handle::{DirCursor, OpenFlags, SeekWhence};
pub use lifecycle::MountState;
pub use session::Session;
