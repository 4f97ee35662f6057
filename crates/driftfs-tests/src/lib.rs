//! Integration and validation suites for the DriftFS client session.
//!
//! Everything here goes through the public [`driftfs_client::Session`]
//! API over the in-memory service implementation, the way an adapter
//! layer embedding the session core would.

pub mod harness;

mod io_tests;
mod xattr_tests;

pub use harness::{mounted_session, new_session};
