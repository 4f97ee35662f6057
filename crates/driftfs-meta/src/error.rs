//! Error classification for the metadata/data service contract.

use thiserror::Error;

/// Failure conditions a backend reports to the session core.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No entry by that name.
    #[error("No such entry: {name}")]
    NotFound {
        /// Name of the missing entry.
        name: String,
    },

    /// The name is already taken in its directory.
    #[error("Entry already exists: {name}")]
    AlreadyExists {
        /// Name of the conflicting entry.
        name: String,
    },

    /// A directory operation addressed a non-directory.
    #[error("Not a directory: {name}")]
    NotADirectory {
        /// Name of the offending entry.
        name: String,
    },

    /// A file operation addressed a directory.
    #[error("Is a directory: {name}")]
    IsADirectory {
        /// Name of the offending entry.
        name: String,
    },

    /// The directory still has entries.
    #[error("Directory not empty: {name}")]
    NotEmpty {
        /// Name of the non-empty directory.
        name: String,
    },

    /// No extended attribute by that name.
    #[error("No such attribute: {name}")]
    NoSuchAttr {
        /// Name of the missing attribute.
        name: String,
    },

    /// Caller-supplied buffer is too small. `needed` carries the required
    /// size when the backend knows it.
    #[error("Buffer too small")]
    RangeTooSmall {
        /// Required size, when the backend can report one.
        needed: Option<usize>,
    },

    /// The request itself is malformed.
    #[error("Invalid argument: {msg}")]
    InvalidArgument {
        /// What was wrong with it.
        msg: String,
    },

    /// The caller may not perform this operation.
    #[error("Permission denied: {name}")]
    PermissionDenied {
        /// Name of the protected entry.
        name: String,
    },

    /// The backend cannot grow any further.
    #[error("No space left on device")]
    NoSpace,

    /// Backend-internal failure with no finer classification.
    #[error("I/O failure: {msg}")]
    Io {
        /// Backend-reported detail.
        msg: String,
    },
}

/// Result alias for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    /// Builds a `NotFound` for the given entry name.
    pub fn not_found(name: impl Into<String>) -> Self {
        ServiceError::NotFound { name: name.into() }
    }

    /// Builds an `AlreadyExists` for the given entry name.
    pub fn already_exists(name: impl Into<String>) -> Self {
        ServiceError::AlreadyExists { name: name.into() }
    }
}
