//! Client-visible error taxonomy.
//!
//! Every public session operation returns either a success value or one
//! classified failure. The adapter layer surfaces these as signed integer
//! codes via [`ClientError::to_errno`].

use driftfs_meta::ServiceError;
use thiserror::Error;

/// Failure conditions a session reports to its caller.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The operation needs a mounted session.
    #[error("Session is not mounted")]
    NotMounted,

    /// The session is already mounted.
    #[error("Session is already mounted")]
    AlreadyMounted,

    /// The session has been released.
    #[error("Session is not connected")]
    NotConnected,

    /// The path does not name an entry.
    #[error("Not found: {path}")]
    NotFound {
        /// Path as the caller supplied it.
        path: String,
    },

    /// The path already names an entry.
    #[error("Already exists: {path}")]
    AlreadyExists {
        /// Path as the caller supplied it.
        path: String,
    },

    /// A directory operation addressed a non-directory.
    #[error("Not a directory: {path}")]
    NotADirectory {
        /// Path as the caller supplied it.
        path: String,
    },

    /// A file operation addressed a directory.
    #[error("Is a directory: {path}")]
    IsADirectory {
        /// Path as the caller supplied it.
        path: String,
    },

    /// The directory still has entries.
    #[error("Directory not empty: {path}")]
    NotEmpty {
        /// Path as the caller supplied it.
        path: String,
    },

    /// The descriptor is closed, stale, or lacks the needed access mode.
    #[error("Bad file descriptor: {fd}")]
    BadDescriptor {
        /// The offending descriptor number.
        fd: i32,
    },

    /// The request itself is malformed.
    #[error("Invalid argument: {msg}")]
    InvalidArgument {
        /// What was wrong with it.
        msg: String,
    },

    /// Symlink expansion exceeded the configured bound.
    #[error("Too many levels of symbolic links: {path}")]
    SymlinkLoop {
        /// Path whose resolution looped.
        path: String,
    },

    /// Caller-supplied buffer too small; `needed` carries the required
    /// size when known, so the caller can retry exactly once.
    #[error("Result does not fit in the supplied buffer")]
    RangeTooSmall {
        /// Required size, when known.
        needed: Option<usize>,
    },

    /// No extended attribute by that name.
    #[error("No such attribute: {name}")]
    NoSuchAttr {
        /// Name of the missing attribute.
        name: String,
    },

    /// A buffer could not be allocated.
    #[error("Out of memory")]
    OutOfMemory,

    /// The caller may not perform this operation.
    #[error("Permission denied: {path}")]
    PermissionDenied {
        /// Path as the caller supplied it.
        path: String,
    },

    /// The backend cannot grow any further.
    #[error("No space left on device")]
    NoSpace,

    /// Unclassified service failure.
    #[error("I/O failure: {msg}")]
    Io {
        /// Service-reported detail.
        msg: String,
    },
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// Maps this error to a conventional errno value.
    pub fn to_errno(&self) -> i32 {
        use libc::*;
        match self {
            ClientError::NotMounted => ENOTCONN,
            ClientError::AlreadyMounted => EISCONN,
            ClientError::NotConnected => ENOTCONN,
            ClientError::NotFound { .. } => ENOENT,
            ClientError::AlreadyExists { .. } => EEXIST,
            ClientError::NotADirectory { .. } => ENOTDIR,
            ClientError::IsADirectory { .. } => EISDIR,
            ClientError::NotEmpty { .. } => ENOTEMPTY,
            ClientError::BadDescriptor { .. } => EBADF,
            ClientError::InvalidArgument { .. } => EINVAL,
            ClientError::SymlinkLoop { .. } => ELOOP,
            ClientError::RangeTooSmall { .. } => ERANGE,
            ClientError::NoSuchAttr { .. } => ENODATA,
            ClientError::OutOfMemory => ENOMEM,
            ClientError::PermissionDenied { .. } => EACCES,
            ClientError::NoSpace => ENOSPC,
            ClientError::Io { .. } => EIO,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ClientError::InvalidArgument { msg: msg.into() }
    }

    /// Rewrites the path carried by a path-bearing variant, so a failure
    /// classified against a single entry name reads as the full path the
    /// caller supplied.
    pub(crate) fn with_path(self, path: &str) -> Self {
        match self {
            ClientError::NotFound { .. } => ClientError::NotFound { path: path.into() },
            ClientError::AlreadyExists { .. } => ClientError::AlreadyExists { path: path.into() },
            ClientError::NotADirectory { .. } => ClientError::NotADirectory { path: path.into() },
            ClientError::IsADirectory { .. } => ClientError::IsADirectory { path: path.into() },
            ClientError::NotEmpty { .. } => ClientError::NotEmpty { path: path.into() },
            ClientError::PermissionDenied { .. } => {
                ClientError::PermissionDenied { path: path.into() }
            }
            other => other,
        }
    }
}

impl From<ServiceError> for ClientError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound { name } => ClientError::NotFound { path: name },
            ServiceError::AlreadyExists { name } => ClientError::AlreadyExists { path: name },
            ServiceError::NotADirectory { name } => ClientError::NotADirectory { path: name },
            ServiceError::IsADirectory { name } => ClientError::IsADirectory { path: name },
            ServiceError::NotEmpty { name } => ClientError::NotEmpty { path: name },
            ServiceError::NoSuchAttr { name } => ClientError::NoSuchAttr { name },
            ServiceError::RangeTooSmall { needed } => ClientError::RangeTooSmall { needed },
            ServiceError::InvalidArgument { msg } => ClientError::InvalidArgument { msg },
            ServiceError::PermissionDenied { name } => ClientError::PermissionDenied { path: name },
            ServiceError::NoSpace => ClientError::NoSpace,
            ServiceError::Io { msg } => ClientError::Io { msg },
        }
    }
}
