//! Error types.
//!
//! [`RemoteError`] is what a [`VaultClient`](crate::remote::VaultClient)
//! reports. It never crosses the façade: every operation maps it into the
//! fixed [`VaultError`] taxonomy.

use std::io;
use thiserror::Error;

/// Failure reported by a remote vault client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The remote object does not exist (or its parent does not).
    #[error("remote not found: {0}")]
    NotFound(String),

    /// Version precondition failed, or the destination already exists.
    #[error("remote conflict: {0}")]
    Conflict(String),

    /// Missing or rejected credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Any other non-success HTTP status.
    #[error("remote returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Connection, TLS or timeout failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a Conflict error.
    pub fn conflict(path: impl Into<String>) -> Self {
        Self::Conflict(path.into())
    }

    /// Create a Transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

/// Result type for remote client calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Filesystem error surfaced to the editor host.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VaultError {
    /// Remote object absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Version mismatch on write, or rename destination exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Any other remote or network failure. Not retried automatically.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Write attempted while the mount is read-only.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No project is mounted, or the URI names a different project.
    #[error("no vault mounted for project {0}")]
    NotMounted(String),

    /// A project is already mounted (or mid-transition).
    #[error("project {0} is already mounted")]
    AlreadyMounted(String),

    /// URI does not have the `scheme://project-{id}/vault{path}` shape.
    #[error("invalid vault uri: {0}")]
    InvalidUri(String),
}

impl VaultError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a Conflict error.
    pub fn conflict(path: impl Into<String>) -> Self {
        Self::Conflict(path.into())
    }

    /// Create an Unavailable error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied(path.into())
    }

    /// Create an InvalidUri error.
    pub fn invalid_uri(uri: impl Into<String>) -> Self {
        Self::InvalidUri(uri.into())
    }

    /// Map a remote failure where only "absent" is meaningful to the caller.
    pub(crate) fn from_remote(path: &str, err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound(_) => Self::not_found(path),
            other => Self::unavailable(format!("{path}: {other}")),
        }
    }
}

/// Convert VaultError to std::io::Error for hosts that speak io errors.
impl From<VaultError> for io::Error {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VaultError::Conflict(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            VaultError::Unavailable(msg) => io::Error::other(msg),
            VaultError::PermissionDenied(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            VaultError::NotMounted(msg) => io::Error::new(io::ErrorKind::NotConnected, msg),
            VaultError::AlreadyMounted(msg) => io::Error::new(io::ErrorKind::AddrInUse, msg),
            VaultError::InvalidUri(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
        }
    }
}

/// Result type for façade operations.
pub type VaultResult<T> = Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_mapping_never_leaks_transport() {
        let err = VaultError::from_remote("/a.txt", RemoteError::transport("connection reset"));
        assert!(matches!(err, VaultError::Unavailable(_)));

        let err = VaultError::from_remote("/a.txt", RemoteError::not_found("/a.txt"));
        assert_eq!(err, VaultError::not_found("/a.txt"));

        // Conflicts only mean something to write and rename, which map them
        // themselves.
        let err = VaultError::from_remote("/a.txt", RemoteError::conflict("/a.txt"));
        assert!(matches!(err, VaultError::Unavailable(_)));
    }

    #[test]
    fn test_io_error_kinds() {
        let io: io::Error = VaultError::not_found("/x").into();
        assert_eq!(io.kind(), io::ErrorKind::NotFound);
        let io: io::Error = VaultError::permission_denied("/x").into();
        assert_eq!(io.kind(), io::ErrorKind::PermissionDenied);
    }
}
