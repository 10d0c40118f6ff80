//! Core vault types.
//!
//! `Remote*` types mirror the wire shapes of the vault API. [`FileStat`],
//! [`DirEntry`] and [`FileChangeEvent`] are what the façade hands to the
//! editor host.

use serde::{Deserialize, Serialize};

use crate::uri::VaultUri;

// ============================================================================
// Remote (wire) types
// ============================================================================

/// Metadata returned by the remote `stat` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStat {
    /// True for directories.
    pub is_directory: bool,
    /// Size in bytes (0 for directories).
    pub size_bytes: u64,
    /// Creation time, milliseconds since the UNIX epoch.
    pub created_at_ms: u64,
    /// Last modification time, milliseconds since the UNIX epoch.
    pub modified_at_ms: u64,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    /// Entry name (not a full path).
    pub name: String,
    /// True for directories.
    pub is_directory: bool,
}

/// File content plus its version token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    pub content: Vec<u8>,
    pub etag: String,
}

/// Outcome of a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    pub etag: String,
}

/// Outcome of a successful rename.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameResult {
    /// Version token of the destination, when the remote reports one.
    #[serde(default)]
    pub etag: Option<String>,
}

/// Version precondition attached to a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// No known prior version: unconditional write.
    None,
    /// Only write if the remote version still matches this token.
    IfMatch(String),
    /// Wildcard (`If-Match: *`): overwrite whatever is there.
    Any,
}

impl Precondition {
    /// Build from an optional cached token.
    pub fn from_token(token: Option<String>) -> Self {
        match token {
            Some(tag) => Self::IfMatch(tag),
            None => Self::None,
        }
    }

    /// Header value for `If-Match`, if any.
    pub fn header_value(&self) -> Option<&str> {
        match self {
            Precondition::None => None,
            Precondition::IfMatch(tag) => Some(tag),
            Precondition::Any => Some("*"),
        }
    }
}

// ============================================================================
// Host-facing types
// ============================================================================

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl FileType {
    /// Map the wire flag.
    pub fn from_is_directory(is_directory: bool) -> Self {
        if is_directory {
            FileType::Directory
        } else {
            FileType::File
        }
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// File metadata as served to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub kind: FileType,
    pub size: u64,
    /// Milliseconds since the UNIX epoch.
    pub created_at_ms: u64,
    /// Milliseconds since the UNIX epoch.
    pub modified_at_ms: u64,
}

impl FileStat {
    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

impl From<&RemoteStat> for FileStat {
    fn from(stat: &RemoteStat) -> Self {
        Self {
            kind: FileType::from_is_directory(stat.is_directory),
            size: stat.size_bytes,
            created_at_ms: stat.created_at_ms,
            modified_at_ms: stat.modified_at_ms,
        }
    }
}

/// Directory entry as served to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: FileType,
}

impl From<&RemoteEntry> for DirEntry {
    fn from(entry: &RemoteEntry) -> Self {
        Self {
            name: entry.name.clone(),
            kind: FileType::from_is_directory(entry.is_directory),
        }
    }
}

/// Kind of filesystem change reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Changed,
    Deleted,
}

/// A change event for one URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeEvent {
    pub kind: ChangeKind,
    pub uri: VaultUri,
}

impl FileChangeEvent {
    pub fn new(kind: ChangeKind, uri: VaultUri) -> Self {
        Self { kind, uri }
    }
}

// ============================================================================
// Operation options
// ============================================================================

/// Options for `write_file`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// The host asked for the file to be created.
    pub create: bool,
    /// The host permits replacing an existing file.
    pub overwrite: bool,
}

/// Options for `delete`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    pub recursive: bool,
}

/// Options for `rename`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenameOptions {
    pub overwrite: bool,
}
