//! Remote vault client abstraction.
//!
//! The façade never talks HTTP itself. It drives a [`VaultClient`], which
//! performs authenticated calls against one backend and reports failures as
//! [`RemoteError`](crate::RemoteError).
//!
//! - [`MemoryVault`] - in-process vault with real ETag semantics, for tests
//!   and offline use
//! - `devvault-client::HttpVaultClient` - the HTTP adapter

mod memory;

pub use memory::{CallCounts, MemoryVault};

use async_trait::async_trait;

use crate::error::RemoteResult;
use crate::types::{Precondition, ReadResult, RemoteEntry, RemoteStat, RenameResult, WriteResult};

/// Operations the backend vault API exposes, per project.
///
/// Paths are vault paths (`/src/main.rs`) within `project_id`.
#[async_trait]
pub trait VaultClient: Send + Sync {
    /// Metadata for a path. `NotFound` if absent.
    async fn stat(&self, project_id: &str, path: &str) -> RemoteResult<RemoteStat>;

    /// Entries of a directory.
    async fn list(&self, project_id: &str, path: &str) -> RemoteResult<Vec<RemoteEntry>>;

    /// File content and its current version token.
    async fn read(&self, project_id: &str, path: &str) -> RemoteResult<ReadResult>;

    /// Write content under a version precondition.
    ///
    /// `Conflict` if the precondition is stale, `NotFound` if the parent
    /// directory does not exist.
    async fn write(
        &self,
        project_id: &str,
        path: &str,
        content: &[u8],
        precondition: &Precondition,
    ) -> RemoteResult<WriteResult>;

    /// Delete a file or directory. `NotFound` if absent.
    async fn delete(&self, project_id: &str, path: &str, recursive: bool) -> RemoteResult<()>;

    /// Move `from` to `to`.
    ///
    /// `NotFound` on a missing source, `Conflict` if `to` exists and
    /// `overwrite` is false.
    async fn rename(
        &self,
        project_id: &str,
        from: &str,
        to: &str,
        overwrite: bool,
    ) -> RemoteResult<RenameResult>;

    /// Create a directory.
    async fn mkdir(&self, project_id: &str, path: &str) -> RemoteResult<()>;
}
