//! Dev-Vault virtual filesystem.
//!
//! A caching, conflict-aware, eventually consistent view of a remote project
//! vault that AI agents write into concurrently. An editor host mounts it
//! through [`VaultFileSystem`].
//!
//! # Layers
//!
//! - [`remote`] - the [`VaultClient`] trait the façade drives, plus the
//!   in-memory [`MemoryVault`]
//! - [`notify`] - server-push change notifications
//! - [`cache`] - TTL'd stat and listing caches, mtime-checked content cache,
//!   version tokens
//! - [`conflict`] - overwrite-or-discard on a stale version
//! - [`debounce`] - batching of change events
//! - [`filesystem`] - the mountable façade composing the above
//!
//! # Example
//!
//! ```ignore
//! let fs = VaultFileSystem::new(VaultContext {
//!     client: Arc::new(MemoryVault::new()),
//!     notifications: Arc::new(MemoryNotifier::new()),
//!     host: Arc::new(HeadlessHost::default()),
//!     session: Arc::new(StaticToken::new("token")),
//!     config: VaultConfig::default(),
//! });
//!
//! let root = fs.mount_project("p1", "Vault").await?;
//! let bytes = fs.read_file(&root.with_path("/README.md".into())).await?;
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod conflict;
pub mod debounce;
pub mod error;
pub mod filesystem;
pub mod host;
pub mod notify;
pub mod remote;
pub mod types;
pub mod uri;

pub use auth::{SessionProvider, StaticToken};
pub use cache::{CacheCounts, FillTicket, VaultCache};
pub use config::VaultConfig;
pub use conflict::ConflictResolver;
pub use debounce::EventDebouncer;
pub use error::{RemoteError, RemoteResult, VaultError, VaultResult};
pub use filesystem::{MountState, VaultContext, VaultFileSystem, WatchHandle};
pub use host::{
    ConflictChoice, EditorHost, HeadlessHost, HostCapabilities, MountStatus, WorkspaceFolder,
};
pub use notify::{
    MemoryNotifier, NotificationAction, NotificationSource, Subscription, VaultNotification,
    decode_notification,
};
pub use remote::{CallCounts, MemoryVault, VaultClient};
pub use types::{
    ChangeKind, DeleteOptions, DirEntry, FileChangeEvent, FileStat, FileType, Precondition,
    ReadResult, RemoteEntry, RemoteStat, RenameOptions, RenameResult, WriteOptions, WriteResult,
};
pub use uri::{VaultPath, VaultUri};
