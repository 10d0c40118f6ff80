//! In-memory vault.
//!
//! Behaves like the remote vault API: every successful write mints a new
//! ETag, stale `If-Match` preconditions are rejected with `Conflict`, and
//! writes into a missing directory are `NotFound`. All data is ephemeral.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::VaultClient;
use crate::error::{RemoteError, RemoteResult};
use crate::types::{Precondition, ReadResult, RemoteEntry, RemoteStat, RenameResult, WriteResult};
use crate::uri::VaultPath;

/// Logical clock start, so mtimes look like epoch milliseconds.
const CLOCK_EPOCH_MS: u64 = 1_700_000_000_000;

#[derive(Debug, Clone)]
enum Entry {
    File {
        data: Vec<u8>,
        etag: String,
        created_at_ms: u64,
        modified_at_ms: u64,
    },
    Directory {
        created_at_ms: u64,
        modified_at_ms: u64,
    },
}

impl Entry {
    fn stat(&self) -> RemoteStat {
        match self {
            Entry::File {
                data,
                created_at_ms,
                modified_at_ms,
                ..
            } => RemoteStat {
                is_directory: false,
                size_bytes: data.len() as u64,
                created_at_ms: *created_at_ms,
                modified_at_ms: *modified_at_ms,
            },
            Entry::Directory {
                created_at_ms,
                modified_at_ms,
            } => RemoteStat {
                is_directory: true,
                size_bytes: 0,
                created_at_ms: *created_at_ms,
                modified_at_ms: *modified_at_ms,
            },
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Entry::Directory { .. })
    }
}

type Tree = HashMap<VaultPath, Entry>;

/// Per-operation call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub stat: usize,
    pub list: usize,
    pub read: usize,
    pub write: usize,
    pub delete: usize,
    pub rename: usize,
    pub mkdir: usize,
}

impl CallCounts {
    /// Total remote calls of any kind.
    pub fn total(&self) -> usize {
        self.stat + self.list + self.read + self.write + self.delete + self.rename + self.mkdir
    }
}

#[derive(Debug, Default)]
struct Counters {
    stat: AtomicUsize,
    list: AtomicUsize,
    read: AtomicUsize,
    write: AtomicUsize,
    delete: AtomicUsize,
    rename: AtomicUsize,
    mkdir: AtomicUsize,
}

/// In-memory [`VaultClient`].
///
/// Each project gets its own tree with a root directory, created on first
/// access.
#[derive(Debug)]
pub struct MemoryVault {
    projects: RwLock<HashMap<String, Tree>>,
    clock: AtomicU64,
    versions: AtomicU64,
    honor_wildcard: AtomicBool,
    offline: AtomicBool,
    calls: Counters,
}

impl Default for MemoryVault {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryVault {
    /// Create an empty vault.
    pub fn new() -> Self {
        Self {
            projects: RwLock::new(HashMap::new()),
            clock: AtomicU64::new(CLOCK_EPOCH_MS),
            versions: AtomicU64::new(0),
            honor_wildcard: AtomicBool::new(true),
            offline: AtomicBool::new(false),
            calls: Counters::default(),
        }
    }

    // ========================================================================
    // Test controls
    // ========================================================================

    /// Simulate a backend that rejects `If-Match: *` as a conflict.
    pub fn set_honor_wildcard(&self, honor: bool) {
        self.honor_wildcard.store(honor, Ordering::SeqCst);
    }

    /// While offline every call fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Snapshot of call counters.
    pub fn calls(&self) -> CallCounts {
        CallCounts {
            stat: self.calls.stat.load(Ordering::SeqCst),
            list: self.calls.list.load(Ordering::SeqCst),
            read: self.calls.read.load(Ordering::SeqCst),
            write: self.calls.write.load(Ordering::SeqCst),
            delete: self.calls.delete.load(Ordering::SeqCst),
            rename: self.calls.rename.load(Ordering::SeqCst),
            mkdir: self.calls.mkdir.load(Ordering::SeqCst),
        }
    }

    /// Create or replace a file out of band (an agent writing), creating
    /// parent directories. Returns the new ETag.
    pub fn seed_file(&self, project_id: &str, path: &str, data: &[u8]) -> String {
        let path = VaultPath::new(path);
        let now = self.tick();
        let etag = self.next_etag();
        let mut projects = self.projects.write();
        let tree = Self::tree_mut(&mut projects, project_id, now);
        Self::ensure_parents(tree, &path, now);
        let created_at_ms = match tree.get(&path) {
            Some(Entry::File { created_at_ms, .. }) => *created_at_ms,
            _ => now,
        };
        tree.insert(
            path,
            Entry::File {
                data: data.to_vec(),
                etag: etag.clone(),
                created_at_ms,
                modified_at_ms: now,
            },
        );
        etag
    }

    /// Create a directory (and its parents) out of band.
    pub fn seed_dir(&self, project_id: &str, path: &str) {
        let path = VaultPath::new(path);
        let now = self.tick();
        let mut projects = self.projects.write();
        let tree = Self::tree_mut(&mut projects, project_id, now);
        Self::ensure_parents(tree, &path, now);
        tree.entry(path).or_insert(Entry::Directory {
            created_at_ms: now,
            modified_at_ms: now,
        });
    }

    /// Current content of a file, if it exists.
    pub fn file_content(&self, project_id: &str, path: &str) -> Option<Vec<u8>> {
        let projects = self.projects.read();
        match projects.get(project_id)?.get(&VaultPath::new(path))? {
            Entry::File { data, .. } => Some(data.clone()),
            Entry::Directory { .. } => None,
        }
    }

    /// Current ETag of a file, if it exists.
    pub fn file_etag(&self, project_id: &str, path: &str) -> Option<String> {
        let projects = self.projects.read();
        match projects.get(project_id)?.get(&VaultPath::new(path))? {
            Entry::File { etag, .. } => Some(etag.clone()),
            Entry::Directory { .. } => None,
        }
    }

    /// True if anything exists at `path`.
    pub fn exists(&self, project_id: &str, path: &str) -> bool {
        let path = VaultPath::new(path);
        path.is_root()
            || self
                .projects
                .read()
                .get(project_id)
                .is_some_and(|tree| tree.contains_key(&path))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn next_etag(&self) -> String {
        format!("\"v{}\"", self.versions.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn check_online(&self) -> RemoteResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RemoteError::transport("memory vault is offline"))
        } else {
            Ok(())
        }
    }

    fn count(&self, counter: &AtomicUsize) -> RemoteResult<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        self.check_online()
    }

    fn tree_mut<'a>(
        projects: &'a mut HashMap<String, Tree>,
        project_id: &str,
        now: u64,
    ) -> &'a mut Tree {
        projects.entry(project_id.to_string()).or_insert_with(|| {
            let mut tree = Tree::new();
            tree.insert(
                VaultPath::root(),
                Entry::Directory {
                    created_at_ms: now,
                    modified_at_ms: now,
                },
            );
            tree
        })
    }

    fn ensure_parents(tree: &mut Tree, path: &VaultPath, now: u64) {
        let mut current = path.parent();
        while let Some(dir) = current {
            current = dir.parent();
            tree.entry(dir).or_insert(Entry::Directory {
                created_at_ms: now,
                modified_at_ms: now,
            });
        }
    }

    fn parent_is_dir(tree: &Tree, path: &VaultPath) -> bool {
        path.parent()
            .is_some_and(|parent| tree.get(&parent).is_some_and(Entry::is_dir))
    }

    fn touch_parent(tree: &mut Tree, path: &VaultPath, now: u64) {
        if let Some(Entry::Directory { modified_at_ms, .. }) =
            path.parent().and_then(|parent| tree.get_mut(&parent))
        {
            *modified_at_ms = now;
        }
    }

    /// Paths of `path` and everything beneath it.
    fn subtree(tree: &Tree, path: &VaultPath) -> Vec<VaultPath> {
        tree.keys().filter(|p| p.starts_with(path)).cloned().collect()
    }
}

#[async_trait]
impl VaultClient for MemoryVault {
    async fn stat(&self, project_id: &str, path: &str) -> RemoteResult<RemoteStat> {
        self.count(&self.calls.stat)?;
        let now = self.tick();
        let path = VaultPath::new(path);
        let mut projects = self.projects.write();
        let tree = Self::tree_mut(&mut projects, project_id, now);
        tree.get(&path)
            .map(Entry::stat)
            .ok_or_else(|| RemoteError::not_found(path.as_str()))
    }

    async fn list(&self, project_id: &str, path: &str) -> RemoteResult<Vec<RemoteEntry>> {
        self.count(&self.calls.list)?;
        let now = self.tick();
        let path = VaultPath::new(path);
        let mut projects = self.projects.write();
        let tree = Self::tree_mut(&mut projects, project_id, now);

        match tree.get(&path) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { .. }) => {
                return Err(RemoteError::Status {
                    status: 400,
                    message: format!("not a directory: {path}"),
                });
            }
            None => return Err(RemoteError::not_found(path.as_str())),
        }

        let mut result: Vec<RemoteEntry> = tree
            .iter()
            .filter(|(p, _)| !p.is_root() && p.parent().as_ref() == Some(&path))
            .map(|(p, entry)| RemoteEntry {
                name: p.file_name().to_string(),
                is_directory: entry.is_dir(),
            })
            .collect();

        // Sort for consistent ordering
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn read(&self, project_id: &str, path: &str) -> RemoteResult<ReadResult> {
        self.count(&self.calls.read)?;
        let path = VaultPath::new(path);
        let projects = self.projects.read();
        match projects.get(project_id).and_then(|tree| tree.get(&path)) {
            Some(Entry::File { data, etag, .. }) => Ok(ReadResult {
                content: data.clone(),
                etag: etag.clone(),
            }),
            Some(Entry::Directory { .. }) => Err(RemoteError::Status {
                status: 400,
                message: format!("is a directory: {path}"),
            }),
            None => Err(RemoteError::not_found(path.as_str())),
        }
    }

    async fn write(
        &self,
        project_id: &str,
        path: &str,
        content: &[u8],
        precondition: &Precondition,
    ) -> RemoteResult<WriteResult> {
        self.count(&self.calls.write)?;
        let now = self.tick();
        let path = VaultPath::new(path);
        let mut projects = self.projects.write();
        let tree = Self::tree_mut(&mut projects, project_id, now);

        if !Self::parent_is_dir(tree, &path) {
            return Err(RemoteError::not_found(path.as_str()));
        }

        let existing = tree.get(&path);
        if existing.is_some_and(Entry::is_dir) {
            return Err(RemoteError::Status {
                status: 400,
                message: format!("is a directory: {path}"),
            });
        }

        match precondition {
            Precondition::None => {}
            Precondition::IfMatch(expected) => match existing {
                Some(Entry::File { etag, .. }) if etag == expected => {}
                _ => return Err(RemoteError::conflict(path.as_str())),
            },
            Precondition::Any => {
                if !self.honor_wildcard.load(Ordering::SeqCst) {
                    return Err(RemoteError::conflict(path.as_str()));
                }
            }
        }

        let created_at_ms = match existing {
            Some(Entry::File { created_at_ms, .. }) => *created_at_ms,
            _ => now,
        };
        let is_new = existing.is_none();
        let etag = self.next_etag();
        tree.insert(
            path.clone(),
            Entry::File {
                data: content.to_vec(),
                etag: etag.clone(),
                created_at_ms,
                modified_at_ms: now,
            },
        );
        if is_new {
            Self::touch_parent(tree, &path, now);
        }
        Ok(WriteResult { etag })
    }

    async fn delete(&self, project_id: &str, path: &str, recursive: bool) -> RemoteResult<()> {
        self.count(&self.calls.delete)?;
        let now = self.tick();
        let path = VaultPath::new(path);
        if path.is_root() {
            return Err(RemoteError::Status {
                status: 403,
                message: "cannot delete the vault root".to_string(),
            });
        }
        let mut projects = self.projects.write();
        let tree = Self::tree_mut(&mut projects, project_id, now);

        if !tree.contains_key(&path) {
            return Err(RemoteError::not_found(path.as_str()));
        }
        let doomed = Self::subtree(tree, &path);
        if doomed.len() > 1 && !recursive {
            return Err(RemoteError::Status {
                status: 400,
                message: format!("directory not empty: {path}"),
            });
        }
        for p in doomed {
            tree.remove(&p);
        }
        Self::touch_parent(tree, &path, now);
        Ok(())
    }

    async fn rename(
        &self,
        project_id: &str,
        from: &str,
        to: &str,
        overwrite: bool,
    ) -> RemoteResult<RenameResult> {
        self.count(&self.calls.rename)?;
        let now = self.tick();
        let from = VaultPath::new(from);
        let to = VaultPath::new(to);
        let mut projects = self.projects.write();
        let tree = Self::tree_mut(&mut projects, project_id, now);

        if from.is_root() || !tree.contains_key(&from) {
            return Err(RemoteError::not_found(from.as_str()));
        }
        if tree.contains_key(&to) && !overwrite {
            return Err(RemoteError::conflict(to.as_str()));
        }
        if !Self::parent_is_dir(tree, &to) {
            return Err(RemoteError::not_found(to.as_str()));
        }

        for p in Self::subtree(tree, &to) {
            tree.remove(&p);
        }
        for old in Self::subtree(tree, &from) {
            if let Some(entry) = tree.remove(&old) {
                let suffix = &old.as_str()[from.as_str().len()..];
                tree.insert(VaultPath::new(&format!("{to}{suffix}")), entry);
            }
        }
        Self::touch_parent(tree, &from, now);
        Self::touch_parent(tree, &to, now);

        let etag = match tree.get(&to) {
            Some(Entry::File { etag, .. }) => Some(etag.clone()),
            _ => None,
        };
        Ok(RenameResult { etag })
    }

    async fn mkdir(&self, project_id: &str, path: &str) -> RemoteResult<()> {
        self.count(&self.calls.mkdir)?;
        let now = self.tick();
        let path = VaultPath::new(path);
        let mut projects = self.projects.write();
        let tree = Self::tree_mut(&mut projects, project_id, now);

        if tree.contains_key(&path) {
            return Err(RemoteError::conflict(path.as_str()));
        }
        if !Self::parent_is_dir(tree, &path) {
            return Err(RemoteError::not_found(path.as_str()));
        }
        tree.insert(
            path.clone(),
            Entry::Directory {
                created_at_ms: now,
                modified_at_ms: now,
            },
        );
        Self::touch_parent(tree, &path, now);
        Ok(())
    }
}
