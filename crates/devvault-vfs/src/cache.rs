//! Stat, directory, content and version-token caches.
//!
//! Stat and directory entries expire after a fixed TTL. Content entries have
//! no TTL of their own: a content entry is served only while its recorded
//! mtime equals the mtime of a fresh stat entry for the same path, so an
//! expired or evicted stat makes the bytes unreachable too.
//!
//! All four maps sit behind one lock that is only ever taken for a single
//! synchronous critical section, never across an `.await`.
//!
//! Values fetched from the remote are stored through the `fill_*` methods
//! with a [`FillTicket`] taken before the fetch. Any invalidation of the path
//! while the fetch was in flight makes the fill a no-op, so a slow response
//! can never re-populate a value the cache has already been told is stale.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::types::{DirEntry, FileStat};
use crate::uri::VaultPath;

/// A cached stat with its expiry.
#[derive(Debug, Clone)]
struct CachedStat {
    stat: FileStat,
    expires_at: Instant,
}

/// A cached directory listing with its expiry.
#[derive(Debug, Clone)]
struct CachedDirectory {
    entries: Vec<DirEntry>,
    expires_at: Instant,
}

/// Cached bytes, tagged with the stat mtime they were read under.
#[derive(Debug, Clone)]
struct CachedContent {
    bytes: Vec<u8>,
    mtime: u64,
}

/// Cache state observed just before a remote fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillTicket {
    epoch: u64,
    /// Mtime of the fresh stat at ticket time.
    mtime: Option<u64>,
}

#[derive(Debug, Default)]
struct CacheState {
    stats: HashMap<VaultPath, CachedStat>,
    directories: HashMap<VaultPath, CachedDirectory>,
    contents: HashMap<VaultPath, CachedContent>,
    tokens: HashMap<VaultPath, String>,
    /// Bumped on every invalidation.
    epoch: u64,
    /// Epoch at which each path was last invalidated.
    touched: HashMap<VaultPath, u64>,
    /// Epoch of the last `clear`.
    cleared_at: u64,
}

impl CacheState {
    /// Fresh stat for `path`, evicting it if expired.
    fn fresh_stat(&mut self, path: &VaultPath, now: Instant) -> Option<&FileStat> {
        let expired = self.stats.get(path).is_some_and(|c| c.expires_at <= now);
        if expired {
            self.stats.remove(path);
        }
        self.stats.get(path).map(|c| &c.stat)
    }

    fn touch(&mut self, path: &VaultPath) {
        self.epoch += 1;
        self.touched.insert(path.clone(), self.epoch);
    }

    /// True if `path` has not been invalidated since `ticket` was taken.
    fn untouched_since(&self, path: &VaultPath, ticket: &FillTicket) -> bool {
        self.cleared_at <= ticket.epoch
            && self.touched.get(path).is_none_or(|&at| at <= ticket.epoch)
    }

    fn invalidate(&mut self, path: &VaultPath) {
        self.touch(path);
        self.stats.remove(path);
        self.contents.remove(path);
        if let Some(parent) = path.parent() {
            self.touch(&parent);
            self.directories.remove(&parent);
        }
    }
}

/// Number of live entries per map. Used for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheCounts {
    pub stats: usize,
    pub directories: usize,
    pub contents: usize,
    pub tokens: usize,
}

impl CacheCounts {
    pub fn is_empty(&self) -> bool {
        self.stats == 0 && self.directories == 0 && self.contents == 0 && self.tokens == 0
    }
}

/// The façade's private key-value layer.
#[derive(Debug)]
pub struct VaultCache {
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl VaultCache {
    /// Create an empty cache with the given stat/directory TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    // ========================================================================
    // Stat
    // ========================================================================

    /// Cached stat, or `None` on miss or expiry.
    pub fn stat(&self, path: &VaultPath) -> Option<FileStat> {
        self.state.lock().fresh_stat(path, Instant::now()).cloned()
    }

    pub fn put_stat(&self, path: VaultPath, stat: FileStat) {
        let expires_at = Instant::now() + self.ttl;
        self.state
            .lock()
            .stats
            .insert(path, CachedStat { stat, expires_at });
    }

    /// Store a fetched stat unless `path` was invalidated since `ticket`.
    pub fn fill_stat(&self, path: VaultPath, stat: FileStat, ticket: &FillTicket) -> bool {
        let expires_at = Instant::now() + self.ttl;
        let mut state = self.state.lock();
        if !state.untouched_since(&path, ticket) {
            return false;
        }
        state.stats.insert(path, CachedStat { stat, expires_at });
        true
    }

    // ========================================================================
    // Directory listings
    // ========================================================================

    /// Cached listing, or `None` on miss or expiry.
    pub fn directory(&self, path: &VaultPath) -> Option<Vec<DirEntry>> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let expired = state
            .directories
            .get(path)
            .is_some_and(|c| c.expires_at <= now);
        if expired {
            state.directories.remove(path);
            return None;
        }
        state.directories.get(path).map(|c| c.entries.clone())
    }

    pub fn put_directory(&self, path: VaultPath, entries: Vec<DirEntry>) {
        let expires_at = Instant::now() + self.ttl;
        self.state
            .lock()
            .directories
            .insert(path, CachedDirectory { entries, expires_at });
    }

    /// Store a fetched listing unless `path` was invalidated since `ticket`.
    pub fn fill_directory(
        &self,
        path: VaultPath,
        entries: Vec<DirEntry>,
        ticket: &FillTicket,
    ) -> bool {
        let expires_at = Instant::now() + self.ttl;
        let mut state = self.state.lock();
        if !state.untouched_since(&path, ticket) {
            return false;
        }
        state
            .directories
            .insert(path, CachedDirectory { entries, expires_at });
        true
    }

    // ========================================================================
    // Content
    // ========================================================================

    /// Cached bytes, served only if the recorded mtime matches a fresh stat.
    ///
    /// A mismatched entry is dropped so the next read goes to the remote.
    pub fn content(&self, path: &VaultPath) -> Option<Vec<u8>> {
        let now = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let current_mtime = state.fresh_stat(path, now).map(|s| s.modified_at_ms);
        let cached = state.contents.get(path)?;
        if current_mtime == Some(cached.mtime) {
            return Some(cached.bytes.clone());
        }
        state.contents.remove(path);
        None
    }

    /// Store fetched bytes under the stat that was fresh at `ticket` time.
    ///
    /// Stores nothing when there was no fresh stat then, when the fresh stat
    /// now has a different mtime, or when `path` was invalidated meanwhile.
    pub fn fill_content(&self, path: VaultPath, bytes: Vec<u8>, ticket: &FillTicket) -> bool {
        let now = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(mtime) = ticket.mtime else {
            return false;
        };
        let current = state.fresh_stat(&path, now).map(|s| s.modified_at_ms);
        if current != Some(mtime) || !state.untouched_since(&path, ticket) {
            return false;
        }
        state.contents.insert(path, CachedContent { bytes, mtime });
        true
    }

    // ========================================================================
    // Version tokens
    // ========================================================================

    /// Last known version token for `path`.
    pub fn token(&self, path: &VaultPath) -> Option<String> {
        self.state.lock().tokens.get(path).cloned()
    }

    pub fn set_token(&self, path: VaultPath, etag: String) {
        self.state.lock().tokens.insert(path, etag);
    }

    /// Store a token from a read unless `path` was invalidated since
    /// `ticket`. A newer write or a remote change wins over the read.
    pub fn fill_token(&self, path: VaultPath, etag: String, ticket: &FillTicket) -> bool {
        let mut state = self.state.lock();
        if !state.untouched_since(&path, ticket) {
            return false;
        }
        state.tokens.insert(path, etag);
        true
    }

    /// Remove and return the token for `path`.
    pub fn take_token(&self, path: &VaultPath) -> Option<String> {
        self.state.lock().tokens.remove(path)
    }

    // ========================================================================
    // Invalidation
    // ========================================================================

    /// Snapshot to take before fetching `path` from the remote.
    pub fn ticket(&self, path: &VaultPath) -> FillTicket {
        let now = Instant::now();
        let mut state = self.state.lock();
        let mtime = state.fresh_stat(path, now).map(|s| s.modified_at_ms);
        FillTicket {
            epoch: state.epoch,
            mtime,
        }
    }

    /// Evict the stat and content of `path` and its parent's listing.
    ///
    /// Does not cascade to children and keeps the version token.
    pub fn invalidate(&self, path: &VaultPath) {
        self.state.lock().invalidate(path);
    }

    /// [`invalidate`](Self::invalidate) plus dropping the version token.
    pub fn forget(&self, path: &VaultPath) {
        let mut state = self.state.lock();
        state.invalidate(path);
        state.tokens.remove(path);
    }

    /// Drop everything, tokens included.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.epoch += 1;
        state.cleared_at = state.epoch;
        state.touched.clear();
        state.stats.clear();
        state.directories.clear();
        state.contents.clear();
        state.tokens.clear();
    }

    /// Entry counts, including not-yet-evicted expired entries.
    pub fn counts(&self) -> CacheCounts {
        let state = self.state.lock();
        CacheCounts {
            stats: state.stats.len(),
            directories: state.directories.len(),
            contents: state.contents.len(),
            tokens: state.tokens.len(),
        }
    }
}
