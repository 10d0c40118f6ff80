//! Façade tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default URI scheme for mounted vaults.
pub const DEFAULT_SCHEME: &str = "devvault";

/// Stat and directory entries live this long after population.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 30;

/// Change events arriving within this window are delivered as one batch.
pub const DEFAULT_DEBOUNCE_MS: u64 = 5;

/// Capacity of the change-event broadcast channel (in batches).
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Bounded retries for the read-modify-write overwrite fallback.
pub const DEFAULT_FORCE_WRITE_ATTEMPTS: u32 = 3;

/// Configuration for a [`VaultFileSystem`](crate::VaultFileSystem).
///
/// Every field has a default, so a partial config file deserializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// URI scheme the host uses for the mount.
    pub scheme: String,
    /// TTL for stat and directory listing entries.
    pub cache_ttl_secs: u64,
    /// Debounce window for change events.
    pub debounce_ms: u64,
    /// Broadcast capacity for change batches.
    pub event_capacity: usize,
    /// Attempts for the read-modify-write overwrite fallback.
    pub force_write_attempts: u32,
    /// Reject all mutating operations with `PermissionDenied`.
    pub read_only: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            force_write_attempts: DEFAULT_FORCE_WRITE_ATTEMPTS,
            read_only: false,
        }
    }
}

impl VaultConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
