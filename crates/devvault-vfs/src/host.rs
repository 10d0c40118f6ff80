//! Editor host abstraction.
//!
//! The façade never assumes a concrete editor. Everything it needs from the
//! host (workspace folders, the conflict prompt, status and error reporting)
//! goes through [`EditorHost`]. Hosts advertise what they support with
//! [`HostCapabilities`].

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{info, warn};

use crate::uri::VaultUri;

/// Optional host features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostCapabilities {
    /// The host can show a mounted vault as a workspace folder.
    pub workspace_folders: bool,
    /// The host can ask the user a question and wait for the answer.
    pub interactive_prompts: bool,
}

/// A workspace folder entry for a mounted vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceFolder {
    pub uri: VaultUri,
    /// Display name.
    pub name: String,
}

/// Answer to a version conflict on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConflictChoice {
    /// Replace the remote version with ours.
    Overwrite,
    /// Drop our write and re-read the remote version.
    Discard,
}

/// Mount lifecycle as reported to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountStatus {
    /// Mounted with a live notification stream.
    Live { project_id: String },
    /// Mounted without a session: no live updates.
    Offline { project_id: String },
    Unmounted,
}

/// Everything the façade asks of the editor.
#[async_trait]
pub trait EditorHost: Send + Sync {
    fn capabilities(&self) -> HostCapabilities;

    /// Show the vault in the workspace. Returns false if the host refused.
    fn add_workspace_folder(&self, folder: &WorkspaceFolder) -> bool;

    /// Remove a previously added folder. Returns false if it was not present.
    fn remove_workspace_folder(&self, uri: &VaultUri) -> bool;

    /// Ask how to resolve a write conflict on `uri`. Called at most once per
    /// conflicting write.
    async fn resolve_conflict(&self, uri: &VaultUri) -> ConflictChoice;

    fn report_status(&self, _status: MountStatus) {}

    fn report_error(&self, _message: &str) {}
}

/// Non-interactive host: conflicts are settled by a fixed policy.
#[derive(Debug)]
pub struct HeadlessHost {
    policy: ConflictChoice,
    folders: Mutex<Vec<WorkspaceFolder>>,
}

impl HeadlessHost {
    pub fn new(policy: ConflictChoice) -> Self {
        Self {
            policy,
            folders: Mutex::new(Vec::new()),
        }
    }

    /// Folders currently shown.
    pub fn folders(&self) -> Vec<WorkspaceFolder> {
        self.folders.lock().clone()
    }
}

impl Default for HeadlessHost {
    fn default() -> Self {
        Self::new(ConflictChoice::Discard)
    }
}

#[async_trait]
impl EditorHost for HeadlessHost {
    fn capabilities(&self) -> HostCapabilities {
        HostCapabilities {
            workspace_folders: true,
            interactive_prompts: false,
        }
    }

    fn add_workspace_folder(&self, folder: &WorkspaceFolder) -> bool {
        let mut folders = self.folders.lock();
        if folders.iter().any(|f| f.uri == folder.uri) {
            return false;
        }
        folders.push(folder.clone());
        true
    }

    fn remove_workspace_folder(&self, uri: &VaultUri) -> bool {
        let mut folders = self.folders.lock();
        let before = folders.len();
        folders.retain(|f| &f.uri != uri);
        folders.len() != before
    }

    async fn resolve_conflict(&self, uri: &VaultUri) -> ConflictChoice {
        info!(uri = %uri, choice = %self.policy, "resolving write conflict by policy");
        self.policy
    }

    fn report_status(&self, status: MountStatus) {
        info!(?status, "mount status");
    }

    fn report_error(&self, message: &str) {
        warn!("{message}");
    }
}
