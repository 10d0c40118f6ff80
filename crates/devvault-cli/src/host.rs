//! Interactive terminal host.

use async_trait::async_trait;
use devvault_vfs::{
    ConflictChoice, EditorHost, HostCapabilities, MountStatus, VaultUri, WorkspaceFolder,
};
use dialoguer::Select;
use dialoguer::theme::ColorfulTheme;
use tracing::{info, warn};

const CHOICES: [&str; 2] = ["Overwrite the remote version", "Discard my change"];

/// Asks on the terminal. Without a TTY every conflict is discarded.
#[derive(Debug, Default)]
pub struct TerminalHost;

#[async_trait]
impl EditorHost for TerminalHost {
    fn capabilities(&self) -> HostCapabilities {
        HostCapabilities {
            workspace_folders: false,
            interactive_prompts: true,
        }
    }

    fn add_workspace_folder(&self, _folder: &WorkspaceFolder) -> bool {
        false
    }

    fn remove_workspace_folder(&self, _uri: &VaultUri) -> bool {
        false
    }

    async fn resolve_conflict(&self, uri: &VaultUri) -> ConflictChoice {
        let prompt = format!("{uri} was changed remotely since you last read it");
        let picked = tokio::task::spawn_blocking(move || {
            Select::with_theme(&ColorfulTheme::default())
                .with_prompt(prompt)
                .items(&CHOICES)
                .default(1)
                .interact()
        })
        .await;

        match picked {
            Ok(Ok(0)) => ConflictChoice::Overwrite,
            Ok(Ok(_)) => ConflictChoice::Discard,
            Ok(Err(e)) => {
                warn!(error = %e, "conflict prompt unavailable, discarding");
                ConflictChoice::Discard
            }
            Err(e) => {
                warn!(error = %e, "conflict prompt failed, discarding");
                ConflictChoice::Discard
            }
        }
    }

    fn report_status(&self, status: MountStatus) {
        match status {
            MountStatus::Live { project_id } => info!(project = %project_id, "live updates on"),
            MountStatus::Offline { project_id } => {
                warn!(project = %project_id, "no session: live updates off")
            }
            MountStatus::Unmounted => info!("unmounted"),
        }
    }

    fn report_error(&self, message: &str) {
        warn!("{message}");
    }
}
