//! CLI configuration file.
//!
//! RON at `<config_dir>/devvault/config.ron` unless `--config` names another
//! file. Every field is optional.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use devvault_client::constants::DEFAULT_SERVER_URL;
use devvault_vfs::VaultConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How write conflicts are settled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConflictMode {
    /// Prompt on the terminal.
    #[default]
    Ask,
    Overwrite,
    Discard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub server_url: String,
    pub token: Option<String>,
    /// Project mounted when `--project` is not given.
    pub project: Option<String>,
    pub on_conflict: ConflictMode,
    pub vault: VaultConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            token: None,
            project: None,
            on_conflict: ConflictMode::default(),
            vault: VaultConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: ron::error::SpannedError,
    },
}

/// `<config_dir>/devvault/config.ron`, if the platform has a config dir.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("devvault").join("config.ron"))
}

impl CliConfig {
    /// Load `explicit`, or the default file if it exists.
    ///
    /// A missing default file yields defaults; a missing explicit file is an
    /// error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
