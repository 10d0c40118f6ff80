//! devvault - browse and edit a remote Dev-Vault from the terminal.
//!
//! Each invocation mounts the project, runs one command and unmounts.
//! `watch` stays mounted and prints change batches until interrupted.
//!
//! Usage:
//!   devvault [--project ID] ls [PATH]
//!   devvault cat PATH
//!   devvault put PATH [--file FILE] [--create]
//!   devvault rm PATH [--recursive]
//!   devvault mv FROM TO [--overwrite]
//!   devvault mkdir PATH
//!   devvault stat PATH
//!   devvault watch

mod config;
mod host;

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use devvault_client::{ConnectionStatus, HttpVaultClient, SseNotificationSource};
use devvault_vfs::{
    ChangeKind, ConflictChoice, DeleteOptions, EditorHost, FileType, HeadlessHost, RenameOptions,
    SessionProvider, StaticToken, VaultContext, VaultFileSystem, VaultPath, VaultUri,
    WriteOptions,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{CliConfig, ConflictMode};
use crate::host::TerminalHost;

#[derive(Parser, Debug)]
#[command(name = "devvault", version)]
#[command(about = "Browse and edit a remote Dev-Vault")]
struct Args {
    /// Config file (default: <config_dir>/devvault/config.ron)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Vault server URL
    #[arg(long, global = true)]
    server: Option<String>,

    /// Bearer token
    #[arg(long, global = true, env = "DEVVAULT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Project to mount
    #[arg(short, long, global = true)]
    project: Option<String>,

    /// How to settle write conflicts
    #[arg(long, global = true, value_enum)]
    on_conflict: Option<ConflictMode>,

    /// Refuse all modifications
    #[arg(long, global = true)]
    read_only: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Show metadata
    Stat { path: String },
    /// Print file content
    Cat { path: String },
    /// Write stdin (or --file) to a vault file
    Put {
        path: String,
        #[arg(long)]
        file: Option<PathBuf>,
        /// Report the write as a creation
        #[arg(long)]
        create: bool,
    },
    /// Delete a file or directory
    Rm {
        path: String,
        #[arg(short, long)]
        recursive: bool,
    },
    /// Move a file or directory
    Mv {
        from: String,
        to: String,
        #[arg(long)]
        overwrite: bool,
    },
    /// Create a directory
    Mkdir { path: String },
    /// Print change events until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let mut config = CliConfig::load(args.config.as_deref()).context("loading config")?;
    if let Some(server) = args.server {
        config.server_url = server;
    }
    if args.token.is_some() {
        config.token = args.token;
    }
    if let Some(mode) = args.on_conflict {
        config.on_conflict = mode;
    }
    config.vault.read_only |= args.read_only;

    let Some(project) = args.project.or_else(|| config.project.clone()) else {
        bail!("no project: pass --project or set `project` in the config file");
    };

    let session: Arc<dyn SessionProvider> = Arc::new(StaticToken::from(config.token.clone()));
    let client = HttpVaultClient::new(&config.server_url, session.clone())?;
    let notifications = SseNotificationSource::new(&config.server_url)?;
    let status = notifications.subscribe_status();
    let host: Arc<dyn EditorHost> = match config.on_conflict {
        ConflictMode::Ask => Arc::new(TerminalHost),
        ConflictMode::Overwrite => Arc::new(HeadlessHost::new(ConflictChoice::Overwrite)),
        ConflictMode::Discard => Arc::new(HeadlessHost::new(ConflictChoice::Discard)),
    };

    let fs = VaultFileSystem::new(VaultContext {
        client: Arc::new(client),
        notifications: Arc::new(notifications),
        host,
        session,
        config: config.vault.clone(),
    });

    let root = fs.mount_project(&project, &project).await?;
    debug!(root = %root, "mounted");

    let result = run(&fs, &root, args.command, status).await;
    fs.dispose();
    result
}

async fn run(
    fs: &VaultFileSystem,
    root: &VaultUri,
    command: Command,
    status: tokio::sync::broadcast::Receiver<ConnectionStatus>,
) -> Result<()> {
    match command {
        Command::Ls { path } => {
            let uri = resolve(fs, root, &path)?;
            for entry in fs.read_directory(&uri).await? {
                let marker = if entry.kind.is_dir() { "d" } else { "-" };
                println!("{marker} {}", entry.name);
            }
        }
        Command::Stat { path } => {
            let uri = resolve(fs, root, &path)?;
            let stat = fs.stat(&uri).await?;
            let kind = match stat.kind {
                FileType::File => "file",
                FileType::Directory => "directory",
            };
            println!("{uri}");
            println!("  type:     {kind}");
            println!("  size:     {}", stat.size);
            println!("  created:  {}", stat.created_at_ms);
            println!("  modified: {}", stat.modified_at_ms);
        }
        Command::Cat { path } => {
            let uri = resolve(fs, root, &path)?;
            let bytes = fs.read_file(&uri).await?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
        Command::Put { path, file, create } => {
            let uri = resolve(fs, root, &path)?;
            let content = match file {
                Some(file) => std::fs::read(&file)
                    .with_context(|| format!("reading {}", file.display()))?,
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };
            let options = WriteOptions {
                create,
                overwrite: true,
            };
            fs.write_file(&uri, &content, options).await?;
            info!(path = %uri.path(), bytes = content.len(), "written");
        }
        Command::Rm { path, recursive } => {
            let uri = resolve(fs, root, &path)?;
            fs.delete(&uri, DeleteOptions { recursive }).await?;
        }
        Command::Mv {
            from,
            to,
            overwrite,
        } => {
            let from = resolve(fs, root, &from)?;
            let to = resolve(fs, root, &to)?;
            fs.rename(&from, &to, RenameOptions { overwrite }).await?;
        }
        Command::Mkdir { path } => {
            let uri = resolve(fs, root, &path)?;
            fs.create_directory(&uri).await?;
        }
        Command::Watch => watch(fs, status).await?,
    }
    Ok(())
}

/// Accept a bare vault path or a full vault URI for the mounted project.
fn resolve(fs: &VaultFileSystem, root: &VaultUri, arg: &str) -> Result<VaultUri> {
    if arg.contains("://") {
        return Ok(fs.parse_uri(arg)?);
    }
    Ok(root.with_path(VaultPath::new(arg)))
}

async fn watch(
    fs: &VaultFileSystem,
    mut status: tokio::sync::broadcast::Receiver<ConnectionStatus>,
) -> Result<()> {
    if !fs.is_live() {
        bail!("watch needs a session: set a token");
    }
    let mut events = fs.subscribe();
    info!("watching for changes, ctrl-c to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            batch = events.recv() => match batch {
                Ok(batch) => {
                    for event in batch {
                        let verb = match event.kind {
                            ChangeKind::Created => "created",
                            ChangeKind::Changed => "changed",
                            ChangeKind::Deleted => "deleted",
                        };
                        println!("{verb} {}", event.uri.path());
                    }
                }
                Err(RecvError::Lagged(n)) => warn!(missed = n, "change batches dropped"),
                Err(RecvError::Closed) => break,
            },
            change = status.recv() => match change {
                Ok(ConnectionStatus::Connected) => info!("connected"),
                Ok(ConnectionStatus::Reconnecting { attempt }) => info!(attempt, "reconnecting"),
                Ok(ConnectionStatus::Error(e)) => warn!(error = %e, "stream error"),
                Ok(ConnectionStatus::Disconnected) => info!("disconnected"),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}
