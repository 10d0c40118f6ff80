//! The virtual filesystem façade.
//!
//! [`VaultFileSystem`] is what an editor host mounts. It resolves URIs,
//! serves from [`VaultCache`] where it can, falls through to the
//! [`VaultClient`] otherwise, and reports changes as debounced
//! [`FileChangeEvent`] batches.
//!
//! One project at a time can be mounted. While mounted, a pump task applies
//! server notifications to the cache; each mount gets a new generation
//! number and notifications from any other generation are ignored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use strum::Display;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::SessionProvider;
use crate::cache::{CacheCounts, VaultCache};
use crate::config::VaultConfig;
use crate::conflict::ConflictResolver;
use crate::debounce::EventDebouncer;
use crate::error::{RemoteError, VaultError, VaultResult};
use crate::host::{EditorHost, MountStatus, WorkspaceFolder};
use crate::notify::{NotificationAction, NotificationSource, Subscription, VaultNotification};
use crate::remote::VaultClient;
use crate::types::{
    ChangeKind, DeleteOptions, DirEntry, FileChangeEvent, FileStat, FileType, Precondition,
    RenameOptions, WriteOptions,
};
use crate::uri::{VaultPath, VaultUri};

/// Collaborators handed to the façade at construction.
#[derive(Clone)]
pub struct VaultContext {
    pub client: Arc<dyn VaultClient>,
    pub notifications: Arc<dyn NotificationSource>,
    pub host: Arc<dyn EditorHost>,
    pub session: Arc<dyn SessionProvider>,
    pub config: VaultConfig,
}

/// Mount lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum MountState {
    Unmounted,
    Mounting,
    Mounted,
    Unmounting,
}

/// Host-side subscription for `watch`.
///
/// Changes are delivered vault-wide through
/// [`VaultFileSystem::subscribe`], so this handle carries nothing.
#[derive(Debug)]
pub struct WatchHandle {
    uri: VaultUri,
}

impl WatchHandle {
    pub fn uri(&self) -> &VaultUri {
        &self.uri
    }

    /// Stop watching. Nothing to release.
    pub fn dispose(self) {}
}

struct Mount {
    project_id: String,
    root: VaultUri,
    generation: u64,
    /// Whether a notification stream is attached.
    live: bool,
    cancel: CancellationToken,
    pump: Option<JoinHandle<()>>,
}

struct MountSlot {
    state: MountState,
    mount: Option<Mount>,
}

struct Inner {
    client: Arc<dyn VaultClient>,
    notifications: Arc<dyn NotificationSource>,
    host: Arc<dyn EditorHost>,
    session: Arc<dyn SessionProvider>,
    config: VaultConfig,
    cache: VaultCache,
    events: EventDebouncer<FileChangeEvent>,
    slot: Mutex<MountSlot>,
    generations: AtomicU64,
    /// Cancelled by `dispose`; a mount still in flight then tears itself down.
    shutdown: CancellationToken,
}

/// Caching, conflict-aware filesystem over one mounted vault project.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct VaultFileSystem {
    inner: Arc<Inner>,
}

impl VaultFileSystem {
    pub fn new(ctx: VaultContext) -> Self {
        let cache = VaultCache::new(ctx.config.cache_ttl());
        let events = EventDebouncer::new(ctx.config.debounce(), ctx.config.event_capacity);
        Self {
            inner: Arc::new(Inner {
                client: ctx.client,
                notifications: ctx.notifications,
                host: ctx.host,
                session: ctx.session,
                config: ctx.config,
                cache,
                events,
                slot: Mutex::new(MountSlot {
                    state: MountState::Unmounted,
                    mount: None,
                }),
                generations: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.inner.config
    }

    /// Parse a host URI using the configured scheme.
    pub fn parse_uri(&self, uri: &str) -> VaultResult<VaultUri> {
        VaultUri::parse(uri, Some(&self.inner.config.scheme))
    }

    /// Receive debounced change batches.
    ///
    /// Batches go out on a broadcast channel holding
    /// [`VaultConfig::event_capacity`] batches. A receiver that falls further
    /// behind gets `RecvError::Lagged` and misses the oldest batches; hosts
    /// that see it should re-read what they display.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<FileChangeEvent>> {
        self.inner.events.subscribe()
    }

    pub fn mount_state(&self) -> MountState {
        self.inner.slot.lock().state
    }

    /// Root URI of the mounted project, if any.
    pub fn mounted_root(&self) -> Option<VaultUri> {
        let slot = self.inner.slot.lock();
        match slot.state {
            MountState::Mounted => slot.mount.as_ref().map(|m| m.root.clone()),
            _ => None,
        }
    }

    /// True when the mount has a notification stream attached.
    pub fn is_live(&self) -> bool {
        self.inner
            .slot
            .lock()
            .mount
            .as_ref()
            .is_some_and(|m| m.live)
    }

    /// Generation of the current mount, if mounted.
    pub fn generation(&self) -> Option<u64> {
        self.inner.slot.lock().mount.as_ref().map(|m| m.generation)
    }

    pub fn cache_counts(&self) -> CacheCounts {
        self.inner.cache.counts()
    }

    // ========================================================================
    // Mount lifecycle
    // ========================================================================

    /// Bind `project_id` and start live updates.
    ///
    /// Without a session, or if the stream cannot be opened, the mount comes
    /// up offline: operations work but no notifications arrive.
    pub async fn mount_project(&self, project_id: &str, name: &str) -> VaultResult<VaultUri> {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return Err(VaultError::unavailable("file system disposed"));
        }
        {
            let mut slot = inner.slot.lock();
            if slot.state != MountState::Unmounted {
                let current = slot
                    .mount
                    .as_ref()
                    .map_or_else(|| project_id.to_string(), |m| m.project_id.clone());
                return Err(VaultError::AlreadyMounted(current));
            }
            slot.state = MountState::Mounting;
        }

        let generation = inner.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let root = VaultUri::root(inner.config.scheme.clone(), project_id);
        info!(project = project_id, generation, "mounting vault");

        if inner.host.capabilities().workspace_folders {
            let folder = WorkspaceFolder {
                uri: root.clone(),
                name: name.to_string(),
            };
            if !inner.host.add_workspace_folder(&folder) {
                warn!(project = project_id, "host did not add workspace folder");
            }
        }

        let mut subscription = match inner.session.access_token().await {
            Some(token) => match inner.notifications.subscribe(project_id, &token).await {
                Ok(subscription) => Some(subscription),
                Err(e) => {
                    warn!(project = project_id, error = %e, "notification stream unavailable");
                    inner
                        .host
                        .report_error(&format!("live updates unavailable: {e}"));
                    None
                }
            },
            None => {
                info!(project = project_id, "no session, mounting without live updates");
                None
            }
        };

        let live = subscription.is_some();
        let disposed = {
            let mut slot = inner.slot.lock();
            if inner.shutdown.is_cancelled() {
                slot.state = MountState::Unmounted;
                true
            } else {
                let (cancel, pump) = match subscription.take() {
                    Some(subscription) => {
                        // Cancelling the mount closes the stream itself, not just the pump.
                        let cancel = subscription.cancellation_token();
                        let pump = tokio::spawn(pump_notifications(
                            Arc::downgrade(inner),
                            subscription,
                            generation,
                            cancel.clone(),
                        ));
                        (cancel, Some(pump))
                    }
                    None => (CancellationToken::new(), None),
                };
                slot.mount = Some(Mount {
                    project_id: project_id.to_string(),
                    root: root.clone(),
                    generation,
                    live,
                    cancel,
                    pump,
                });
                slot.state = MountState::Mounted;
                false
            }
        };

        if disposed {
            info!(project = project_id, generation, "disposed while mounting");
            if let Some(mut subscription) = subscription {
                subscription.cancel();
            }
            if inner.host.capabilities().workspace_folders {
                inner.host.remove_workspace_folder(&root);
            }
            return Err(VaultError::unavailable("file system disposed"));
        }

        inner.host.report_status(if live {
            MountStatus::Live {
                project_id: project_id.to_string(),
            }
        } else {
            MountStatus::Offline {
                project_id: project_id.to_string(),
            }
        });
        Ok(root)
    }

    /// Unbind the current project, closing its stream and clearing every
    /// cache. Does nothing when already unmounted.
    pub fn unmount_project(&self) -> VaultResult<()> {
        let inner = &self.inner;
        let mount = {
            let mut slot = inner.slot.lock();
            match slot.state {
                MountState::Unmounted => return Ok(()),
                MountState::Mounted => {}
                MountState::Mounting | MountState::Unmounting => {
                    let project = slot
                        .mount
                        .as_ref()
                        .map(|m| m.project_id.clone())
                        .unwrap_or_default();
                    return Err(VaultError::NotMounted(project));
                }
            }
            slot.state = MountState::Unmounting;
            slot.mount.take()
        };

        if let Some(mount) = mount {
            info!(project = %mount.project_id, generation = mount.generation, "unmounting vault");
            mount.cancel.cancel();
            if let Some(pump) = mount.pump {
                pump.abort();
            }
            if inner.host.capabilities().workspace_folders {
                inner.host.remove_workspace_folder(&mount.root);
            }
        }

        inner.cache.clear();
        inner.slot.lock().state = MountState::Unmounted;
        inner.host.report_status(MountStatus::Unmounted);
        Ok(())
    }

    /// Unmount if mounted and cancel pending change delivery.
    ///
    /// A mount still in progress fails instead of completing, and no later
    /// mount is accepted.
    pub fn dispose(&self) {
        self.inner.shutdown.cancel();
        if self.mount_state() == MountState::Mounted {
            if let Err(e) = self.unmount_project() {
                warn!(error = %e, "unmount during dispose failed");
            }
        }
        self.inner.events.dispose();
    }

    // ========================================================================
    // Reads
    // ========================================================================

    #[tracing::instrument(skip_all, name = "vault.stat", fields(project = uri.project_id(), path = %uri.path()))]
    pub async fn stat(&self, uri: &VaultUri) -> VaultResult<FileStat> {
        let path = self.resolve(uri)?;
        if path.is_root() {
            return Ok(root_stat());
        }
        if let Some(stat) = self.inner.cache.stat(&path) {
            return Ok(stat);
        }

        let ticket = self.inner.cache.ticket(&path);
        let remote = self
            .inner
            .client
            .stat(uri.project_id(), path.as_str())
            .await
            .map_err(|e| VaultError::from_remote(path.as_str(), e))?;
        let stat = FileStat::from(&remote);
        if !self.inner.cache.fill_stat(path, stat.clone(), &ticket) {
            debug!("invalidated during fetch, stat not cached");
        }
        Ok(stat)
    }

    #[tracing::instrument(skip_all, name = "vault.read_directory", fields(project = uri.project_id(), path = %uri.path()))]
    pub async fn read_directory(&self, uri: &VaultUri) -> VaultResult<Vec<DirEntry>> {
        let path = self.resolve(uri)?;
        if let Some(entries) = self.inner.cache.directory(&path) {
            return Ok(entries);
        }

        let ticket = self.inner.cache.ticket(&path);
        let remote = self
            .inner
            .client
            .list(uri.project_id(), path.as_str())
            .await
            .map_err(|e| VaultError::from_remote(path.as_str(), e))?;
        let entries: Vec<DirEntry> = remote.iter().map(DirEntry::from).collect();
        if !self.inner.cache.fill_directory(path, entries.clone(), &ticket) {
            debug!("invalidated during fetch, listing not cached");
        }
        Ok(entries)
    }

    /// File content. Served from cache only while a fresh stat agrees the
    /// file has not changed.
    ///
    /// Bytes are cached under the stat that was fresh when the read started,
    /// and only if that stat is still current when the read returns.
    #[tracing::instrument(skip_all, name = "vault.read_file", fields(project = uri.project_id(), path = %uri.path()))]
    pub async fn read_file(&self, uri: &VaultUri) -> VaultResult<Vec<u8>> {
        let path = self.resolve(uri)?;
        if let Some(bytes) = self.inner.cache.content(&path) {
            return Ok(bytes);
        }

        let ticket = self.inner.cache.ticket(&path);
        let result = self
            .inner
            .client
            .read(uri.project_id(), path.as_str())
            .await
            .map_err(|e| VaultError::from_remote(path.as_str(), e))?;
        let cache = &self.inner.cache;
        if !cache.fill_token(path.clone(), result.etag, &ticket) {
            debug!("invalidated during read, version token not stored");
        }
        if !cache.fill_content(path, result.content.clone(), &ticket) {
            debug!("no matching fresh stat, content not cached");
        }
        Ok(result.content)
    }

    /// Inert: changes arrive through [`subscribe`](Self::subscribe).
    pub fn watch(&self, uri: &VaultUri) -> VaultResult<WatchHandle> {
        self.resolve(uri)?;
        Ok(WatchHandle { uri: uri.clone() })
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Write against the last known version. A stale version goes to the
    /// conflict resolver.
    #[tracing::instrument(skip_all, name = "vault.write_file", fields(project = uri.project_id(), path = %uri.path()))]
    pub async fn write_file(
        &self,
        uri: &VaultUri,
        content: &[u8],
        options: WriteOptions,
    ) -> VaultResult<()> {
        let path = self.resolve_writable(uri)?;
        let inner = &self.inner;
        let precondition = Precondition::from_token(inner.cache.token(&path));

        match inner
            .client
            .write(uri.project_id(), path.as_str(), content, &precondition)
            .await
        {
            Ok(result) => {
                inner.cache.set_token(path.clone(), result.etag);
                inner.cache.invalidate(&path);
                let kind = if options.create {
                    ChangeKind::Created
                } else {
                    ChangeKind::Changed
                };
                inner.events.schedule(FileChangeEvent::new(kind, uri.clone()));
                Ok(())
            }
            Err(RemoteError::Conflict(_)) => {
                ConflictResolver::new(
                    inner.client.as_ref(),
                    &inner.cache,
                    inner.host.as_ref(),
                    &inner.events,
                    inner.config.force_write_attempts,
                )
                .resolve(uri, content)
                .await
            }
            Err(e) => {
                warn!(error = %e, "write failed");
                Err(VaultError::from_remote(path.as_str(), e))
            }
        }
    }

    #[tracing::instrument(skip_all, name = "vault.delete", fields(project = uri.project_id(), path = %uri.path()))]
    pub async fn delete(&self, uri: &VaultUri, options: DeleteOptions) -> VaultResult<()> {
        let path = self.resolve_writable(uri)?;
        self.inner
            .client
            .delete(uri.project_id(), path.as_str(), options.recursive)
            .await
            .map_err(|e| VaultError::from_remote(path.as_str(), e))?;

        self.inner.cache.forget(&path);
        self.inner
            .events
            .schedule(FileChangeEvent::new(ChangeKind::Deleted, uri.clone()));
        Ok(())
    }

    /// Move within the mounted project. The version token follows the file.
    #[tracing::instrument(skip_all, name = "vault.rename", fields(project = old.project_id(), from = %old.path(), to = %new.path()))]
    pub async fn rename(
        &self,
        old: &VaultUri,
        new: &VaultUri,
        options: RenameOptions,
    ) -> VaultResult<()> {
        let from = self.resolve_writable(old)?;
        let to = self.resolve_writable(new)?;
        let inner = &self.inner;

        let result = inner
            .client
            .rename(old.project_id(), from.as_str(), to.as_str(), options.overwrite)
            .await
            .map_err(|e| match e {
                RemoteError::NotFound(_) => VaultError::not_found(from.as_str()),
                RemoteError::Conflict(_) => VaultError::conflict(to.as_str()),
                other => VaultError::unavailable(format!("{from} -> {to}: {other}")),
            })?;

        let moved = inner.cache.take_token(&from);
        // Whatever `to` held before is gone.
        inner.cache.take_token(&to);
        if let Some(token) = result.etag.or(moved) {
            inner.cache.set_token(to.clone(), token);
        }
        inner.cache.invalidate(&from);
        inner.cache.invalidate(&to);
        inner.events.schedule_all([
            FileChangeEvent::new(ChangeKind::Deleted, old.clone()),
            FileChangeEvent::new(ChangeKind::Created, new.clone()),
        ]);
        Ok(())
    }

    #[tracing::instrument(skip_all, name = "vault.create_directory", fields(project = uri.project_id(), path = %uri.path()))]
    pub async fn create_directory(&self, uri: &VaultUri) -> VaultResult<()> {
        let path = self.resolve_writable(uri)?;
        self.inner
            .client
            .mkdir(uri.project_id(), path.as_str())
            .await
            .map_err(|e| VaultError::unavailable(format!("{path}: {e}")))?;

        self.inner.cache.invalidate(&path);
        self.inner
            .events
            .schedule(FileChangeEvent::new(ChangeKind::Created, uri.clone()));
        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Vault path of `uri`, provided it belongs to the active mount.
    fn resolve(&self, uri: &VaultUri) -> VaultResult<VaultPath> {
        if uri.scheme() != self.inner.config.scheme {
            return Err(VaultError::invalid_uri(uri.to_string()));
        }
        let slot = self.inner.slot.lock();
        match (&slot.state, &slot.mount) {
            (MountState::Mounted, Some(mount)) if mount.project_id == uri.project_id() => {
                Ok(uri.path().clone())
            }
            _ => Err(VaultError::NotMounted(uri.project_id().to_string())),
        }
    }

    fn resolve_writable(&self, uri: &VaultUri) -> VaultResult<VaultPath> {
        let path = self.resolve(uri)?;
        if self.inner.config.read_only {
            return Err(VaultError::permission_denied(path.as_str()));
        }
        Ok(path)
    }
}

impl Inner {
    /// Apply one server notification if it belongs to the live mount.
    fn apply_notification(&self, generation: u64, notification: VaultNotification) {
        let root = {
            let slot = self.slot.lock();
            match (&slot.state, &slot.mount) {
                (MountState::Mounted, Some(mount)) if mount.generation == generation => {
                    mount.root.clone()
                }
                _ => {
                    debug!(generation, "ignoring notification from a closed mount");
                    return;
                }
            }
        };

        let path = VaultPath::new(&notification.path);
        debug!(
            project = root.project_id(),
            path = %path,
            action = %notification.action,
            agent = notification.agent_id.as_deref().unwrap_or("-"),
            "vault notification"
        );

        let kind = match notification.action {
            NotificationAction::Created => {
                self.cache.invalidate(&path);
                ChangeKind::Created
            }
            NotificationAction::Updated => {
                self.cache.invalidate(&path);
                ChangeKind::Changed
            }
            NotificationAction::Deleted => {
                self.cache.forget(&path);
                ChangeKind::Deleted
            }
        };
        self.events
            .schedule(FileChangeEvent::new(kind, root.with_path(path)));
    }
}

/// Forward notifications into the façade until cancelled or the stream ends.
async fn pump_notifications(
    inner: Weak<Inner>,
    mut subscription: Subscription,
    generation: u64,
    cancel: CancellationToken,
) {
    loop {
        let notification = tokio::select! {
            _ = cancel.cancelled() => break,
            next = subscription.recv() => match next {
                Some(notification) => notification,
                None => {
                    debug!(generation, "notification stream ended");
                    break;
                }
            },
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.apply_notification(generation, notification);
    }
    subscription.cancel();
}

fn root_stat() -> FileStat {
    FileStat {
        kind: FileType::Directory,
        size: 0,
        created_at_ms: 0,
        modified_at_ms: 0,
    }
}
