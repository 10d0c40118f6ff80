//! Write conflict resolution.
//!
//! A write whose version precondition fails lands here. The host is asked
//! once for a [`ConflictChoice`]; no merge is ever attempted.
//!
//! Overwrite first sends the wildcard precondition. Backends that refuse
//! `If-Match: *` get a bounded read-modify-write loop instead: fetch the
//! latest version token and retry against it.

use tracing::{debug, info, warn};

use crate::cache::VaultCache;
use crate::debounce::EventDebouncer;
use crate::error::{RemoteError, VaultError, VaultResult};
use crate::host::{ConflictChoice, EditorHost};
use crate::remote::VaultClient;
use crate::types::{ChangeKind, FileChangeEvent, Precondition};
use crate::uri::VaultUri;

/// Settles one conflicting write against the shared façade state.
pub struct ConflictResolver<'a> {
    client: &'a dyn VaultClient,
    cache: &'a VaultCache,
    host: &'a dyn EditorHost,
    events: &'a EventDebouncer<FileChangeEvent>,
    max_attempts: u32,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(
        client: &'a dyn VaultClient,
        cache: &'a VaultCache,
        host: &'a dyn EditorHost,
        events: &'a EventDebouncer<FileChangeEvent>,
        max_attempts: u32,
    ) -> Self {
        Self {
            client,
            cache,
            host,
            events,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Ask the host and apply its answer to the rejected write of `content`.
    pub async fn resolve(&self, uri: &VaultUri, content: &[u8]) -> VaultResult<()> {
        let choice = self.host.resolve_conflict(uri).await;
        info!(project = uri.project_id(), path = %uri.path(), %choice, "write conflict");
        match choice {
            ConflictChoice::Overwrite => self.overwrite(uri, content).await,
            ConflictChoice::Discard => {
                self.discard(uri);
                Err(VaultError::conflict(uri.path().as_str()))
            }
        }
    }

    async fn overwrite(&self, uri: &VaultUri, content: &[u8]) -> VaultResult<()> {
        let project = uri.project_id();
        let path = uri.path();

        match self.client.write(project, path.as_str(), content, &Precondition::Any).await {
            Ok(result) => {
                self.committed(uri, result.etag);
                return Ok(());
            }
            Err(RemoteError::Conflict(_)) => {
                debug!(project, path = %path, "wildcard overwrite refused, retrying against latest version");
            }
            Err(e) => return Err(VaultError::from_remote(path.as_str(), e)),
        }

        for attempt in 1..=self.max_attempts {
            let latest = self
                .client
                .read(project, path.as_str())
                .await
                .map_err(|e| VaultError::from_remote(path.as_str(), e))?;

            let precondition = Precondition::IfMatch(latest.etag);
            match self.client.write(project, path.as_str(), content, &precondition).await {
                Ok(result) => {
                    self.committed(uri, result.etag);
                    return Ok(());
                }
                Err(RemoteError::Conflict(_)) => {
                    warn!(project, path = %path, attempt, "overwrite lost a race, retrying");
                }
                Err(e) => return Err(VaultError::from_remote(path.as_str(), e)),
            }
        }

        warn!(project, path = %path, attempts = self.max_attempts, "overwrite gave up");
        Err(VaultError::conflict(path.as_str()))
    }

    fn committed(&self, uri: &VaultUri, etag: String) {
        self.cache.set_token(uri.path().clone(), etag);
        self.cache.invalidate(uri.path());
        self.events
            .schedule(FileChangeEvent::new(ChangeKind::Changed, uri.clone()));
    }

    fn discard(&self, uri: &VaultUri) {
        self.cache.forget(uri.path());
        // The host re-reads and picks up the remote version.
        self.events
            .schedule(FileChangeEvent::new(ChangeKind::Changed, uri.clone()));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::host::{HostCapabilities, WorkspaceFolder};
    use crate::remote::MemoryVault;
    use crate::types::{FileStat, FileType};

    struct CountingHost {
        choice: ConflictChoice,
        asked: AtomicUsize,
    }

    impl CountingHost {
        fn new(choice: ConflictChoice) -> Self {
            Self {
                choice,
                asked: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EditorHost for CountingHost {
        fn capabilities(&self) -> HostCapabilities {
            HostCapabilities::default()
        }
        fn add_workspace_folder(&self, _folder: &WorkspaceFolder) -> bool {
            true
        }
        fn remove_workspace_folder(&self, _uri: &VaultUri) -> bool {
            true
        }
        async fn resolve_conflict(&self, _uri: &VaultUri) -> ConflictChoice {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.choice
        }
    }

    struct Fixture {
        vault: MemoryVault,
        cache: VaultCache,
        events: EventDebouncer<FileChangeEvent>,
        uri: VaultUri,
    }

    fn fixture() -> Fixture {
        Fixture {
            vault: MemoryVault::new(),
            cache: VaultCache::new(Duration::from_secs(30)),
            events: EventDebouncer::new(Duration::from_millis(5), 16),
            uri: VaultUri::new("devvault", "p1", "/a.txt".into()),
        }
    }

    fn stat() -> FileStat {
        FileStat {
            kind: FileType::File,
            size: 3,
            created_at_ms: 1,
            modified_at_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_discard_forgets_and_fails() {
        let f = fixture();
        let host = CountingHost::new(ConflictChoice::Discard);
        let mut rx = f.events.subscribe();
        f.vault.seed_file("p1", "/a.txt", b"theirs");
        f.cache.set_token(f.uri.path().clone(), "stale".into());
        f.cache.put_stat(f.uri.path().clone(), stat());
        let ticket = f.cache.ticket(f.uri.path());
        assert!(f.cache.fill_content(f.uri.path().clone(), b"old".to_vec(), &ticket));

        let resolver = ConflictResolver::new(&f.vault, &f.cache, &host, &f.events, 3);
        let err = resolver.resolve(&f.uri, b"mine").await.unwrap_err();

        assert_eq!(err, VaultError::conflict("/a.txt"));
        assert_eq!(host.asked.load(Ordering::SeqCst), 1);
        assert!(f.cache.counts().is_empty());
        assert_eq!(f.vault.file_content("p1", "/a.txt").unwrap(), b"theirs");

        f.events.flush();
        let batch = rx.try_recv().unwrap();
        assert_eq!(batch, vec![FileChangeEvent::new(ChangeKind::Changed, f.uri.clone())]);
    }

    #[tokio::test]
    async fn test_overwrite_uses_wildcard() {
        let f = fixture();
        let host = CountingHost::new(ConflictChoice::Overwrite);
        f.vault.seed_file("p1", "/a.txt", b"theirs");

        let resolver = ConflictResolver::new(&f.vault, &f.cache, &host, &f.events, 3);
        resolver.resolve(&f.uri, b"mine").await.unwrap();

        assert_eq!(f.vault.file_content("p1", "/a.txt").unwrap(), b"mine");
        assert_eq!(f.cache.token(f.uri.path()), f.vault.file_etag("p1", "/a.txt"));
        assert_eq!(f.vault.calls().write, 1);
        assert_eq!(f.vault.calls().read, 0);
    }

    #[tokio::test]
    async fn test_overwrite_falls_back_when_wildcard_refused() {
        let f = fixture();
        let host = CountingHost::new(ConflictChoice::Overwrite);
        f.vault.seed_file("p1", "/a.txt", b"theirs");
        f.vault.set_honor_wildcard(false);

        let resolver = ConflictResolver::new(&f.vault, &f.cache, &host, &f.events, 3);
        resolver.resolve(&f.uri, b"mine").await.unwrap();

        assert_eq!(f.vault.file_content("p1", "/a.txt").unwrap(), b"mine");
        assert_eq!(f.vault.calls().read, 1);
        assert_eq!(f.vault.calls().write, 2);
        assert_eq!(host.asked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_overwrite_of_vanished_file_is_not_found() {
        let f = fixture();
        let host = CountingHost::new(ConflictChoice::Overwrite);
        f.vault.set_honor_wildcard(false);

        let resolver = ConflictResolver::new(&f.vault, &f.cache, &host, &f.events, 3);
        let err = resolver.resolve(&f.uri, b"mine").await.unwrap_err();
        assert_eq!(err, VaultError::not_found("/a.txt"));
    }

    #[tokio::test]
    async fn test_overwrite_transport_failure_is_unavailable() {
        let f = fixture();
        let host = CountingHost::new(ConflictChoice::Overwrite);
        f.vault.set_offline(true);

        let resolver = ConflictResolver::new(&f.vault, &f.cache, &host, &f.events, 3);
        let err = resolver.resolve(&f.uri, b"mine").await.unwrap_err();
        assert!(matches!(err, VaultError::Unavailable(_)));
    }
}
