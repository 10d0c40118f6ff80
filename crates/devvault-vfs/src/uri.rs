//! Vault paths and mount URIs.
//!
//! Every façade operation starts by resolving a host URI of the form
//! `scheme://project-{projectId}/vault{vaultPath}` into a [`VaultUri`].
//! Paths are case-sensitive and always absolute within the project's vault.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

/// Authority prefix carrying the project identifier.
const PROJECT_PREFIX: &str = "project-";

/// Path segment that roots the vault inside the URI path.
const VAULT_SEGMENT: &str = "/vault";

/// An absolute, normalized path within a single project's vault.
///
/// Always starts with `/`, never ends with `/` (except the root itself) and
/// contains no empty segments.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaultPath(String);

impl VaultPath {
    /// The vault root, `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Normalize a raw path. Empty input resolves to the root.
    ///
    /// `.` segments are dropped. `..` is kept verbatim: the remote vault is
    /// the authority on what a path means.
    pub fn new(raw: &str) -> Self {
        let segments: Vec<&str> = raw
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();
        if segments.is_empty() {
            Self::root()
        } else {
            Self(format!("/{}", segments.join("/")))
        }
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for `/`.
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// The containing directory, or `None` for the root.
    pub fn parent(&self) -> Option<VaultPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => Some(Self::root()),
        }
    }

    /// Final path segment. Empty for the root.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// Append a child name.
    pub fn join(&self, name: &str) -> VaultPath {
        if self.is_root() {
            Self::new(name)
        } else {
            Self::new(&format!("{}/{}", self.0, name))
        }
    }

    /// True if `self` is `other` or lies beneath it.
    pub fn starts_with(&self, other: &VaultPath) -> bool {
        other.is_root()
            || self.0 == other.0
            || self
                .0
                .strip_prefix(other.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl fmt::Display for VaultPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VaultPath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// A resolved mount URI: `(scheme, projectId, vaultPath)`.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct VaultUri {
    scheme: String,
    project_id: String,
    path: VaultPath,
}

impl VaultUri {
    /// Build a URI from its parts.
    pub fn new(scheme: impl Into<String>, project_id: impl Into<String>, path: VaultPath) -> Self {
        Self {
            scheme: scheme.into(),
            project_id: project_id.into(),
            path,
        }
    }

    /// The vault root URI for a project.
    pub fn root(scheme: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self::new(scheme, project_id, VaultPath::root())
    }

    /// Parse `scheme://project-{id}/vault{path}`.
    ///
    /// When `expected_scheme` is given the URI scheme must match it exactly.
    pub fn parse(uri: &str, expected_scheme: Option<&str>) -> VaultResult<Self> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| VaultError::invalid_uri(uri))?;
        if scheme.is_empty() || expected_scheme.is_some_and(|s| s != scheme) {
            return Err(VaultError::invalid_uri(uri));
        }

        let (authority, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };
        let project_id = authority
            .strip_prefix(PROJECT_PREFIX)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| VaultError::invalid_uri(uri))?;

        let vault_path = match path.strip_prefix(VAULT_SEGMENT) {
            Some(p) if p.is_empty() || p.starts_with('/') => p,
            Some(_) => return Err(VaultError::invalid_uri(uri)),
            // `scheme://project-x` and `scheme://project-x/` address the root.
            None if path.is_empty() || path == "/" => "/",
            None => return Err(VaultError::invalid_uri(uri)),
        };

        Ok(Self::new(scheme, project_id, VaultPath::new(vault_path)))
    }

    /// URI scheme.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Project identifier from the authority.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Path within the vault.
    pub fn path(&self) -> &VaultPath {
        &self.path
    }

    /// Same project and scheme, different path.
    pub fn with_path(&self, path: VaultPath) -> Self {
        Self::new(self.scheme.clone(), self.project_id.clone(), path)
    }
}

impl fmt::Display for VaultUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}{}{}{}",
            self.scheme, PROJECT_PREFIX, self.project_id, VAULT_SEGMENT, self.path
        )
    }
}

impl std::str::FromStr for VaultUri {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_normalization() {
        assert_eq!(VaultPath::new("").as_str(), "/");
        assert_eq!(VaultPath::new("/").as_str(), "/");
        assert_eq!(VaultPath::new("a/b").as_str(), "/a/b");
        assert_eq!(VaultPath::new("//a///b/").as_str(), "/a/b");
        assert_eq!(VaultPath::new("/a/./b").as_str(), "/a/b");
        assert_eq!(VaultPath::new("/Src/Main.rs").as_str(), "/Src/Main.rs");
    }

    #[test]
    fn test_parent_and_name() {
        let p = VaultPath::new("/a/b.txt");
        assert_eq!(p.parent(), Some(VaultPath::new("/a")));
        assert_eq!(p.file_name(), "b.txt");
        assert_eq!(VaultPath::new("/a").parent(), Some(VaultPath::root()));
        assert_eq!(VaultPath::root().parent(), None);
        assert_eq!(VaultPath::root().file_name(), "");
    }

    #[test]
    fn test_join_and_prefix() {
        assert_eq!(VaultPath::root().join("x").as_str(), "/x");
        assert_eq!(VaultPath::new("/a").join("b").as_str(), "/a/b");
        assert!(VaultPath::new("/a/b").starts_with(&VaultPath::new("/a")));
        assert!(!VaultPath::new("/ab").starts_with(&VaultPath::new("/a")));
        assert!(VaultPath::new("/a").starts_with(&VaultPath::root()));
    }

    #[test]
    fn test_parse_full_uri() {
        let uri = VaultUri::parse("devvault://project-42/vault/src/lib.rs", Some("devvault")).unwrap();
        assert_eq!(uri.scheme(), "devvault");
        assert_eq!(uri.project_id(), "42");
        assert_eq!(uri.path().as_str(), "/src/lib.rs");
    }

    #[test]
    fn test_parse_defaults_to_root() {
        for raw in [
            "devvault://project-abc/vault",
            "devvault://project-abc/vault/",
            "devvault://project-abc",
            "devvault://project-abc/",
        ] {
            let uri = VaultUri::parse(raw, None).unwrap();
            assert!(uri.path().is_root(), "{raw} should resolve to root");
            assert_eq!(uri.project_id(), "abc");
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in [
            "devvault:/project-1/vault",
            "devvault://proj-1/vault/a",
            "devvault://project-/vault/a",
            "devvault://project-1/vaulted/a",
            "devvault://project-1/other/a",
        ] {
            assert!(
                matches!(VaultUri::parse(raw, None), Err(VaultError::InvalidUri(_))),
                "{raw} should be rejected"
            );
        }
        assert!(VaultUri::parse("file://project-1/vault", Some("devvault")).is_err());
    }

    #[test]
    fn test_display_matches_parse() {
        let uri = VaultUri::new("devvault", "p1", VaultPath::new("/docs/readme.md"));
        assert_eq!(uri.to_string(), "devvault://project-p1/vault/docs/readme.md");
        let root = VaultUri::root("devvault", "p1");
        assert_eq!(root.to_string(), "devvault://project-p1/vault/");
        let parsed: VaultUri = uri.to_string().parse().unwrap();
        assert_eq!(parsed, uri);
    }
}
