//! Session access.
//!
//! Token acquisition lives outside this crate. The façade only asks whether
//! an authenticated session exists and, if so, for its bearer token.

use async_trait::async_trait;

/// Source of the current bearer token.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// The access token, or `None` when the user is not signed in.
    async fn access_token(&self) -> Option<String>;
}

/// A fixed token (or none), e.g. from a config file.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    /// No session: mounts come up offline.
    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl From<Option<String>> for StaticToken {
    fn from(token: Option<String>) -> Self {
        Self(token.filter(|t| !t.is_empty()))
    }
}

#[async_trait]
impl SessionProvider for StaticToken {
    async fn access_token(&self) -> Option<String> {
        self.0.clone()
    }
}
