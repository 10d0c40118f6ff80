//! Client construction errors.
//!
//! Per-request failures are reported as
//! [`RemoteError`](devvault_vfs::RemoteError) so they can be mapped by the
//! façade.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build http client: {0}")]
    Build(#[from] reqwest::Error),
}
