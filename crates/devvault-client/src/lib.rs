//! HTTP adapters for the Dev-Vault API.
//!
//! - [`HttpVaultClient`] implements [`devvault_vfs::VaultClient`] over the
//!   vault REST routes
//! - [`SseNotificationSource`] implements
//!   [`devvault_vfs::NotificationSource`] over a reconnecting
//!   server-sent-event stream

pub mod constants;
mod error;
mod events;
mod http;
pub mod sse;

pub use error::ClientError;
pub use events::{ConnectionStatus, SseNotificationSource};
pub use http::{HttpVaultClient, VaultEndpoint, status_error};
