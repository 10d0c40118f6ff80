//! Change notifications pushed by the vault server.
//!
//! A [`NotificationSource`] opens one [`Subscription`] per mount. The
//! subscription is a plain channel of decoded [`VaultNotification`]s plus a
//! cancellation token; dropping it closes the underlying stream.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::VaultResult;

/// Buffered notifications per subscription before the producer waits.
pub const SUBSCRIPTION_BUFFER: usize = 256;

/// What happened to the file at `path`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NotificationAction {
    Created,
    Updated,
    Deleted,
}

/// One server-push event: `{"path", "action", "agent_id"?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultNotification {
    /// Vault path of the affected file.
    pub path: String,
    pub action: NotificationAction,
    /// The agent that made the change, when known.
    #[serde(default, alias = "agentId", skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

/// Decode one JSON payload. Malformed input yields `None`.
pub fn decode_notification(payload: &str) -> Option<VaultNotification> {
    match serde_json::from_str(payload) {
        Ok(notification) => Some(notification),
        Err(e) => {
            debug!(error = %e, "dropping malformed vault notification");
            None
        }
    }
}

/// A live notification stream for one project.
///
/// Cancels its producer when dropped.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<VaultNotification>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Wrap a receiver and the token that stops its producer.
    pub fn new(rx: mpsc::Receiver<VaultNotification>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    /// Next notification, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<VaultNotification> {
        self.rx.recv().await
    }

    /// Stop the producer. Already-buffered notifications are discarded.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.rx.close();
    }

    /// Token observed by the producer.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Opens change streams for a project.
#[async_trait]
pub trait NotificationSource: Send + Sync {
    /// Subscribe to changes in `project_id`, authenticating with `token`.
    async fn subscribe(&self, project_id: &str, token: &str) -> VaultResult<Subscription>;
}

struct Subscriber {
    tx: mpsc::Sender<VaultNotification>,
    cancel: CancellationToken,
}

/// In-process [`NotificationSource`]. Tests publish into it directly.
#[derive(Clone, Default)]
pub struct MemoryNotifier {
    subscribers: Arc<Mutex<HashMap<String, Vec<Subscriber>>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver to every live subscriber of `project_id`.
    ///
    /// Returns how many subscribers accepted the notification.
    pub fn publish(&self, project_id: &str, notification: VaultNotification) -> usize {
        let mut subscribers = self.subscribers.lock();
        let Some(list) = subscribers.get_mut(project_id) else {
            return 0;
        };
        list.retain(|s| !s.cancel.is_cancelled() && !s.tx.is_closed());
        list.iter()
            .filter(|s| s.tx.try_send(notification.clone()).is_ok())
            .count()
    }

    /// Subscribers not yet cancelled, across all projects.
    pub fn active_subscriptions(&self) -> usize {
        self.subscribers
            .lock()
            .values()
            .flatten()
            .filter(|s| !s.cancel.is_cancelled() && !s.tx.is_closed())
            .count()
    }
}

#[async_trait]
impl NotificationSource for MemoryNotifier {
    async fn subscribe(&self, project_id: &str, _token: &str) -> VaultResult<Subscription> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let cancel = CancellationToken::new();
        self.subscribers
            .lock()
            .entry(project_id.to_string())
            .or_default()
            .push(Subscriber {
                tx,
                cancel: cancel.clone(),
            });
        Ok(Subscription::new(rx, cancel))
    }
}
