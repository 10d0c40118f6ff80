//! Reconnecting server-push notification stream.
//!
//! [`SseNotificationSource`] opens `GET .../vault/events` as a
//! `text/event-stream` and forwards each decoded [`VaultNotification`] into
//! the subscription channel. Dropped connections are retried with
//! exponential backoff until the subscription is cancelled.

use std::sync::Arc;

use async_trait::async_trait;
use devvault_vfs::{
    NotificationSource, RemoteError, Subscription, VaultNotification, VaultResult,
    decode_notification, notify::SUBSCRIPTION_BUFFER,
};
use futures::StreamExt;
use reqwest::Client;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::constants::{CONNECT_TIMEOUT, STATUS_CHANNEL_CAPACITY, backoff_delay};
use crate::error::ClientError;
use crate::http::{VaultEndpoint, status_error};
use crate::sse::SseDecoder;

/// Stream connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Reconnecting { attempt: u32 },
    Error(String),
}

/// [`NotificationSource`] over server-sent events.
#[derive(Clone)]
pub struct SseNotificationSource {
    http: Client,
    endpoint: VaultEndpoint,
    status_tx: broadcast::Sender<ConnectionStatus>,
}

impl SseNotificationSource {
    pub fn new(server_url: &str) -> Result<Self, ClientError> {
        // No overall timeout: the stream is meant to stay open.
        let http = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Ok(Self {
            http,
            endpoint: VaultEndpoint::parse(server_url)?,
            status_tx,
        })
    }

    /// Connection status changes for every stream opened by this source.
    pub fn subscribe_status(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }
}

#[async_trait]
impl NotificationSource for SseNotificationSource {
    async fn subscribe(&self, project_id: &str, token: &str) -> VaultResult<Subscription> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let cancel = CancellationToken::new();
        let stream = EventStream {
            http: self.http.clone(),
            url: self.endpoint.url(project_id, "events"),
            token: Arc::from(token),
            project_id: project_id.to_string(),
            status_tx: self.status_tx.clone(),
        };
        tokio::spawn(stream.run(tx, cancel.clone()));
        Ok(Subscription::new(rx, cancel))
    }
}

/// How one connection ended.
enum StreamEnd {
    /// The subscriber went away; stop for good.
    Closed,
    /// The server ended the stream or the connection dropped.
    Dropped { was_connected: bool },
}

struct EventStream {
    http: Client,
    url: reqwest::Url,
    token: Arc<str>,
    project_id: String,
    status_tx: broadcast::Sender<ConnectionStatus>,
}

impl EventStream {
    async fn run(self, tx: mpsc::Sender<VaultNotification>, cancel: CancellationToken) {
        let mut attempt: u32 = 0;
        loop {
            let end = tokio::select! {
                _ = cancel.cancelled() => break,
                end = self.connect_once(&tx) => end,
            };

            match end {
                StreamEnd::Closed => break,
                StreamEnd::Dropped { was_connected } => {
                    if was_connected {
                        attempt = 0;
                    }
                }
            }

            attempt = attempt.saturating_add(1);
            let delay = backoff_delay(attempt);
            info!(project = %self.project_id, attempt, ?delay, "event stream reconnecting");
            self.status(ConnectionStatus::Reconnecting { attempt });

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        debug!(project = %self.project_id, "event stream stopped");
        self.status(ConnectionStatus::Disconnected);
    }

    /// One connection: open, then forward events until it ends.
    async fn connect_once(&self, tx: &mpsc::Sender<VaultNotification>) -> StreamEnd {
        let response = self
            .http
            .get(self.url.clone())
            .bearer_auth(&*self.token)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                let status = r.status();
                let err = status_error(status, self.url.path(), String::new());
                self.failed(&err);
                return StreamEnd::Dropped {
                    was_connected: false,
                };
            }
            Err(e) => {
                self.failed(&RemoteError::transport(e.to_string()));
                return StreamEnd::Dropped {
                    was_connected: false,
                };
            }
        };

        info!(project = %self.project_id, "event stream connected");
        self.status(ConnectionStatus::Connected);

        let mut bytes = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(project = %self.project_id, error = %e, "event stream interrupted");
                    break;
                }
            };
            for event in decoder.push(&chunk) {
                let Some(notification) = decode_notification(&event.data) else {
                    continue;
                };
                if tx.send(notification).await.is_err() {
                    return StreamEnd::Closed;
                }
            }
        }

        StreamEnd::Dropped {
            was_connected: true,
        }
    }

    fn failed(&self, err: &RemoteError) {
        warn!(project = %self.project_id, error = %err, "event stream connect failed");
        self.status(ConnectionStatus::Error(err.to_string()));
    }

    fn status(&self, status: ConnectionStatus) {
        // No receivers is fine.
        let _ = self.status_tx.send(status);
    }
}
