//! HTTP adapter for the vault API.
//!
//! All routes live under `{server}/api/projects/{project}/vault`. Version
//! tokens travel in the `ETag` response header and the `If-Match` request
//! header.

use std::sync::Arc;

use async_trait::async_trait;
use devvault_vfs::{
    Precondition, ReadResult, RemoteEntry, RemoteError, RemoteResult, RemoteStat, RenameResult,
    SessionProvider, VaultClient, WriteResult,
};
use reqwest::header::{ETAG, HeaderMap, IF_MATCH};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Serialize;
use tracing::{debug, warn};

use crate::constants::{CONNECT_TIMEOUT, REQUEST_TIMEOUT};
use crate::error::ClientError;

/// Vault route builder for one server.
#[derive(Debug, Clone)]
pub struct VaultEndpoint {
    base: Url,
}

impl VaultEndpoint {
    pub fn parse(server_url: &str) -> Result<Self, ClientError> {
        let base = Url::parse(server_url).map_err(|e| ClientError::InvalidUrl {
            url: server_url.to_string(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl {
                url: server_url.to_string(),
                reason: "not a base url".to_string(),
            });
        }
        Ok(Self { base })
    }

    /// `{server}/api/projects/{project}/vault/{route}`, with the project id
    /// percent-encoded as one segment.
    pub fn url(&self, project_id: &str, route: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["api", "projects", project_id, "vault", route]);
        }
        url
    }
}

#[derive(Serialize)]
struct RenameBody<'a> {
    from: &'a str,
    to: &'a str,
    overwrite: bool,
}

#[derive(Serialize)]
struct MkdirBody<'a> {
    path: &'a str,
}

/// [`VaultClient`] over HTTP with bearer authentication.
pub struct HttpVaultClient {
    http: Client,
    endpoint: VaultEndpoint,
    session: Arc<dyn SessionProvider>,
}

impl HttpVaultClient {
    pub fn new(server_url: &str, session: Arc<dyn SessionProvider>) -> Result<Self, ClientError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            endpoint: VaultEndpoint::parse(server_url)?,
            session,
        })
    }

    pub fn endpoint(&self) -> &VaultEndpoint {
        &self.endpoint
    }

    async fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.access_token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send and turn non-success statuses into [`RemoteError`]s.
    async fn send(&self, request: RequestBuilder, path: &str) -> RemoteResult<Response> {
        let response = self
            .authorized(request)
            .await
            .send()
            .await
            .map_err(|e| RemoteError::transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(%status, path, body = %body, "vault request failed");
        Err(status_error(status, path, body))
    }
}

/// Map a non-success status to the client error taxonomy.
pub fn status_error(status: StatusCode, path: &str, body: String) -> RemoteError {
    match status {
        StatusCode::NOT_FOUND => RemoteError::not_found(path),
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => RemoteError::conflict(path),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized,
        other => RemoteError::Status {
            status: other.as_u16(),
            message: if body.is_empty() {
                other.canonical_reason().unwrap_or("error").to_string()
            } else {
                body
            },
        },
    }
}

fn etag(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn required_etag(headers: &HeaderMap, path: &str) -> RemoteResult<String> {
    etag(headers).ok_or_else(|| RemoteError::Decode(format!("{path}: response has no ETag")))
}

fn decode_error(e: reqwest::Error) -> RemoteError {
    if e.is_decode() {
        RemoteError::Decode(e.to_string())
    } else {
        RemoteError::transport(e.to_string())
    }
}

#[async_trait]
impl VaultClient for HttpVaultClient {
    async fn stat(&self, project_id: &str, path: &str) -> RemoteResult<RemoteStat> {
        let url = self.endpoint.url(project_id, "stat");
        let response = self
            .send(self.http.get(url).query(&[("path", path)]), path)
            .await?;
        response.json().await.map_err(decode_error)
    }

    async fn list(&self, project_id: &str, path: &str) -> RemoteResult<Vec<RemoteEntry>> {
        let url = self.endpoint.url(project_id, "list");
        let response = self
            .send(self.http.get(url).query(&[("path", path)]), path)
            .await?;
        response.json().await.map_err(decode_error)
    }

    async fn read(&self, project_id: &str, path: &str) -> RemoteResult<ReadResult> {
        let url = self.endpoint.url(project_id, "file");
        let response = self
            .send(self.http.get(url).query(&[("path", path)]), path)
            .await?;
        let etag = required_etag(response.headers(), path)?;
        let content = response.bytes().await.map_err(decode_error)?.to_vec();
        Ok(ReadResult { content, etag })
    }

    async fn write(
        &self,
        project_id: &str,
        path: &str,
        content: &[u8],
        precondition: &Precondition,
    ) -> RemoteResult<WriteResult> {
        let url = self.endpoint.url(project_id, "file");
        let mut request = self
            .http
            .put(url)
            .query(&[("path", path)])
            .body(content.to_vec());
        if let Some(value) = precondition.header_value() {
            request = request.header(IF_MATCH, value);
        }
        let response = self.send(request, path).await?;
        let etag = required_etag(response.headers(), path)?;
        Ok(WriteResult { etag })
    }

    async fn delete(&self, project_id: &str, path: &str, recursive: bool) -> RemoteResult<()> {
        let url = self.endpoint.url(project_id, "file");
        let recursive = if recursive { "true" } else { "false" };
        self.send(
            self.http
                .delete(url)
                .query(&[("path", path), ("recursive", recursive)]),
            path,
        )
        .await?;
        Ok(())
    }

    async fn rename(
        &self,
        project_id: &str,
        from: &str,
        to: &str,
        overwrite: bool,
    ) -> RemoteResult<RenameResult> {
        let url = self.endpoint.url(project_id, "rename");
        let body = RenameBody {
            from,
            to,
            overwrite,
        };
        let response = match self.send(self.http.post(url).json(&body), from).await {
            // The destination is what conflicts.
            Err(RemoteError::Conflict(_)) => return Err(RemoteError::conflict(to)),
            other => other?,
        };
        let etag = etag(response.headers());
        if etag.is_none() {
            warn!(from, to, "rename response carried no ETag");
        }
        Ok(RenameResult { etag })
    }

    async fn mkdir(&self, project_id: &str, path: &str) -> RemoteResult<()> {
        let url = self.endpoint.url(project_id, "mkdir");
        self.send(self.http.post(url).json(&MkdirBody { path }), path)
            .await?;
        Ok(())
    }
}
