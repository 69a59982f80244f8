//! REST client for a hosted document-management API.
//!
//! Endpoints live under `{base_url}/api/v1/{tenant}/` and authenticate with
//! a bearer token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Serialize;
use tracing::{debug, info};

use labtrack_core::{AppError, AppResult, ErrorKind};
use labtrack_entity::{DocumentApiDriveDetails, StorageDrive};

use super::client::{ApiItem, DocumentApiClient, DocumentApiConnector};

/// Reqwest-backed client for one tenant.
#[derive(Clone)]
pub struct HttpDocumentApiClient {
    http: Client,
    base: Url,
    tenant: String,
    token: String,
}

impl std::fmt::Debug for HttpDocumentApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDocumentApiClient")
            .field("base", &self.base.as_str())
            .field("tenant", &self.tenant)
            .field("token", &"****")
            .finish()
    }
}

#[derive(Serialize)]
struct FolderRequest<'a> {
    parent_id: &'a str,
    name: &'a str,
}

impl HttpDocumentApiClient {
    /// Build a client from drive details.
    pub fn new(details: &DocumentApiDriveDetails, timeout: Duration) -> AppResult<Self> {
        let base = Url::parse(&details.base_url).map_err(|e| {
            AppError::configuration(format!("Invalid document API URL '{}': {e}", details.base_url))
        })?;
        let http = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::with_source(
                ErrorKind::Configuration,
                "Failed to build document API HTTP client",
                e,
            )
        })?;

        info!(base_url = %base, tenant = %details.tenant, "Initialized document API client");
        Ok(Self {
            http,
            base,
            tenant: details.tenant.clone(),
            token: details.api_token.clone(),
        })
    }

    fn url(&self, segments: &[&str]) -> AppResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::configuration("Document API URL cannot be a base"))?
            .pop_if_empty()
            .extend(["api", "v1", self.tenant.as_str()])
            .extend(segments);
        Ok(url)
    }

    fn transport_error(action: &str, e: reqwest::Error) -> AppError {
        AppError::with_source(
            ErrorKind::WriteFailure,
            format!("Document API request to {action} failed: {e}"),
            e,
        )
    }

    /// Map a non-success status to the matching error kind.
    async fn check(action: &str, response: Response) -> AppResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = format!("Document API refused to {action}: {status} {body}");
        let kind = match status {
            StatusCode::NOT_FOUND => ErrorKind::NotFound,
            StatusCode::CONFLICT => ErrorKind::Duplicate,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::InsufficientPrivileges,
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ErrorKind::Validation,
            _ => ErrorKind::WriteFailure,
        };
        Err(AppError::new(kind, message))
    }

    async fn item(action: &str, response: Response) -> AppResult<ApiItem> {
        Self::check(action, response)
            .await?
            .json()
            .await
            .map_err(|e| Self::transport_error(action, e))
    }
}

#[async_trait]
impl DocumentApiClient for HttpDocumentApiClient {
    async fn lookup(&self, path: &str) -> AppResult<Option<ApiItem>> {
        let mut url = self.url(&["items"])?;
        url.query_pairs_mut().append_pair("path", path);
        debug!(path = %path, "Resolving document API path");

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| Self::transport_error("resolve a path", e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::item("resolve a path", response).await.map(Some)
    }

    async fn list_children(&self, folder_id: &str) -> AppResult<Vec<ApiItem>> {
        let url = self.url(&["folders", folder_id, "children"])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| Self::transport_error("list a folder", e))?;
        Self::check("list a folder", response)
            .await?
            .json()
            .await
            .map_err(|e| Self::transport_error("list a folder", e))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> AppResult<ApiItem> {
        let url = self.url(&["folders"])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&FolderRequest { parent_id, name })
            .send()
            .await
            .map_err(|e| Self::transport_error("create a folder", e))?;
        Self::item("create a folder", response).await
    }

    async fn upload_file(&self, folder_id: &str, name: &str, data: Bytes) -> AppResult<ApiItem> {
        let mut url = self.url(&["folders", folder_id, "files"])?;
        url.query_pairs_mut().append_pair("name", name);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .body(data)
            .send()
            .await
            .map_err(|e| Self::transport_error("upload a file", e))?;
        Self::item("upload a file", response).await
    }

    async fn download_file(&self, file_id: &str) -> AppResult<Bytes> {
        let url = self.url(&["files", file_id, "content"])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| Self::transport_error("download a file", e))?;
        Self::check("download a file", response)
            .await?
            .bytes()
            .await
            .map_err(|e| Self::transport_error("download a file", e))
    }

    async fn move_item(
        &self,
        item_id: &str,
        new_parent_id: &str,
        new_name: &str,
    ) -> AppResult<ApiItem> {
        let url = self.url(&["folders", item_id, "move"])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&FolderRequest {
                parent_id: new_parent_id,
                name: new_name,
            })
            .send()
            .await
            .map_err(|e| Self::transport_error("move an item", e))?;
        Self::item("move an item", response).await
    }

    async fn ping(&self) -> AppResult<bool> {
        let url = self.url(&["ping"])?;
        match self.http.get(url).bearer_auth(&self.token).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::warn!(tenant = %self.tenant, error = %e, "Document API ping failed");
                Ok(false)
            }
        }
    }
}

/// Connects drives to their tenants over HTTP.
#[derive(Debug, Clone)]
pub struct HttpDocumentApiConnector {
    timeout: Duration,
}

impl HttpDocumentApiConnector {
    /// Create a connector whose clients time out after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl DocumentApiConnector for HttpDocumentApiConnector {
    async fn connect(
        &self,
        _drive: &StorageDrive,
        details: &DocumentApiDriveDetails,
    ) -> AppResult<Arc<dyn DocumentApiClient>> {
        let client: Arc<dyn DocumentApiClient> =
            Arc::new(HttpDocumentApiClient::new(details, self.timeout)?);
        Ok(client)
    }
}
