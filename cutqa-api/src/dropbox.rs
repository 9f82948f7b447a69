//! Dropbox HTTP API client
//!
//! Implements [`Storage`] over `files/list_folder`, `files/list_folder/continue`,
//! `files/download` and `files/upload`. Every request goes through
//! [`DropboxClient::send`], which attaches a fresh bearer token, retries once
//! after a 401 with a refreshed token, and backs off on 429/5xx.

use crate::auth::TokenManager;
use crate::retry::{is_retryable_status, parse_retry_after, RetryPolicy};
use crate::storage::{Entry, Listing, Storage, StorageError};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

pub const API_BASE: &str = "https://api.dropboxapi.com";
pub const CONTENT_BASE: &str = "https://content.dropboxapi.com";

const API_ARG_HEADER: &str = "Dropbox-API-Arg";

#[derive(Debug, Deserialize)]
struct ListFolderResponse {
    entries: Vec<Entry>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    path_display: Option<String>,
    path_lower: Option<String>,
}

/// Endpoints of the storage API; overridable to point at a local stand-in.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub api_base: String,
    pub content_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api_base: API_BASE.to_string(),
            content_base: CONTENT_BASE.to_string(),
        }
    }
}

pub struct DropboxClient {
    http: reqwest::Client,
    tokens: Arc<TokenManager>,
    endpoints: Endpoints,
    watch_path: String,
    retry: RetryPolicy,
}

impl DropboxClient {
    pub fn new(
        http: reqwest::Client,
        tokens: Arc<TokenManager>,
        watch_path: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http,
            tokens,
            endpoints: Endpoints::default(),
            watch_path: watch_path.into(),
            retry,
        }
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    fn api_url(&self, route: &str) -> String {
        format!("{}/2/{route}", self.endpoints.api_base.trim_end_matches('/'))
    }

    fn content_url(&self, route: &str) -> String {
        format!("{}/2/{route}", self.endpoints.content_base.trim_end_matches('/'))
    }

    /// Sends a request built by `build` for a given bearer token, handling
    /// token refresh and transient failures.
    async fn send<F>(&self, route: &str, build: F) -> Result<Response, StorageError>
    where
        F: Fn(&str) -> RequestBuilder + Send + Sync,
    {
        let mut attempt = 0;
        let mut refreshed = false;

        loop {
            let token = self.tokens.access_token().await?;
            let retry_after = match build(&token).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if response.status() == StatusCode::UNAUTHORIZED && !refreshed => {
                    debug!(route, "Access token rejected, refreshing");
                    self.tokens.invalidate(&token).await;
                    refreshed = true;
                    continue;
                }
                Ok(response)
                    if is_retryable_status(response.status()) && self.retry.should_retry(attempt) =>
                {
                    let header = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok());
                    warn!(route, status = %response.status(), attempt, "Retrying storage request");
                    parse_retry_after(header)
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    return Err(match status {
                        401 => StorageError::Auth(body),
                        _ => StorageError::Http { status, body },
                    });
                }
                Err(e) if is_transient(&e) && self.retry.should_retry(attempt) => {
                    warn!(route, error = %e, attempt, "Retrying after transport error");
                    None
                }
                Err(e) => return Err(e.into()),
            };

            tokio::time::sleep(self.retry.delay_for(attempt, retry_after)).await;
            attempt += 1;
        }
    }

    async fn list_page(&self, cursor: Option<&str>) -> Result<ListFolderResponse, StorageError> {
        let (url, body) = match cursor {
            Some(cursor) => (self.api_url("files/list_folder/continue"), json!({ "cursor": cursor })),
            None => (
                self.api_url("files/list_folder"),
                json!({
                    "path": self.watch_path,
                    "recursive": true,
                    "include_deleted": false,
                }),
            ),
        };
        let response = self
            .send("list_folder", |token| {
                self.http.post(&url).bearer_auth(token).json(&body)
            })
            .await?;
        response
            .json()
            .await
            .map_err(|e| StorageError::Decode(format!("list_folder response: {e}")))
    }
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

/// Serializes an argument for the `Dropbox-API-Arg` header, which must be
/// ASCII: everything outside it is written as JSON `\u` escapes.
pub fn api_arg(value: &serde_json::Value) -> String {
    let mut out = String::new();
    for c in value.to_string().chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    out
}

impl Storage for DropboxClient {
    async fn list_changes(&self, cursor: Option<&str>) -> Result<Listing, StorageError> {
        let mut page = self.list_page(cursor).await?;
        let mut entries = std::mem::take(&mut page.entries);

        while page.has_more {
            let cursor = std::mem::take(&mut page.cursor);
            page = self.list_page(Some(&cursor)).await?;
            entries.append(&mut page.entries);
        }
        debug!(entries = entries.len(), "Listed folder changes");

        Ok(Listing {
            entries,
            cursor: page.cursor,
        })
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let url = self.content_url("files/download");
        let arg = api_arg(&json!({ "path": path }));
        let response = self
            .send("download", |token| {
                self.http
                    .post(&url)
                    .bearer_auth(token)
                    .header(API_ARG_HEADER, arg.as_str())
            })
            .await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn upload(&self, path: &str, contents: Vec<u8>) -> Result<String, StorageError> {
        let url = self.content_url("files/upload");
        let arg = api_arg(&json!({
            "path": path,
            "mode": "add",
            "autorename": true,
            "mute": true,
        }));
        let response = self
            .send("upload", |token| {
                self.http
                    .post(&url)
                    .bearer_auth(token)
                    .header(API_ARG_HEADER, arg.as_str())
                    .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                    .body(contents.clone())
            })
            .await?;
        let metadata: UploadResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Decode(format!("upload response: {e}")))?;
        Ok(metadata
            .path_display
            .or(metadata.path_lower)
            .unwrap_or_else(|| path.to_string()))
    }
}
