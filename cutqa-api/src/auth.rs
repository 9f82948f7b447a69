//! OAuth access tokens for the storage API
//!
//! Access tokens are short-lived and obtained with the app's long-lived
//! refresh token. The cached token sits behind one async mutex, so only one
//! refresh runs at a time and every waiter sees its result.

use crate::config::DropboxCredentials;
use crate::storage::StorageError;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const DEFAULT_TOKEN_URL: &str = "https://api.dropboxapi.com/oauth2/token";

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + EXPIRY_MARGIN < self.expires_at
    }
}

pub struct TokenManager {
    http: reqwest::Client,
    credentials: DropboxCredentials,
    token_url: String,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenManager {
    pub fn new(http: reqwest::Client, credentials: DropboxCredentials) -> Self {
        Self::with_token_url(http, credentials, DEFAULT_TOKEN_URL)
    }

    pub fn with_token_url(
        http: reqwest::Client,
        credentials: DropboxCredentials,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            credentials,
            token_url: token_url.into(),
            cached: Mutex::new(None),
        }
    }

    /// Returns a valid access token, refreshing it first if needed.
    pub async fn access_token(&self) -> Result<String, StorageError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Instant::now())) {
            return Ok(token.value.clone());
        }

        let token = self.refresh().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// Drops the cached token if it is still the one that was rejected.
    pub async fn invalidate(&self, rejected: &str) {
        let mut cached = self.cached.lock().await;
        if cached.as_ref().is_some_and(|t| t.value == rejected) {
            debug!("Discarding rejected access token");
            *cached = None;
        }
    }

    async fn refresh(&self) -> Result<AccessToken, StorageError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", self.credentials.refresh_token.as_str()),
            ("client_id", self.credentials.app_key.as_str()),
            ("client_secret", self.credentials.app_secret.as_str()),
        ];
        let response = self.http.post(&self.token_url).form(&params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Access token refresh rejected");
            return Err(StorageError::Auth(format!("token endpoint returned {status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Decode(format!("token response: {e}")))?;
        info!(expires_in = token.expires_in, "Access token refreshed successfully");
        Ok(AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_freshness_respects_margin() {
        let now = Instant::now();
        let token = AccessToken {
            value: "t".to_string(),
            expires_at: now + Duration::from_secs(3600),
        };
        assert!(token.is_fresh(now));
        assert!(!token.is_fresh(now + Duration::from_secs(3550)));
    }

    #[test]
    fn test_token_response_shape() {
        let json = r#"{"access_token":"sl.abc","token_type":"bearer","expires_in":14400}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "sl.abc");
        assert_eq!(token.expires_in, 14400);
    }
}
