//! Service configuration read from the environment

use std::net::IpAddr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// OAuth client credentials for the Dropbox app.
#[derive(Clone)]
pub struct DropboxCredentials {
    pub app_key: String,
    pub app_secret: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for DropboxCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropboxCredentials")
            .field("app_key", &self.app_key)
            .field("app_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: IpAddr,
    pub port: u16,
    pub credentials: DropboxCredentials,
    /// Folder watched for new sheets; empty string is the account root
    pub watch_path: String,
    /// Substring a file name must contain to be scanned
    pub marker: String,
    pub max_retries: u32,
}

impl Config {
    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_MARKER: &'static str = "CUT";
    pub const DEFAULT_MAX_RETRIES: u32 = 4;

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from any key lookup, treating empty values as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let bind_addr = parse_or(&get, "BIND_ADDR", IpAddr::from([0, 0, 0, 0]))?;
        let port = parse_or(&get, "PORT", Self::DEFAULT_PORT)?;
        let max_retries = parse_or(&get, "DROPBOX_MAX_RETRIES", Self::DEFAULT_MAX_RETRIES)?;

        let credentials = DropboxCredentials {
            app_key: require("DROPBOX_APP_KEY")?,
            app_secret: require("DROPBOX_APP_SECRET")?,
            refresh_token: require("DROPBOX_REFRESH_TOKEN")?,
        };

        let watch_path = normalize_watch_path(&get("DROPBOX_WATCH_PATH").unwrap_or_default());
        let marker = get("CUT_MARKER").unwrap_or_else(|| Self::DEFAULT_MARKER.to_string());

        Ok(Self {
            bind_addr,
            port,
            credentials,
            watch_path,
            marker,
            max_retries,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

/// Dropbox addresses the root as "" and every other folder with a leading slash.
fn normalize_watch_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
