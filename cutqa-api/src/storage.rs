//! Storage collaborator: listing, download and upload of files

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Storage API returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl StorageError {
    /// Whether the cursor used for an incremental listing is no longer valid.
    pub fn is_cursor_reset(&self) -> bool {
        matches!(self, StorageError::Http { status: 409, body } if body.contains("reset"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
    Deleted,
    #[serde(other)]
    Other,
}

/// One entry of a folder listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(rename = ".tag")]
    pub kind: EntryKind,
    pub name: String,
    #[serde(default)]
    pub path_lower: Option<String>,
    #[serde(default)]
    pub path_display: Option<String>,
}

impl Entry {
    pub fn file(path: &str) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        Self {
            kind: EntryKind::File,
            name,
            path_lower: Some(path.to_lowercase()),
            path_display: Some(path.to_string()),
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Path used to address the file in API calls.
    pub fn path(&self) -> &str {
        self.path_lower
            .as_deref()
            .or(self.path_display.as_deref())
            .unwrap_or(&self.name)
    }

    /// Path in its original casing, for reports and result artifacts.
    pub fn display_path(&self) -> &str {
        self.path_display.as_deref().unwrap_or_else(|| self.path())
    }
}

/// All entries changed since a cursor, plus the cursor to continue from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub entries: Vec<Entry>,
    pub cursor: String,
}

/// File storage operations the pipeline depends on.
pub trait Storage: Send + Sync + 'static {
    /// Lists entries below the watch folder. Without a cursor this is a full
    /// listing; with one, only changes since that cursor. Paging is followed
    /// to the end.
    fn list_changes(
        &self,
        cursor: Option<&str>,
    ) -> impl Future<Output = Result<Listing, StorageError>> + Send;

    fn download(&self, path: &str) -> impl Future<Output = Result<Vec<u8>, StorageError>> + Send;

    /// Stores `contents` at `path` without overwriting, returning the stored path.
    fn upload(
        &self,
        path: &str,
        contents: Vec<u8>,
    ) -> impl Future<Output = Result<String, StorageError>> + Send;
}

/// In-process storage for local runs and tests.
///
/// Cursors are revision numbers: a listing from cursor `n` returns files
/// added after revision `n`.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<String, (u64, Vec<u8>)>,
    revision: u64,
    uploads: Vec<(String, Vec<u8>)>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, contents: Vec<u8>) {
        let mut state = self.lock();
        state.revision += 1;
        let revision = state.revision;
        state.files.insert(path.to_string(), (revision, contents));
    }

    /// Everything written through [`Storage::upload`], in order.
    pub fn uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.lock().uploads.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Storage for MemoryStorage {
    async fn list_changes(&self, cursor: Option<&str>) -> Result<Listing, StorageError> {
        let since = match cursor {
            Some(cursor) => cursor
                .parse::<u64>()
                .map_err(|_| StorageError::Http {
                    status: 409,
                    body: "reset".to_string(),
                })?,
            None => 0,
        };
        let state = self.lock();
        let entries = state
            .files
            .iter()
            .filter(|(_, (revision, _))| *revision > since)
            .map(|(path, _)| Entry::file(path))
            .collect();
        Ok(Listing {
            entries,
            cursor: state.revision.to_string(),
        })
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.lock()
            .files
            .iter()
            .find(|(stored, _)| stored.to_lowercase() == path.to_lowercase())
            .map(|(_, (_, contents))| contents.clone())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn upload(&self, path: &str, contents: Vec<u8>) -> Result<String, StorageError> {
        let mut state = self.lock();
        let taken = |candidate: &str, state: &MemoryState| {
            state.files.contains_key(candidate) || state.uploads.iter().any(|(p, _)| p == candidate)
        };

        let mut stored = path.to_string();
        let mut n = 1;
        while taken(&stored, &state) {
            stored = autorename(path, n);
            n += 1;
        }
        state.uploads.push((stored.clone(), contents));
        Ok(stored)
    }
}

/// `a/b.json` becomes `a/b (1).json`, matching the storage API's autorename.
fn autorename(path: &str, n: usize) -> String {
    let (dir, name) = match path.rsplit_once('/') {
        Some((dir, name)) => (format!("{dir}/"), name),
        None => (String::new(), path),
    };
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{dir}{stem} ({n}).{ext}"),
        _ => format!("{dir}{name} ({n})"),
    }
}
