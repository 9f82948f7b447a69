//! Fetch, scan and report
//!
//! One pass lists what changed in the watched folder, picks the cut sheets
//! out of it, and for each one downloads it, scans it and uploads a result
//! artifact next to it. A failing file is recorded and the pass moves on.
//! Files whose download or upload failed are queued and tried again on the
//! following passes, since the listing cursor has already moved past them.

use crate::ledger::ProcessedLedger;
use crate::storage::{Entry, Listing, Storage, StorageError};
use chrono::{DateTime, Utc};
use cutqa::{ScanStatus, ScanVerdict};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Whether a listing entry is a sheet that should be scanned.
pub fn is_candidate(entry: &Entry, marker: &str) -> bool {
    entry.is_file()
        && entry.name.contains(marker)
        && entry.name.to_ascii_lowercase().ends_with(".pdf")
}

/// `/Jobs/A_CUT.pdf` is reported as `/Jobs/A_CUT_qa_result.json`.
pub fn result_path(source: &str) -> String {
    let (dir, name) = match source.rsplit_once('/') {
        Some((dir, name)) => (format!("{dir}/"), name),
        None => (String::new(), source),
    };
    let stem = match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    };
    format!("{dir}{stem}_qa_result.json")
}

/// The JSON document published for each scanned sheet.
#[derive(Debug, Clone, Serialize)]
pub struct ResultArtifact {
    pub file: String,
    pub instance_count: usize,
    pub status: ScanStatus,
    pub message: String,
    pub scanned_at: DateTime<Utc>,
}

impl ResultArtifact {
    pub fn new(file: &str, verdict: &ScanVerdict) -> Self {
        Self {
            file: file.to_string(),
            instance_count: verdict.instance_count(),
            status: verdict.status(),
            message: verdict.message().to_string(),
            scanned_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Download,
    Scan,
    Publish,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Reported {
        verdict: ScanVerdict,
        result_path: String,
    },
    AlreadyProcessed,
    Failed {
        stage: Stage,
        error: String,
    },
}

/// What happened to one candidate file during a pass.
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl FileOutcome {
    pub fn verdict(&self) -> Option<&ScanVerdict> {
        match &self.outcome {
            Outcome::Reported { verdict, .. } => Some(verdict),
            _ => None,
        }
    }
}

/// Number of failed attempts after which a file is no longer retried.
pub const MAX_ATTEMPTS: u32 = 5;

#[derive(Default)]
struct PassState {
    cursor: Option<String>,
    /// Candidates that failed transiently, with their failure count.
    retry: Vec<(Entry, u32)>,
}

pub struct Pipeline<S> {
    storage: Arc<S>,
    ledger: ProcessedLedger,
    marker: String,
    /// The lock also serializes passes.
    state: Mutex<PassState>,
}

impl<S: Storage> Pipeline<S> {
    pub fn new(storage: Arc<S>, marker: impl Into<String>) -> Self {
        Self {
            storage,
            ledger: ProcessedLedger::new(),
            marker: marker.into(),
            state: Mutex::new(PassState::default()),
        }
    }

    pub fn ledger(&self) -> &ProcessedLedger {
        &self.ledger
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Runs one pass over everything that changed since the previous one,
    /// preceded by the files queued for retry.
    ///
    /// A listing failure fails the pass and leaves the retry queue intact;
    /// failures of individual files are reported in the returned outcomes.
    pub async fn run_once(&self) -> Result<Vec<FileOutcome>, StorageError> {
        let mut state = self.state.lock().await;
        let listing = self.list(state.cursor.as_deref()).await?;
        state.cursor = Some(listing.cursor);

        let entries = listing.entries.len();
        let listed = listing
            .entries
            .into_iter()
            .filter(|entry| is_candidate(entry, &self.marker))
            .collect::<Vec<_>>();
        // A queued file that changed again is picked up from the listing instead.
        let mut queue = std::mem::take(&mut state.retry)
            .into_iter()
            .filter(|(queued, _)| !listed.iter().any(|entry| entry.path() == queued.path()))
            .collect::<Vec<_>>();
        info!(
            entries,
            candidates = listed.len(),
            retries = queue.len(),
            "Processing folder changes"
        );
        queue.extend(listed.into_iter().map(|entry| (entry, 0)));

        let mut outcomes = Vec::with_capacity(queue.len());
        for (entry, failures) in queue {
            let outcome = self.process(&entry).await;
            if let Outcome::Failed { stage, .. } = &outcome.outcome {
                if *stage != Stage::Scan {
                    let failures = failures + 1;
                    if failures < MAX_ATTEMPTS {
                        state.retry.push((entry, failures));
                    } else {
                        warn!(file = %outcome.path, failures, "Giving up on file");
                    }
                }
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Number of files waiting to be retried on the next pass.
    pub async fn pending_retries(&self) -> usize {
        self.state.lock().await.retry.len()
    }

    async fn list(&self, cursor: Option<&str>) -> Result<Listing, StorageError> {
        match self.storage.list_changes(cursor).await {
            Err(e) if cursor.is_some() && e.is_cursor_reset() => {
                warn!("Listing cursor was reset, starting a full listing");
                self.storage.list_changes(None).await
            }
            result => result,
        }
    }

    async fn process(&self, entry: &Entry) -> FileOutcome {
        let key = entry.path();
        let path = entry.display_path().to_string();

        if !self.ledger.claim(key) {
            return FileOutcome {
                path,
                outcome: Outcome::AlreadyProcessed,
            };
        }

        let outcome = match self.scan_and_report(entry).await {
            Ok((verdict, result_path)) => {
                info!(file = %path, status = %verdict.status(), instances = verdict.instance_count(), "Reported scan result");
                Outcome::Reported {
                    verdict,
                    result_path,
                }
            }
            Err((stage, error)) => {
                error!(file = %path, ?stage, %error, "Failed to process file");
                // Scan failures are permanent; the others may succeed on a later pass.
                if stage != Stage::Scan {
                    self.ledger.release(key);
                }
                Outcome::Failed { stage, error }
            }
        };
        FileOutcome { path, outcome }
    }

    async fn scan_and_report(&self, entry: &Entry) -> Result<(ScanVerdict, String), (Stage, String)> {
        let bytes = self
            .storage
            .download(entry.path())
            .await
            .map_err(|e| (Stage::Download, e.to_string()))?;

        let verdict = tokio::task::spawn_blocking(move || cutqa::scan(&bytes))
            .await
            .map_err(|e| (Stage::Scan, e.to_string()))?
            .map_err(|e| (Stage::Scan, e.to_string()))?;

        let artifact = ResultArtifact::new(entry.display_path(), &verdict);
        let body = serde_json::to_vec_pretty(&artifact).map_err(|e| (Stage::Publish, e.to_string()))?;
        let stored = self
            .storage
            .upload(&result_path(entry.display_path()), body)
            .await
            .map_err(|e| (Stage::Publish, e.to_string()))?;

        Ok((verdict, stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use cutqa::sample::{SamplePage, SampleSheet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Storage whose first downloads or uploads fail with a 503.
    #[derive(Default)]
    struct FlakyStorage {
        inner: MemoryStorage,
        failing_downloads: AtomicUsize,
        failing_uploads: AtomicUsize,
    }

    fn take_failure(counter: &AtomicUsize) -> Result<(), StorageError> {
        match counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
            Ok(_) => Err(StorageError::Http {
                status: 503,
                body: "unavailable".to_string(),
            }),
            Err(_) => Ok(()),
        }
    }

    impl Storage for FlakyStorage {
        async fn list_changes(&self, cursor: Option<&str>) -> Result<Listing, StorageError> {
            self.inner.list_changes(cursor).await
        }

        async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError> {
            take_failure(&self.failing_downloads)?;
            self.inner.download(path).await
        }

        async fn upload(&self, path: &str, contents: Vec<u8>) -> Result<String, StorageError> {
            take_failure(&self.failing_uploads)?;
            self.inner.upload(path, contents).await
        }
    }

    fn sheet(magenta: usize) -> Vec<u8> {
        SampleSheet::new()
            .page(SamplePage::new().magenta_lines(magenta).other_lines(2))
            .to_bytes()
            .unwrap()
    }

    #[test]
    fn test_candidate_rule() {
        assert!(is_candidate(&Entry::file("/Jobs/Order 7 CUT.pdf"), "CUT"));
        assert!(is_candidate(&Entry::file("/Jobs/CUT-sheet.PDF"), "CUT"));
        assert!(!is_candidate(&Entry::file("/Jobs/Order 7 cut.pdf"), "CUT"));
        assert!(!is_candidate(&Entry::file("/Jobs/Order 7 CUT.ai"), "CUT"));
        assert!(!is_candidate(&Entry::file("/Jobs/CUT_qa_result.json"), "CUT"));

        let mut folder = Entry::file("/Jobs/CUT.pdf");
        folder.kind = crate::storage::EntryKind::Folder;
        assert!(!is_candidate(&folder, "CUT"));
    }

    #[test]
    fn test_result_path() {
        assert_eq!(result_path("/Jobs/A_CUT.pdf"), "/Jobs/A_CUT_qa_result.json");
        assert_eq!(result_path("A.CUT.v2.pdf"), "A.CUT.v2_qa_result.json");
        assert_eq!(result_path("/CUT"), "/CUT_qa_result.json");
    }

    #[tokio::test]
    async fn test_pass_reports_each_candidate() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert("/Jobs/A CUT.pdf", sheet(2));
        storage.insert("/Jobs/B CUT.pdf", sheet(0));
        storage.insert("/Jobs/notes.pdf", sheet(4));
        let pipeline = Pipeline::new(Arc::clone(&storage), "CUT");

        let outcomes = pipeline.run_once().await.unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].path, "/Jobs/A CUT.pdf");
        assert_eq!(outcomes[0].verdict().unwrap().instance_count(), 2);
        assert_eq!(outcomes[1].verdict().unwrap().status(), ScanStatus::Pass);

        let uploads = storage.uploads();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[0].0, "/Jobs/A CUT_qa_result.json");
        let artifact: serde_json::Value = serde_json::from_slice(&uploads[0].1).unwrap();
        assert_eq!(artifact["file"], "/Jobs/A CUT.pdf");
        assert_eq!(artifact["status"], "FAIL");
        assert_eq!(artifact["instance_count"], 2);
    }

    #[tokio::test]
    async fn test_corrupt_file_does_not_stop_the_pass() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert("/A CUT.pdf", b"not a pdf".to_vec());
        storage.insert("/B CUT.pdf", sheet(1));
        let pipeline = Pipeline::new(Arc::clone(&storage), "CUT");

        let outcomes = pipeline.run_once().await.unwrap();

        assert!(matches!(
            outcomes[0].outcome,
            Outcome::Failed {
                stage: Stage::Scan,
                ..
            }
        ));
        assert_eq!(outcomes[1].verdict().unwrap().instance_count(), 1);
        // Parse failures are not retried.
        assert!(pipeline.ledger().contains("/a cut.pdf"));
        assert_eq!(storage.uploads().len(), 1);
    }

    #[tokio::test]
    async fn test_later_passes_only_see_new_files() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert("/A CUT.pdf", sheet(1));
        let pipeline = Pipeline::new(Arc::clone(&storage), "CUT");

        assert_eq!(pipeline.run_once().await.unwrap().len(), 1);
        assert!(pipeline.run_once().await.unwrap().is_empty());

        storage.insert("/B CUT.pdf", sheet(0));
        let outcomes = pipeline.run_once().await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].path, "/B CUT.pdf");
    }

    #[tokio::test]
    async fn test_reuploaded_file_is_not_reported_twice() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert("/A CUT.pdf", sheet(1));
        let pipeline = Pipeline::new(Arc::clone(&storage), "CUT");
        pipeline.run_once().await.unwrap();

        storage.insert("/A CUT.pdf", sheet(3));
        let outcomes = pipeline.run_once().await.unwrap();

        assert!(matches!(outcomes[0].outcome, Outcome::AlreadyProcessed));
        assert_eq!(storage.uploads().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_download_is_retried_on_next_pass() {
        let storage = Arc::new(FlakyStorage::default());
        storage.inner.insert("/A CUT.pdf", sheet(2));
        storage.failing_downloads.store(1, Ordering::SeqCst);
        let pipeline = Pipeline::new(Arc::clone(&storage), "CUT");

        let first = pipeline.run_once().await.unwrap();
        assert!(matches!(
            first[0].outcome,
            Outcome::Failed {
                stage: Stage::Download,
                ..
            }
        ));
        assert!(!pipeline.ledger().contains("/a cut.pdf"));
        assert_eq!(pipeline.pending_retries().await, 1);

        let second = pipeline.run_once().await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].verdict().unwrap().instance_count(), 2);
        assert_eq!(storage.inner.uploads().len(), 1);
        assert_eq!(pipeline.pending_retries().await, 0);

        assert!(pipeline.run_once().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_publish_is_retried_on_next_pass() {
        let storage = Arc::new(FlakyStorage::default());
        storage.inner.insert("/A CUT.pdf", sheet(1));
        storage.inner.insert("/B CUT.pdf", sheet(0));
        storage.failing_uploads.store(1, Ordering::SeqCst);
        let pipeline = Pipeline::new(Arc::clone(&storage), "CUT");

        let first = pipeline.run_once().await.unwrap();
        assert!(matches!(
            first[0].outcome,
            Outcome::Failed {
                stage: Stage::Publish,
                ..
            }
        ));
        assert!(first[1].verdict().is_some());

        let second = pipeline.run_once().await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].path, "/A CUT.pdf");
        assert!(second[0].verdict().is_some());

        let uploads = storage.inner.uploads();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[1].0, "/A CUT_qa_result.json");
    }

    #[tokio::test]
    async fn test_retries_stop_after_max_attempts() {
        let storage = Arc::new(FlakyStorage::default());
        storage.inner.insert("/A CUT.pdf", sheet(1));
        storage
            .failing_downloads
            .store(MAX_ATTEMPTS as usize + 1, Ordering::SeqCst);
        let pipeline = Pipeline::new(Arc::clone(&storage), "CUT");

        for _ in 0..MAX_ATTEMPTS {
            let outcomes = pipeline.run_once().await.unwrap();
            assert_eq!(outcomes.len(), 1);
        }

        assert_eq!(pipeline.pending_retries().await, 0);
        assert!(pipeline.run_once().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_changed_file_replaces_queued_retry() {
        let storage = Arc::new(FlakyStorage::default());
        storage.inner.insert("/A CUT.pdf", sheet(1));
        storage.failing_downloads.store(1, Ordering::SeqCst);
        let pipeline = Pipeline::new(Arc::clone(&storage), "CUT");
        pipeline.run_once().await.unwrap();

        storage.inner.insert("/A CUT.pdf", sheet(3));
        let outcomes = pipeline.run_once().await.unwrap();

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].verdict().unwrap().instance_count(), 3);
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = FileOutcome {
            path: "/A CUT.pdf".to_string(),
            outcome: Outcome::Failed {
                stage: Stage::Download,
                error: "boom".to_string(),
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["path"], "/A CUT.pdf");
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["stage"], "download");
    }
}
