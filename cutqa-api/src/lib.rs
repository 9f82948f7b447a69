//! # cutqa-api
//!
//! Webhook service for cutqa: watches a Dropbox folder, scans new cut sheets
//! and publishes a result artifact next to each one.
//!

mod api;
pub mod auth;
pub mod config;
pub mod dropbox;
pub mod ledger;
pub mod pipeline;
pub mod retry;
pub mod signature;
pub mod storage;

pub use api::{
    app, health_check, scan_upload, trigger, webhook_challenge, webhook_notify, AppError,
    AppState, ErrorResponse, ScanResponse, TriggerResponse, MAX_UPLOAD_BYTES,
};
pub use config::{Config, ConfigError};
pub use pipeline::{FileOutcome, Outcome, Pipeline, Stage, MAX_ATTEMPTS};
pub use storage::{MemoryStorage, Storage, StorageError};
