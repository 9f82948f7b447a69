use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Unreadable document: {0}")]
    UnreadableDocument(#[source] lopdf::Error),

    #[error("Corrupt content on page {page}: {reason}")]
    CorruptPage { page: u32, reason: String },
}

pub type Result<T> = std::result::Result<T, ScanError>;
