//! Error types for the download operation and the resume stores.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a resume store (`lookup` or `store`).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Creating or inspecting the local file failed.
    #[error("resume file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The SQLite database rejected a query.
    #[error("resume database: {0}")]
    Database(#[from] sqlx::Error),
    /// Stored response headers could not be (de)serialized.
    #[error("resume record encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    /// The store's internal lock was poisoned by a panicking thread.
    #[error("resume store lock poisoned")]
    Poisoned,
}

/// Terminal error of a download operation.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Resume state could not be obtained or created. Fatal before any network activity.
    #[error("resume state lookup failed: {0}")]
    Lookup(#[source] StoreError),
    /// Transport-level failure while connecting or streaming.
    #[error("network: {0}")]
    Network(#[from] curl::Error),
    /// Deleting or appending to the local file failed.
    #[error("file {path}: {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Persisting the new resume record failed.
    #[error("resume state update failed: {0}")]
    Store(#[source] StoreError),
    /// Cancelled by the caller, or queried before the operation finished.
    #[error("download cancelled")]
    Cancelled,
    /// `start` was called on an operation that already left `Idle`.
    #[error("download operation already started")]
    AlreadyStarted,
}

impl DownloadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled)
    }
}
