//! Resume store: maps a request to the response metadata and local file of its
//! last attempt.
//!
//! The download operation only ever calls `lookup` and `store`. Implementations
//! must keep at most one consistent record per request key and make each call
//! atomic with respect to that key; they need not serialize different keys.

mod memory;
mod sqlite;

pub use memory::MemoryResumeStore;
pub use sqlite::SqliteResumeStore;

use crate::error::StoreError;
use crate::request::DownloadRequest;
use crate::response::ResponseHead;
use crate::storage;
use std::path::PathBuf;

/// Resume state of one request: the last response seen and the file holding
/// the bytes received so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumableDownload {
    pub response: ResponseHead,
    pub file_path: PathBuf,
}

impl ResumableDownload {
    /// Record for a download that has not received any response yet.
    pub fn fresh(file_path: PathBuf) -> Self {
        Self {
            response: ResponseHead::default(),
            file_path,
        }
    }

    /// Record for the same file with a newly received response.
    pub fn with_response(&self, response: ResponseHead) -> Self {
        Self {
            response,
            file_path: self.file_path.clone(),
        }
    }

    /// Guarantee the backing file exists before any response is inspected.
    ///
    /// If it had vanished, an empty file is created and the stored headers are
    /// dropped: an `ETag` without its bytes must not drive a range request.
    pub fn ensure_backing_file(self) -> Result<Self, StoreError> {
        let created = storage::ensure_file(&self.file_path).map_err(|source| StoreError::Io {
            path: self.file_path.clone(),
            source,
        })?;
        if created && self.response != ResponseHead::default() {
            tracing::warn!(
                path = %self.file_path.display(),
                "resume file missing, discarding stored response"
            );
            return Ok(Self::fresh(self.file_path));
        }
        Ok(self)
    }
}

/// Persistence of `ResumableDownload` records keyed by `DownloadRequest::key`.
pub trait ResumeStore: Send + Sync {
    /// Existing record for `request`, or a new one backed by a fresh empty file.
    /// The returned record's file always exists.
    fn lookup(&self, request: &DownloadRequest) -> Result<ResumableDownload, StoreError>;

    /// Replace the record for `request` with `record`.
    fn store(&self, record: &ResumableDownload, request: &DownloadRequest) -> Result<(), StoreError>;

    /// Drop the record for `request` and delete its file. Missing records are fine.
    ///
    /// Download operations never call this; callers use it to discard bytes
    /// they will not resume from, such as the body of an error response.
    fn remove(&self, request: &DownloadRequest) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_backing_file_keeps_existing_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.part");
        std::fs::write(&path, b"HELLO").unwrap();
        let rec = ResumableDownload {
            response: ResponseHead::parse(&["HTTP/1.1 200 OK", "ETag: \"abc\""]),
            file_path: path.clone(),
        };
        let out = rec.clone().ensure_backing_file().unwrap();
        assert_eq!(out, rec);
    }

    #[test]
    fn ensure_backing_file_resets_when_file_vanished() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.part");
        let rec = ResumableDownload {
            response: ResponseHead::parse(&["HTTP/1.1 200 OK", "ETag: \"abc\""]),
            file_path: path.clone(),
        };
        let out = rec.ensure_backing_file().unwrap();
        assert!(path.is_file());
        assert_eq!(out.response, ResponseHead::default());
        assert!(out.response.etag().is_none());
    }
}
