//! Range/conditional request builder.
//!
//! Resumes only when the server can prove the bytes on disk belong to the same
//! representation: `If-Range` with the stored `ETag` plus an open-ended `Range`
//! starting at the current file size. A server whose representation changed
//! answers `200` with the full body instead of `206`.

use crate::request::DownloadRequest;
use crate::resume_store::ResumableDownload;
use crate::storage;

/// Outgoing request for `original` given the resume state in `record`.
///
/// Returns `original` unchanged when the stored response has no `ETag` or the
/// file size cannot be read; resuming is an optimization, never a requirement.
pub fn build_request(original: &DownloadRequest, record: &ResumableDownload) -> DownloadRequest {
    let Some(etag) = record.response.etag() else {
        return original.clone();
    };
    let size = match storage::file_len(&record.file_path) {
        Ok(size) => size,
        Err(e) => {
            tracing::warn!(
                path = %record.file_path.display(),
                "cannot stat resume file, requesting full content: {}",
                e
            );
            return original.clone();
        }
    };
    tracing::debug!(etag, size, "resuming with conditional range request");
    original
        .clone()
        .with_header("If-Range", etag)
        .with_header("Range", &format!("bytes={}-", size))
}
