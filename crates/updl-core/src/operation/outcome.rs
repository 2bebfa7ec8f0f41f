//! Write-once completion result of a download operation.

use std::path::PathBuf;
use std::sync::OnceLock;

use crate::error::DownloadError;
use crate::response::ResponseHead;

/// A finished download: where the bytes are and the response that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub file_path: PathBuf,
    pub response: ResponseHead,
}

pub type CompletionResult = Result<DownloadedFile, DownloadError>;

/// Returned by queries made before the operation finished.
static NOT_FINISHED: DownloadError = DownloadError::Cancelled;

#[derive(Debug, Default)]
pub(crate) struct Completion {
    cell: OnceLock<CompletionResult>,
}

impl Completion {
    /// Fix the result. Returns false (and drops `result`) if one was already set.
    pub(crate) fn set(&self, result: CompletionResult) -> bool {
        self.cell.set(result).is_ok()
    }

    pub(crate) fn is_set(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Move the result out, leaving the cell empty.
    pub(crate) fn take(&mut self) -> CompletionResult {
        self.cell.take().unwrap_or(Err(DownloadError::Cancelled))
    }

    pub(crate) fn get(&self) -> Result<&DownloadedFile, &DownloadError> {
        match self.cell.get() {
            Some(Ok(file)) => Ok(file),
            Some(Err(e)) => Err(e),
            None => Err(&NOT_FINISHED),
        }
    }
}
