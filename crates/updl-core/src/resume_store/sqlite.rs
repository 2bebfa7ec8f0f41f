//! Blocking `ResumeStore` over the async SQLite resume database.

use std::path::{Path, PathBuf};
use tokio::runtime::Handle;

use super::{ResumableDownload, ResumeStore};
use crate::error::StoreError;
use crate::request::DownloadRequest;
use crate::resume_db::ResumeDb;

/// Resume store persisted in SQLite.
///
/// Download operations call the store from their own worker threads, so each
/// call blocks on `runtime`. Never call it from inside an async task.
#[derive(Clone)]
pub struct SqliteResumeStore {
    db: ResumeDb,
    downloads_dir: PathBuf,
    runtime: Handle,
}

impl SqliteResumeStore {
    pub fn new(db: ResumeDb, downloads_dir: impl AsRef<Path>, runtime: Handle) -> Self {
        Self {
            db,
            downloads_dir: downloads_dir.as_ref().to_path_buf(),
            runtime,
        }
    }
}

impl ResumeStore for SqliteResumeStore {
    fn lookup(&self, request: &DownloadRequest) -> Result<ResumableDownload, StoreError> {
        self.runtime
            .block_on(self.db.lookup_or_create(request, &self.downloads_dir))
    }

    fn store(&self, record: &ResumableDownload, request: &DownloadRequest) -> Result<(), StoreError> {
        self.runtime.block_on(self.db.put(request, record))
    }

    fn remove(&self, request: &DownloadRequest) -> Result<(), StoreError> {
        self.runtime
            .block_on(self.db.remove(&request.key()))
            .map(drop)
    }
}
