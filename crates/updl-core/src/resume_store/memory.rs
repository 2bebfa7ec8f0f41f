//! In-process resume store. Records live as long as the store; files live in `dir`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{ResumableDownload, ResumeStore};
use crate::error::StoreError;
use crate::request::DownloadRequest;
use crate::storage;

/// Resume store backed by a mutex-guarded map.
#[derive(Debug)]
pub struct MemoryResumeStore {
    dir: PathBuf,
    records: Mutex<HashMap<String, ResumableDownload>>,
}

impl MemoryResumeStore {
    /// New empty store placing fresh resume files in `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Stored record for `request`, without creating one.
    pub fn get(&self, request: &DownloadRequest) -> Option<ResumableDownload> {
        self.records.lock().ok()?.get(&request.key()).cloned()
    }
}

impl ResumeStore for MemoryResumeStore {
    fn lookup(&self, request: &DownloadRequest) -> Result<ResumableDownload, StoreError> {
        let key = request.key();
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        let record = match records.get(&key) {
            Some(existing) => existing.clone(),
            None => ResumableDownload::fresh(storage::resume_file_path(&self.dir, &key)),
        };
        let record = record.ensure_backing_file()?;
        records.insert(key, record.clone());
        Ok(record)
    }

    fn store(&self, record: &ResumableDownload, request: &DownloadRequest) -> Result<(), StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        records.insert(request.key(), record.clone());
        Ok(())
    }

    fn remove(&self, request: &DownloadRequest) -> Result<(), StoreError> {
        let removed = {
            let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
            records.remove(&request.key())
        };
        if let Some(record) = removed {
            storage::remove_if_exists(&record.file_path).map_err(|source| StoreError::Io {
                path: record.file_path.clone(),
                source,
            })?;
        }
        Ok(())
    }
}
