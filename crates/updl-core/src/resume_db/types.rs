//! Types used by the resume database.

use std::path::PathBuf;

/// Summary view used by the CLI `status` command.
#[derive(Debug, Clone)]
pub struct RecordSummary {
    pub request_key: String,
    pub status: Option<u32>,
    pub etag: Option<String>,
    pub file_path: PathBuf,
    /// Current size of the resume file, `None` if it is missing.
    pub file_len: Option<u64>,
    pub updated_at: i64,
}
