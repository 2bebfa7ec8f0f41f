//! Disk I/O for resume files.
//!
//! One file per request, named after a hash of the request identity, appended
//! to chunk by chunk and truncated by deletion when a download restarts.

mod writer;

pub use writer::{append_chunk, write_fully};

use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Suffix of partially or fully downloaded resume files.
pub const PART_SUFFIX: &str = ".part";

/// File name for the request with identity `key`: hex SHA-256 of the key plus `.part`.
pub fn resume_file_name(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("{}{}", hex::encode(digest), PART_SUFFIX)
}

/// Delete `path`. A file that does not exist counts as deleted.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Current on-disk size of `path`.
pub fn file_len(path: &Path) -> io::Result<u64> {
    Ok(fs::metadata(path)?.len())
}

/// Make sure `path` exists as a regular file, creating an empty one (and its
/// parent directory) if needed. Returns true if the file had to be created.
pub fn ensure_file(path: &Path) -> io::Result<bool> {
    if path.is_file() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)?;
    Ok(true)
}

/// `dir/<resume_file_name(key)>`.
pub fn resume_file_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(resume_file_name(key))
}
