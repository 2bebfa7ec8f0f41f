//! Record operations: lookup-or-create, upsert, list, remove.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::path::{Path, PathBuf};

use super::db::{unix_timestamp, ResumeDb};
use super::types::RecordSummary;
use crate::error::StoreError;
use crate::request::DownloadRequest;
use crate::response::ResponseHead;
use crate::resume_store::ResumableDownload;
use crate::storage;

fn decode(row: &SqliteRow) -> Result<ResumableDownload, StoreError> {
    let status: Option<i64> = row.get("status");
    let headers_json: String = row.get("headers_json");
    let file_path: String = row.get("file_path");
    Ok(ResumableDownload {
        response: ResponseHead {
            status: status.and_then(|s| u32::try_from(s).ok()),
            headers: serde_json::from_str(&headers_json)?,
        },
        file_path: PathBuf::from(file_path),
    })
}

impl ResumeDb {
    /// Stored record for `request_key`, if any.
    pub async fn get(&self, request_key: &str) -> Result<Option<ResumableDownload>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT status, headers_json, file_path
            FROM downloads
            WHERE request_key = ?1
            "#,
        )
        .bind(request_key)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(decode).transpose()
    }

    /// Existing record for `request`, or a fresh one whose empty file lives in
    /// `downloads_dir`. Concurrent callers for the same key converge on one row.
    pub async fn lookup_or_create(
        &self,
        request: &DownloadRequest,
        downloads_dir: &Path,
    ) -> Result<ResumableDownload, StoreError> {
        let key = request.key();
        let fresh_path = storage::resume_file_path(downloads_dir, &key);
        let now = unix_timestamp();
        sqlx::query(
            r#"
            INSERT INTO downloads (request_key, status, headers_json, file_path, created_at, updated_at)
            VALUES (?1, NULL, '[]', ?2, ?3, ?3)
            ON CONFLICT(request_key) DO NOTHING
            "#,
        )
        .bind(key.as_str())
        .bind(fresh_path.to_string_lossy().into_owned())
        .bind(now)
        .execute(&self.pool)
        .await?;

        let stored = self
            .get(&key)
            .await?
            .unwrap_or_else(|| ResumableDownload::fresh(fresh_path));
        let checked = stored.clone().ensure_backing_file()?;
        if checked != stored {
            self.put(request, &checked).await?;
        }
        Ok(checked)
    }

    /// Insert or replace the record for `request` in a single statement.
    pub async fn put(
        &self,
        request: &DownloadRequest,
        record: &ResumableDownload,
    ) -> Result<(), StoreError> {
        let now = unix_timestamp();
        let headers_json = serde_json::to_string(&record.response.headers)?;
        sqlx::query(
            r#"
            INSERT INTO downloads (request_key, status, headers_json, file_path, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(request_key) DO UPDATE SET
                status = excluded.status,
                headers_json = excluded.headers_json,
                file_path = excluded.file_path,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(request.key())
        .bind(record.response.status.map(i64::from))
        .bind(headers_json)
        .bind(record.file_path.to_string_lossy().into_owned())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All records, most recently updated first.
    pub async fn list(&self) -> Result<Vec<RecordSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT request_key, status, headers_json, file_path, updated_at
            FROM downloads
            ORDER BY updated_at DESC, request_key ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let record = decode(&row)?;
            let request_key: String = row.get("request_key");
            let updated_at: i64 = row.get("updated_at");
            out.push(RecordSummary {
                request_key,
                status: record.response.status,
                etag: record.response.etag().map(String::from),
                file_len: storage::file_len(&record.file_path).ok(),
                file_path: record.file_path,
                updated_at,
            });
        }
        Ok(out)
    }

    /// Delete the record for `request_key` and its resume file.
    /// Returns false if there was no such record.
    pub async fn remove(&self, request_key: &str) -> Result<bool, StoreError> {
        let Some(record) = self.get(request_key).await? else {
            return Ok(false);
        };
        sqlx::query("DELETE FROM downloads WHERE request_key = ?1")
            .bind(request_key)
            .execute(&self.pool)
            .await?;
        storage::remove_if_exists(&record.file_path).map_err(|source| StoreError::Io {
            path: record.file_path.clone(),
            source,
        })?;
        tracing::debug!(request_key, path = %record.file_path.display(), "removed resume record");
        Ok(true)
    }
}
