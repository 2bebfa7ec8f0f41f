//! `updl status` – list stored resume records.

use anyhow::Result;
use updl_core::resume_db::ResumeDb;

pub async fn run_status(db: &ResumeDb) -> Result<()> {
    let records = db.list().await?;
    if records.is_empty() {
        println!("No resume records.");
        return Ok(());
    }
    println!("{:<6} {:<12} {:<24} {}", "STATUS", "BYTES", "ETAG", "REQUEST");
    for r in records {
        let status = r
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let bytes = r
            .file_len
            .map(|n| n.to_string())
            .unwrap_or_else(|| "missing".to_string());
        println!(
            "{:<6} {:<12} {:<24} {}",
            status,
            bytes,
            r.etag.as_deref().unwrap_or("-"),
            r.request_key
        );
    }
    Ok(())
}
