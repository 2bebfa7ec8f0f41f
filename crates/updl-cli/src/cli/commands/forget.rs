//! `updl forget <url>` – drop a resume record and its partial file.

use anyhow::Result;
use updl_core::request::DownloadRequest;
use updl_core::resume_db::ResumeDb;

pub async fn run_forget(db: &ResumeDb, request: &DownloadRequest) -> Result<()> {
    let key = request.key();
    if db.remove(&key).await? {
        println!("Forgot {key}");
    } else {
        println!("No resume record for {key}");
    }
    Ok(())
}
