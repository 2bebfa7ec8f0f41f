//! `updl fetch <url>` – run download operations until the file is complete.

use anyhow::{anyhow, bail, Context, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use updl_core::checksum;
use updl_core::config::UpdlConfig;
use updl_core::operation::{DownloadOperation, DownloadedFile, OperationConfig, OperationState};
use updl_core::request::DownloadRequest;
use updl_core::resume_db::ResumeDb;
use updl_core::resume_store::{ResumeStore, SqliteResumeStore};
use updl_core::retry::{self, ErrorKind, RetryPolicy};
use updl_core::DownloadError;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Why one attempt did not produce a usable file.
#[derive(Debug)]
enum FetchFailure {
    Download(DownloadError),
    /// The operation completed but the server answered with this status.
    Status(u32),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Download(e) => write!(f, "{}", e),
            FetchFailure::Status(416) => write!(
                f,
                "HTTP 416: server rejected the resume range; resume state discarded, fetch again"
            ),
            FetchFailure::Status(code) => write!(f, "HTTP {}", code),
        }
    }
}

impl std::error::Error for FetchFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchFailure::Download(e) => Some(e),
            FetchFailure::Status(_) => None,
        }
    }
}

fn classify(f: &FetchFailure) -> ErrorKind {
    match f {
        FetchFailure::Download(e) => retry::classify(e),
        FetchFailure::Status(code) => retry::classify_http_status(*code),
    }
}

/// Accept 2xx and non-HTTP (e.g. file://) responses.
fn check_status(file: DownloadedFile) -> Result<DownloadedFile, FetchFailure> {
    match file.response.status {
        None => Ok(file),
        Some(code) if (200..300).contains(&code) => Ok(file),
        Some(code) => Err(FetchFailure::Status(code)),
    }
}

/// Operation currently in flight, so Ctrl-C can cancel it.
#[derive(Default)]
struct Inflight {
    interrupted: AtomicBool,
    current: Mutex<Option<Arc<DownloadOperation>>>,
}

impl Inflight {
    fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        if let Ok(slot) = self.current.lock() {
            if let Some(op) = slot.as_ref() {
                op.cancel();
            }
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}

fn print_progress(bytes: u64, started: Instant) {
    let secs = started.elapsed().as_secs_f64();
    let rate = if secs > 0.0 { bytes as f64 / secs } else { 0.0 };
    eprint!(
        "\r  {:.2} MiB  {:.2} MiB/s  ",
        bytes as f64 / 1_048_576.0,
        rate / 1_048_576.0
    );
}

/// One operation: start, poll for progress, collect the result.
fn attempt(
    request: &DownloadRequest,
    store: &Arc<dyn ResumeStore>,
    op_cfg: &OperationConfig,
    inflight: &Inflight,
    attempt_no: u32,
) -> Result<DownloadedFile, FetchFailure> {
    if inflight.interrupted() {
        return Err(FetchFailure::Download(DownloadError::Cancelled));
    }
    let op = Arc::new(DownloadOperation::new(
        request.clone(),
        Arc::clone(store),
        op_cfg.clone(),
    ));
    if let Ok(mut slot) = inflight.current.lock() {
        *slot = Some(Arc::clone(&op));
    }
    // Ctrl-C may have landed between the check above and registration.
    if inflight.interrupted() {
        op.cancel();
    }
    if attempt_no > 1 {
        tracing::info!(attempt = attempt_no, "retrying {}", request.url());
    }
    op.start().map_err(FetchFailure::Download)?;

    let started = Instant::now();
    let mut last_print = started;
    while op.state() != OperationState::Finished {
        std::thread::sleep(POLL_INTERVAL);
        if last_print.elapsed() >= PROGRESS_INTERVAL {
            print_progress(op.bytes_received(), started);
            last_print = Instant::now();
        }
    }
    print_progress(op.bytes_received(), started);
    eprintln!();

    // Unregister so this is the last handle, then take the result by value.
    if let Ok(mut slot) = inflight.current.lock() {
        slot.take();
    }
    let Some(op) = Arc::into_inner(op) else {
        return Err(FetchFailure::Download(DownloadError::Cancelled));
    };
    let outcome = op
        .into_result()
        .map_err(FetchFailure::Download)
        .and_then(check_status);
    if let Err(FetchFailure::Status(code)) = &outcome {
        // The error body is now in the resume file: never resume from it.
        tracing::warn!(status = code, "discarding resume state after error response");
        store
            .remove(request)
            .map_err(|e| FetchFailure::Download(DownloadError::Store(e)))?;
    }
    outcome
}

/// Run attempts under `policy` until one yields a 2xx (or non-HTTP) file.
fn fetch_with_retry(
    request: &DownloadRequest,
    store: &Arc<dyn ResumeStore>,
    op_cfg: &OperationConfig,
    policy: &RetryPolicy,
    inflight: &Inflight,
) -> Result<DownloadedFile, FetchFailure> {
    retry::run_with_retry(policy, classify, |n| {
        attempt(request, store, op_cfg, inflight, n)
    })
}

pub async fn run_fetch(
    db: &ResumeDb,
    cfg: &UpdlConfig,
    request: DownloadRequest,
    retries: Option<u32>,
    expected_sha256: Option<String>,
) -> Result<()> {
    let downloads_dir = cfg.resolve_downloads_dir()?;
    let store: Arc<dyn ResumeStore> = Arc::new(SqliteResumeStore::new(
        db.clone(),
        &downloads_dir,
        Handle::current(),
    ));
    let mut policy = cfg
        .retry
        .as_ref()
        .map(RetryPolicy::from_config)
        .unwrap_or_default();
    if let Some(n) = retries {
        policy.max_attempts = n.saturating_add(1);
    }
    let op_cfg = OperationConfig::from_config(cfg);

    let inflight = Arc::new(Inflight::default());
    let on_signal = Arc::clone(&inflight);
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling download");
            on_signal.interrupt();
        }
    });

    tracing::info!(key = %request.key(), dir = %downloads_dir.display(), "fetch");
    let blocking_inflight = Arc::clone(&inflight);
    let key = request.key();
    let outcome = tokio::task::spawn_blocking(move || {
        fetch_with_retry(&request, &store, &op_cfg, &policy, &blocking_inflight)
    })
    .await
    .context("download task")?;
    signal_task.abort();

    let file = match outcome {
        Ok(file) => file,
        Err(FetchFailure::Download(DownloadError::Cancelled)) if inflight.interrupted() => {
            return Err(anyhow!("interrupted; run the same fetch again to resume"));
        }
        Err(e) => return Err(anyhow::Error::new(e).context("download failed")),
    };

    let path = file.file_path.clone();
    match expected_sha256 {
        Some(expected) => {
            let matches = tokio::task::spawn_blocking({
                let expected = expected.clone();
                move || checksum::verify_sha256(&path, &expected)
            })
            .await??;
            if !matches {
                db.remove(&key).await?;
                bail!(
                    "sha256 mismatch for {} (expected {}); resume state discarded",
                    file.file_path.display(),
                    expected
                );
            }
            println!("{}", file.file_path.display());
            println!("sha256 {} OK", expected.trim().to_ascii_lowercase());
        }
        None => {
            let digest =
                tokio::task::spawn_blocking(move || checksum::sha256_path(&path)).await??;
            println!("{}", file.file_path.display());
            println!("sha256 {}", digest);
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../../../updl-core/tests/common/range_server.rs"]
mod range_server;

#[cfg(test)]
mod tests {
    use super::range_server::RangeServer;
    use super::*;
    use std::path::PathBuf;
    use updl_core::resume_store::MemoryResumeStore;
    use updl_core::response::ResponseHead;

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn file(status_line: Option<&str>) -> DownloadedFile {
        let lines: Vec<&str> = status_line.into_iter().collect();
        DownloadedFile {
            file_path: PathBuf::from("/tmp/x.part"),
            response: ResponseHead::parse(&lines),
        }
    }

    #[test]
    fn success_statuses_are_accepted() {
        assert!(check_status(file(Some("HTTP/1.1 200 OK"))).is_ok());
        assert!(check_status(file(Some("HTTP/1.1 206 Partial Content"))).is_ok());
        assert!(check_status(file(None)).is_ok());
    }

    #[test]
    fn error_statuses_are_failures() {
        let err = check_status(file(Some("HTTP/1.1 503 Service Unavailable"))).unwrap_err();
        assert!(matches!(err, FetchFailure::Status(503)));
        assert_eq!(classify(&err), ErrorKind::Throttled);
        let err = check_status(file(Some("HTTP/1.1 416 Range Not Satisfiable"))).unwrap_err();
        assert_eq!(classify(&err), ErrorKind::Other);
        assert!(err.to_string().contains("resume state discarded"));
    }

    #[test]
    fn cancellation_is_not_retried() {
        let f = FetchFailure::Download(DownloadError::Cancelled);
        assert_eq!(classify(&f), ErrorKind::Other);
    }

    #[test]
    fn interrupt_cancels_registered_operation() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ResumeStore> =
            Arc::new(updl_core::resume_store::MemoryResumeStore::new(dir.path()));
        let op = Arc::new(DownloadOperation::new(
            DownloadRequest::parse("http://127.0.0.1:9/").unwrap(),
            store,
            OperationConfig::default(),
        ));
        let inflight = Inflight::default();
        *inflight.current.lock().unwrap() = Some(Arc::clone(&op));
        inflight.interrupt();
        assert!(inflight.interrupted());
        assert!(op.is_cancelled());
    }

    /// Leave `n` bytes of a stalled 200 response in the resume file.
    fn leave_partial(req: &DownloadRequest, store: &Arc<dyn ResumeStore>, n: u64) {
        let op = DownloadOperation::new(req.clone(), Arc::clone(store), OperationConfig::default());
        op.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(10);
        while op.bytes_received() < n {
            assert!(Instant::now() < deadline, "server never sent the first bytes");
            std::thread::sleep(Duration::from_millis(10));
        }
        op.cancel();
        assert!(op.wait().unwrap_err().is_cancelled());
    }

    #[test]
    fn transient_server_error_restarts_instead_of_splicing() {
        let server = RangeServer::start("HELLOWORLD", Some("\"v1\""));
        server.set_stall_after(Some(5));
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(MemoryResumeStore::new(dir.path()));
        let store: Arc<dyn ResumeStore> = memory.clone();
        let req = DownloadRequest::parse(&server.url("/file")).unwrap();
        leave_partial(&req, &store, 5);

        server.set_stall_after(None);
        server.fail_next(1, 503);
        let file = fetch_with_retry(
            &req,
            &store,
            &OperationConfig::default(),
            &quick_policy(3),
            &Inflight::default(),
        )
        .unwrap();

        let seen = server.requests();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[1].range.as_deref(), Some("bytes=5-"));
        assert!(seen[2].range.is_none(), "retry after an error body must not resume");
        assert_eq!(file.response.status, Some(200));
        assert_eq!(std::fs::read(&file.file_path).unwrap(), b"HELLOWORLD");
        assert_eq!(memory.get(&req).unwrap().response.etag(), Some("\"v1\""));
    }

    #[test]
    fn client_error_is_final_and_leaves_no_state() {
        let server = RangeServer::start("HELLO", Some("\"v1\""));
        server.set_fixed_status(Some(404));
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(MemoryResumeStore::new(dir.path()));
        let store: Arc<dyn ResumeStore> = memory.clone();
        let req = DownloadRequest::parse(&server.url("/missing")).unwrap();

        let err = fetch_with_retry(
            &req,
            &store,
            &OperationConfig::default(),
            &quick_policy(3),
            &Inflight::default(),
        )
        .unwrap_err();
        assert!(matches!(err, FetchFailure::Status(404)));
        assert_eq!(server.requests().len(), 1);
        assert!(memory.get(&req).is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn refetch_of_complete_file_recovers_after_416() {
        let server = RangeServer::start("HELLO", Some("\"v1\""));
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ResumeStore> = Arc::new(MemoryResumeStore::new(dir.path()));
        let req = DownloadRequest::parse(&server.url("/file")).unwrap();
        let run = || {
            fetch_with_retry(
                &req,
                &store,
                &OperationConfig::default(),
                &quick_policy(3),
                &Inflight::default(),
            )
        };

        run().unwrap();
        let err = run().unwrap_err();
        assert!(matches!(err, FetchFailure::Status(416)));
        assert_eq!(server.last_request().range.as_deref(), Some("bytes=5-"));

        let file = run().unwrap();
        assert!(server.last_request().range.is_none());
        assert_eq!(std::fs::read(&file.file_path).unwrap(), b"HELLO");
    }
}
