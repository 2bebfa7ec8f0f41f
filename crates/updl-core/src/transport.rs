//! libcurl stream for one download operation.
//!
//! The transfer runs on its own thread and reports what it sees as
//! `StreamEvent`s through a sink supplied by the operation: the final response
//! head once (before the first body byte, or at completion for empty bodies),
//! body chunks in receipt order, then exactly one `Finished` or `Failed`.
//! Redirects and interim responses are folded by restarting header collection
//! at every status line.

use curl::easy::{Easy, List};
use std::cell::RefCell;
use std::str;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::TransportConfig;
use crate::request::DownloadRequest;
use crate::response::{parse_status_line, ResponseHead};

/// What the transport observed, in order.
#[derive(Debug)]
pub enum StreamEvent {
    Response(ResponseHead),
    Data(Vec<u8>),
    Finished,
    Failed(curl::Error),
}

/// Handle to an in-flight transfer. Aborts and joins the transfer thread on drop.
pub struct CurlStream {
    abort: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CurlStream {
    /// Start transferring `request`. `sink` receives every event and returns
    /// false once nobody is listening, which aborts the transfer.
    pub fn open<F>(
        request: &DownloadRequest,
        cfg: &TransportConfig,
        sink: F,
    ) -> Result<Self, curl::Error>
    where
        F: FnMut(StreamEvent) -> bool + Send + 'static,
    {
        let easy = configure(request, cfg)?;
        let abort = Arc::new(AtomicBool::new(false));
        let abort_cb = Arc::clone(&abort);
        let handle = std::thread::spawn(move || run_transfer(easy, abort_cb, sink));
        Ok(CurlStream {
            abort,
            handle: Some(handle),
        })
    }

    /// Ask the transfer to stop. Takes effect at the next write or progress callback.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }
}

impl Drop for CurlStream {
    fn drop(&mut self) {
        self.abort();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("transfer thread panicked");
            }
        }
    }
}

fn configure(request: &DownloadRequest, cfg: &TransportConfig) -> Result<Easy, curl::Error> {
    let mut easy = Easy::new();
    easy.url(request.url().as_str())?;
    match request.method() {
        "GET" => {}
        "HEAD" => easy.nobody(true)?,
        other => easy.custom_request(other)?,
    }
    easy.follow_location(cfg.follow_redirects)?;
    easy.max_redirections(cfg.max_redirections)?;
    easy.connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))?;
    // Abort if throughput stays below the limit for the configured window.
    easy.low_speed_limit(cfg.low_speed_limit)?;
    easy.low_speed_time(Duration::from_secs(cfg.low_speed_time_secs))?;
    if let Some(ua) = cfg.user_agent.as_deref() {
        easy.useragent(ua)?;
    }
    // Progress callbacks keep firing while the server is silent, which is where
    // a stalled transfer notices an abort request.
    easy.progress(true)?;

    let mut list = List::new();
    for (k, v) in request.headers() {
        list.append(&format!("{}: {}", k, v))?;
    }
    if !request.headers().is_empty() {
        easy.http_headers(list)?;
    }
    Ok(easy)
}

fn run_transfer<F>(mut easy: Easy, abort: Arc<AtomicBool>, sink: F)
where
    F: FnMut(StreamEvent) -> bool,
{
    let sink = RefCell::new(sink);
    let mut head_lines: Vec<String> = Vec::new();
    let mut announced = false;
    let result = perform(&mut easy, &abort, &sink, &mut head_lines, &mut announced);

    let mut sink = sink.into_inner();
    match result {
        Ok(()) => {
            if !announced {
                sink(StreamEvent::Response(ResponseHead::parse(&head_lines)));
            }
            sink(StreamEvent::Finished);
        }
        Err(e) => {
            if abort.load(Ordering::Relaxed) {
                tracing::debug!("transfer aborted: {}", e);
            }
            sink(StreamEvent::Failed(e));
        }
    }
}

fn perform<F>(
    easy: &mut Easy,
    abort: &AtomicBool,
    sink: &RefCell<F>,
    head_lines: &mut Vec<String>,
    announced: &mut bool,
) -> Result<(), curl::Error>
where
    F: FnMut(StreamEvent) -> bool,
{
    let lines = RefCell::new(head_lines);
    let mut transfer = easy.transfer();
    transfer.header_function(|data| {
        if let Ok(s) = str::from_utf8(data) {
            let line = s.trim_end();
            let mut lines = lines.borrow_mut();
            if parse_status_line(line).is_some() {
                lines.clear();
            }
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        true
    })?;
    transfer.write_function(|data| {
        if abort.load(Ordering::Relaxed) {
            return Ok(0);
        }
        let mut guard = sink.borrow_mut();
        let sink = &mut *guard;
        if !*announced {
            *announced = true;
            let head = ResponseHead::parse(lines.borrow().as_slice());
            if !sink(StreamEvent::Response(head)) {
                return Ok(0);
            }
        }
        if !sink(StreamEvent::Data(data.to_vec())) {
            return Ok(0);
        }
        Ok(data.len())
    })?;
    transfer.progress_function(|_, _, _, _| !abort.load(Ordering::Relaxed))?;
    transfer.perform()
}
