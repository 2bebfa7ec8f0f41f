//! One resumable download: a small state machine driven by a serial worker.
//!
//! `start` spawns a worker thread that looks up resume state, builds a plain
//! or conditional request, opens a libcurl stream and then handles one event
//! at a time from a bounded queue. Transport events and cancellation share
//! that queue, so the worker sees them in a single total order and never
//! writes a byte after it has observed a cancel request.

mod outcome;
mod worker;

pub use outcome::{CompletionResult, DownloadedFile};

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::config::{TransportConfig, UpdlConfig};
use crate::error::DownloadError;
use crate::request::DownloadRequest;
use crate::resume_store::ResumeStore;
use crate::transport::StreamEvent;
use outcome::Completion;
use worker::Worker;

/// Lifecycle of an operation. `Finished` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Idle,
    Executing,
    Finished,
}

// Low bits of `Shared::state` hold the lifecycle; the cancel request lives in
// the same byte so that "not yet finished" and "cancel requested" change together.
const STATE_MASK: u8 = 0b011;
const CANCEL_BIT: u8 = 0b100;

impl OperationState {
    fn from_bits(v: u8) -> Self {
        match v & STATE_MASK {
            0 => OperationState::Idle,
            1 => OperationState::Executing,
            _ => OperationState::Finished,
        }
    }
}

/// Per-operation knobs, usually taken from `UpdlConfig`.
#[derive(Debug, Clone)]
pub struct OperationConfig {
    pub transport: TransportConfig,
    pub sync_each_chunk: bool,
    /// Capacity of the worker's event queue. Clamped to at least 1.
    pub event_queue_depth: usize,
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self::from_config(&UpdlConfig::default())
    }
}

impl OperationConfig {
    pub fn from_config(cfg: &UpdlConfig) -> Self {
        Self {
            transport: cfg.transport.clone(),
            sync_each_chunk: cfg.sync_each_chunk,
            event_queue_depth: cfg.event_queue_depth,
        }
    }
}

/// Message on the worker's queue.
pub(crate) enum Event {
    Stream(StreamEvent),
    Cancel,
}

/// State visible to both the caller and the worker.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    state: AtomicU8,
    bytes: AtomicU64,
    completion: Completion,
    finished: Mutex<bool>,
    finished_cv: Condvar,
}

impl Shared {
    fn state(&self) -> OperationState {
        OperationState::from_bits(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.state.load(Ordering::Acquire) & CANCEL_BIT != 0
    }

    /// Set the cancel bit unless the operation already finished.
    fn request_cancel(&self) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                (OperationState::from_bits(s) != OperationState::Finished).then_some(s | CANCEL_BIT)
            })
            .is_ok()
    }

    /// Move `Idle -> Executing`. Returns whether cancel had been requested,
    /// or `None` if the operation was not idle.
    fn claim_start(&self) -> Option<bool> {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                (OperationState::from_bits(s) == OperationState::Idle)
                    .then_some((s & CANCEL_BIT) | OperationState::Executing as u8)
            })
            .ok()
            .map(|prev| prev & CANCEL_BIT != 0)
    }

    pub(crate) fn bytes_received(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub(crate) fn add_bytes(&self, n: usize) {
        self.bytes.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Store the result, publish `Finished` and wake every waiter.
    pub(crate) fn finish(&self, result: CompletionResult) {
        if !self.completion.set(result) {
            tracing::warn!("download result already set, ignoring second completion");
        }
        let _ = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
            Some((s & CANCEL_BIT) | OperationState::Finished as u8)
        });
        if let Ok(mut done) = self.finished.lock() {
            *done = true;
        }
        self.finished_cv.notify_all();
    }

    /// Finish as `Cancelled` unless a result is already set.
    pub(crate) fn finish_if_unset(&self) {
        if !self.completion.is_set() {
            self.finish(Err(DownloadError::Cancelled));
        }
    }

    fn wait_finished(&self) {
        let Ok(mut done) = self.finished.lock() else {
            return;
        };
        while !*done {
            match self.finished_cv.wait(done) {
                Ok(guard) => done = guard,
                Err(_) => return,
            }
        }
    }
}

/// A resumable download of one request.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use updl_core::operation::{DownloadOperation, OperationConfig};
/// # use updl_core::request::DownloadRequest;
/// # use updl_core::resume_store::MemoryResumeStore;
/// let store = Arc::new(MemoryResumeStore::new("/tmp/updl"));
/// let request = DownloadRequest::parse("https://example.com/update.bin").unwrap();
/// let op = DownloadOperation::new(request, store, OperationConfig::default());
/// op.start().unwrap();
/// match op.wait() {
///     Ok(file) => println!("{} ({:?})", file.file_path.display(), file.response.status),
///     Err(e) => eprintln!("download failed: {}", e),
/// }
/// ```
pub struct DownloadOperation {
    request: DownloadRequest,
    store: Arc<dyn ResumeStore>,
    config: OperationConfig,
    shared: Arc<Shared>,
    tx: SyncSender<Event>,
    rx: Mutex<Option<Receiver<Event>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DownloadOperation {
    pub fn new(
        request: DownloadRequest,
        store: Arc<dyn ResumeStore>,
        config: OperationConfig,
    ) -> Self {
        let (tx, rx) = mpsc::sync_channel(config.event_queue_depth.max(1));
        Self {
            request,
            store,
            config,
            shared: Arc::new(Shared::default()),
            tx,
            rx: Mutex::new(Some(rx)),
            worker: Mutex::new(None),
        }
    }

    pub fn request(&self) -> &DownloadRequest {
        &self.request
    }

    /// Begin the download. Only valid once, from `Idle`.
    ///
    /// If `cancel` was already called, the operation finishes as `Cancelled`
    /// right here without touching the store, the disk or the network.
    pub fn start(&self) -> Result<(), DownloadError> {
        let Some(cancelled) = self.shared.claim_start() else {
            return Err(DownloadError::AlreadyStarted);
        };

        if cancelled {
            tracing::debug!(key = %self.request.key(), "cancelled before start");
            self.shared.finish(Err(DownloadError::Cancelled));
            return Ok(());
        }

        let rx = self.rx.lock().ok().and_then(|mut slot| slot.take());
        let Some(rx) = rx else {
            // Unreachable while the Idle -> Executing claim above is the only taker.
            self.shared.finish(Err(DownloadError::AlreadyStarted));
            return Err(DownloadError::AlreadyStarted);
        };

        let worker = Worker::new(
            self.request.clone(),
            Arc::clone(&self.store),
            self.config.clone(),
            Arc::clone(&self.shared),
            self.tx.clone(),
        );
        tracing::debug!(key = %self.request.key(), "starting download operation");
        let handle = std::thread::spawn(move || worker.run(rx));
        if let Ok(mut slot) = self.worker.lock() {
            *slot = Some(handle);
        }
        Ok(())
    }

    /// Request cancellation. Safe from any thread, never blocks, no effect once finished.
    pub fn cancel(&self) {
        if !self.shared.request_cancel() {
            return;
        }
        // A full queue is fine: the worker checks the flag before every event.
        let _ = self.tx.try_send(Event::Cancel);
    }

    /// True if `cancel` was called before the operation finished. The result
    /// can still be `Ok` when the stream completed before the worker saw it.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel_requested()
    }

    pub fn state(&self) -> OperationState {
        self.shared.state()
    }

    /// Body bytes written to the local file by this operation so far.
    pub fn bytes_received(&self) -> u64 {
        self.shared.bytes_received()
    }

    /// The completion result, or `Err(Cancelled)` while not yet finished.
    pub fn result(&self) -> Result<&DownloadedFile, &DownloadError> {
        self.shared.completion.get()
    }

    /// Block until the operation finished, then return `result()`.
    /// Any number of threads may wait; one of them joins the worker.
    /// Returns immediately for an operation that was never started.
    pub fn wait(&self) -> Result<&DownloadedFile, &DownloadError> {
        let handle = self.worker.lock().ok().and_then(|mut slot| slot.take());
        match handle {
            Some(handle) => {
                if handle.join().is_err() {
                    tracing::error!(key = %self.request.key(), "download worker panicked");
                    self.shared.finish_if_unset();
                }
            }
            None if self.state() == OperationState::Executing => self.shared.wait_finished(),
            None => {}
        }
        self.result()
    }

    /// `wait`, then hand over the result by value.
    pub fn into_result(mut self) -> CompletionResult {
        let _ = self.wait();
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.completion.take(),
            // Only a worker that was never joined still holds the state.
            None => Err(DownloadError::Cancelled),
        }
    }
}

impl Drop for DownloadOperation {
    fn drop(&mut self) {
        let handle = self.worker.get_mut().ok().and_then(|slot| slot.take());
        if let Some(handle) = handle {
            self.cancel();
            let _ = handle.join();
        }
    }
}
