//! The serial worker: runs the download sequence and handles queue events.

use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::Arc;

use super::{CompletionResult, DownloadedFile, Event, OperationConfig, Shared};
use crate::conditional;
use crate::error::DownloadError;
use crate::request::DownloadRequest;
use crate::response::ResponseHead;
use crate::resume_store::{ResumableDownload, ResumeStore};
use crate::storage;
use crate::transport::{CurlStream, StreamEvent};

/// Publishes a result even if the worker unwinds, so waiters never hang.
struct FinishGuard(Arc<Shared>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.finish_if_unset();
    }
}

pub(super) struct Worker {
    request: DownloadRequest,
    store: Arc<dyn ResumeStore>,
    config: OperationConfig,
    shared: Arc<Shared>,
    tx: SyncSender<Event>,
}

impl Worker {
    pub(super) fn new(
        request: DownloadRequest,
        store: Arc<dyn ResumeStore>,
        config: OperationConfig,
        shared: Arc<Shared>,
        tx: SyncSender<Event>,
    ) -> Self {
        Self {
            request,
            store,
            config,
            shared,
            tx,
        }
    }

    pub(super) fn run(self, rx: Receiver<Event>) {
        let _guard = FinishGuard(Arc::clone(&self.shared));
        let key = self.request.key();
        let result = self.execute(rx);
        match &result {
            Ok(file) => tracing::info!(
                key = %key,
                status = ?file.response.status,
                bytes = self.shared.bytes_received(),
                path = %file.file_path.display(),
                "download finished"
            ),
            Err(DownloadError::Cancelled) => tracing::info!(key = %key, "download cancelled"),
            Err(e) => tracing::warn!(key = %key, error = %e, "download failed"),
        }
        self.shared.finish(result);
    }

    fn execute(&self, rx: Receiver<Event>) -> CompletionResult {
        let record = self.store.lookup(&self.request).map_err(DownloadError::Lookup)?;
        tracing::debug!(
            path = %record.file_path.display(),
            stored_status = ?record.response.status,
            "resume record loaded"
        );

        let outgoing = conditional::build_request(&self.request, &record);

        if self.shared.cancel_requested() {
            return Err(DownloadError::Cancelled);
        }

        let tx = self.tx.clone();
        let stream = CurlStream::open(&outgoing, &self.config.transport, move |ev| {
            tx.send(Event::Stream(ev)).is_ok()
        })?;

        let result = self.pump(&rx, record);
        // Close the queue before joining the transport thread, which may be
        // blocked on a full queue.
        drop(rx);
        drop(stream);
        result
    }

    fn pump(&self, rx: &Receiver<Event>, mut record: ResumableDownload) -> CompletionResult {
        loop {
            let Ok(event) = rx.recv() else {
                return Err(DownloadError::Cancelled);
            };
            if self.shared.cancel_requested() {
                tracing::debug!("cancel observed, stopping stream");
                return Err(DownloadError::Cancelled);
            }
            match event {
                Event::Cancel => return Err(DownloadError::Cancelled),
                Event::Stream(StreamEvent::Response(head)) => {
                    record = self.on_response(&record, head)?;
                }
                Event::Stream(StreamEvent::Data(chunk)) => {
                    storage::append_chunk(&record.file_path, &chunk, self.config.sync_each_chunk)
                        .map_err(|source| DownloadError::FileIo {
                            path: record.file_path.clone(),
                            source,
                        })?;
                    self.shared.add_bytes(chunk.len());
                }
                Event::Stream(StreamEvent::Finished) => {
                    return Ok(DownloadedFile {
                        file_path: record.file_path,
                        response: record.response,
                    });
                }
                Event::Stream(StreamEvent::Failed(e)) => return Err(DownloadError::Network(e)),
            }
        }
    }

    /// Decide restart or resume for a new response and return the record the
    /// rest of the stream is written against.
    fn on_response(
        &self,
        current: &ResumableDownload,
        head: ResponseHead,
    ) -> Result<ResumableDownload, DownloadError> {
        let updated = current.with_response(head);
        tracing::debug!(
            status = ?updated.response.status,
            content_length = ?updated.response.content_length(),
            "response received"
        );
        match updated.response.status {
            None => {
                tracing::debug!("response is not HTTP, restarting local file");
                self.truncate(&updated)?;
            }
            Some(200) => {
                tracing::debug!(etag = ?updated.response.etag(), "200 OK, restarting local file");
                self.truncate(&updated)?;
                self.persist(&updated)?;
            }
            Some(206) => {
                tracing::debug!(etag = ?updated.response.etag(), "206 Partial Content, resuming");
                self.persist(&updated)?;
            }
            Some(status) => {
                tracing::debug!(status, "passing response through unchanged");
            }
        }
        Ok(updated)
    }

    /// Delete the local file and leave an empty one in its place.
    fn truncate(&self, record: &ResumableDownload) -> Result<(), DownloadError> {
        let path = &record.file_path;
        storage::remove_if_exists(path)
            .and_then(|()| storage::ensure_file(path).map(drop))
            .map_err(|source| DownloadError::FileIo {
                path: path.clone(),
                source,
            })
    }

    fn persist(&self, record: &ResumableDownload) -> Result<(), DownloadError> {
        self.store
            .store(record, &self.request)
            .map_err(DownloadError::Store)
    }
}
