//! Map download failures and HTTP statuses onto retry kinds.

use super::policy::ErrorKind;
use crate::error::DownloadError;

/// Retry kind for an HTTP status the operation passed through.
pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code as u16),
        _ => ErrorKind::Other,
    }
}

pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        return ErrorKind::Connection;
    }
    ErrorKind::Other
}

/// Only network failures are worth another attempt; everything else is local
/// or deliberate.
pub fn classify(e: &DownloadError) -> ErrorKind {
    match e {
        DownloadError::Network(ce) => classify_curl_error(ce),
        DownloadError::Lookup(_)
        | DownloadError::FileIo { .. }
        | DownloadError::Store(_)
        | DownloadError::Cancelled
        | DownloadError::AlreadyStarted => ErrorKind::Other,
    }
}
