//! Retry and backoff policy.
//!
//! A download operation never retries internally. Callers that want retries
//! re-run whole operations through `run_with_retry`; because each new operation
//! resumes from the bytes already on disk, a retry only fetches what is missing.

mod classify;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
