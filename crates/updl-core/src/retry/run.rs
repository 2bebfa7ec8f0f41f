//! Retry loop: run a closure until success or policy says stop.

use super::policy::{ErrorKind, RetryDecision, RetryPolicy};

/// Runs `f` until it succeeds or the retry policy says to stop.
///
/// `f` receives the 1-based attempt number. `kind_of` classifies each failure;
/// on a retryable one the thread sleeps for the backoff delay, then tries again.
pub fn run_with_retry<T, E, F, K>(policy: &RetryPolicy, kind_of: K, mut f: F) -> Result<T, E>
where
    F: FnMut(u32) -> Result<T, E>,
    K: Fn(&E) -> ErrorKind,
{
    let mut attempt = 1u32;
    loop {
        match f(attempt) {
            Ok(v) => return Ok(v),
            Err(e) => match policy.decide(attempt, kind_of(&e)) {
                RetryDecision::NoRetry => return Err(e),
                RetryDecision::RetryAfter(d) => {
                    tracing::debug!(attempt, delay_ms = d.as_millis() as u64, "retrying download");
                    std::thread::sleep(d);
                    attempt += 1;
                }
            },
        }
    }
}
