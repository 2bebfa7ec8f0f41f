use std::time::Duration;

use crate::config::RetryConfig;

/// Why an attempt failed, as far as retrying is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connect timeout or low-speed abort.
    Timeout,
    /// Server asked us to slow down (429, 503).
    Throttled,
    /// Connection refused, reset, DNS failure and similar.
    Connection,
    /// Any other 5xx status.
    Http5xx(u16),
    /// Not worth retrying: local I/O, store failures, cancellation, 4xx.
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
}

/// Exponential backoff with a cap on both attempts and delay.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        let max_delay = Duration::from_secs(cfg.max_delay_secs);
        // Negative or NaN means no delay; values too large for a Duration cap at max_delay.
        let base_delay = if cfg.base_delay_secs > 0.0 {
            Duration::try_from_secs_f64(cfg.base_delay_secs).unwrap_or(max_delay)
        } else {
            Duration::ZERO
        };
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// A policy that never retries.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Decide what to do after attempt number `attempt` (1-based) failed with `kind`.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }
        match kind {
            ErrorKind::Other => RetryDecision::NoRetry,
            ErrorKind::Timeout
            | ErrorKind::Connection
            | ErrorKind::Throttled
            | ErrorKind::Http5xx(_) => {
                // base * 2^(attempt-1), exponent capped at 8.
                let factor = 1u32 << attempt.saturating_sub(1).min(8);
                let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
                RetryDecision::RetryAfter(delay)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delay(d: RetryDecision) -> Duration {
        match d {
            RetryDecision::RetryAfter(d) => d,
            RetryDecision::NoRetry => panic!("expected retry"),
        }
    }

    #[test]
    fn other_is_never_retried() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(1, ErrorKind::Other), RetryDecision::NoRetry);
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let p = RetryPolicy {
            max_attempts: 20,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(delay(p.decide(1, ErrorKind::Timeout)), Duration::from_millis(100));
        assert_eq!(delay(p.decide(2, ErrorKind::Timeout)), Duration::from_millis(200));
        assert_eq!(delay(p.decide(3, ErrorKind::Connection)), Duration::from_millis(400));
        assert_eq!(delay(p.decide(12, ErrorKind::Timeout)), Duration::from_secs(1));
    }

    #[test]
    fn stops_at_max_attempts() {
        let p = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        assert!(matches!(p.decide(2, ErrorKind::Throttled), RetryDecision::RetryAfter(_)));
        assert_eq!(p.decide(3, ErrorKind::Throttled), RetryDecision::NoRetry);
        assert_eq!(RetryPolicy::once().decide(1, ErrorKind::Timeout), RetryDecision::NoRetry);
    }

    #[test]
    fn from_config_converts_units() {
        let p = RetryPolicy::from_config(&RetryConfig {
            max_attempts: 0,
            base_delay_secs: 0.5,
            max_delay_secs: 15,
        });
        assert_eq!(p.max_attempts, 1);
        assert_eq!(p.base_delay, Duration::from_millis(500));
        assert_eq!(p.max_delay, Duration::from_secs(15));
    }

    #[test]
    fn oversized_base_delay_is_capped() {
        let p = RetryPolicy::from_config(&RetryConfig {
            max_attempts: 3,
            base_delay_secs: 1e300,
            max_delay_secs: 15,
        });
        assert_eq!(p.base_delay, Duration::from_secs(15));
        assert_eq!(
            p.decide(1, ErrorKind::Timeout),
            RetryDecision::RetryAfter(Duration::from_secs(15))
        );

        let p = RetryPolicy::from_config(&RetryConfig {
            max_attempts: 3,
            base_delay_secs: f64::INFINITY,
            max_delay_secs: 15,
        });
        assert_eq!(p.base_delay, Duration::from_secs(15));
    }
}
