//! Retry with exponential backoff for per-key computation

use std::time::Duration;

use latmetrics_core::is_shutdown_requested;

use crate::error::KeyError;

/// Exponential backoff: 100ms × 2^attempt (200ms, 400ms, 800ms, ...)
pub const fn backoff_duration(attempt: u32) -> Duration {
    Duration::from_millis(100 * 2u64.pow(attempt))
}

/// Retry a fallible key computation with exponential backoff.
///
/// Only retryable errors are retried, at most `max_retries` times, and never
/// once shutdown has been requested.
///
/// Returns `Ok(T)` on first success, or the final `Err` on exhaustion / non-retryable error.
pub fn retry_with_backoff<T>(
    label: &str,
    max_retries: u32,
    mut attempt_fn: impl FnMut() -> Result<T, KeyError>,
) -> Result<T, KeyError> {
    let mut attempt = 0u32;
    loop {
        match attempt_fn() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_retries && e.is_retryable() && !is_shutdown_requested() => {
                attempt += 1;
                log::debug!("{label}: attempt {attempt}/{max_retries} failed: {e}, retrying...");
                std::thread::sleep(backoff_duration(attempt));
            }
            Err(e) => {
                log::error!("{label}: failed permanently: {e}");
                return Err(e);
            }
        }
    }
}
