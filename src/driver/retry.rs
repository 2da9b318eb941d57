//! Bounded retries for driver calls.
//!
//! - Multi-attempt with exponential backoff for transport failures
//! - Failure classification (transient vs. fatal)
//! - Presence polling with a fixed interval

use log::warn;
use std::thread::sleep;
use std::time::{Duration, Instant};

use crate::error::DriverError;

// =====================================================
// RETRY CONFIGURATION
// =====================================================

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

// =====================================================
// ERROR CLASSIFICATION
// =====================================================

#[derive(Debug, Clone, PartialEq)]
pub enum FailureKind {
    /// Connection reset, timeout or 5xx from the automation server.
    Transient,
    /// Element missing; the caller decides whether that is recoverable.
    Interaction,
    /// Session gone or malformed response.
    Fatal,
}

pub fn classify(error: &DriverError) -> FailureKind {
    match error {
        DriverError::ClickFailure { .. } => FailureKind::Interaction,
        DriverError::Http(e) => {
            if e.is_timeout() || e.is_connect() {
                FailureKind::Transient
            } else if e.status().map(|s| s.is_server_error()).unwrap_or(false) {
                FailureKind::Transient
            } else {
                FailureKind::Fatal
            }
        }
        DriverError::Session(_) | DriverError::Protocol(_) => FailureKind::Fatal,
    }
}

pub fn is_retryable(kind: &FailureKind) -> bool {
    match kind {
        FailureKind::Transient => true,
        FailureKind::Interaction => false,
        FailureKind::Fatal => false,
    }
}

/// Calculate delay based on attempt number
pub fn calculate_delay(config: &RetryConfig, attempt: usize) -> Duration {
    let delay = config.base_delay_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let clamped = delay.min(config.max_delay_ms as f64) as u64;
    Duration::from_millis(clamped)
}

// =====================================================
// RETRY EXECUTOR
// =====================================================

/// Run `operation` until it succeeds, fails with a non-transient error or the
/// attempts run out.
pub fn with_retry<T, F>(config: &RetryConfig, operation_name: &str, mut operation: F) -> Result<T, DriverError>
where
    F: FnMut() -> Result<T, DriverError>,
{
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) => {
                let kind = classify(&e);
                if !is_retryable(&kind) || attempt + 1 >= config.max_attempts {
                    return Err(e);
                }
                let delay = calculate_delay(config, attempt);
                warn!(
                    "[Retry] {} failed (attempt {}/{}): {}. Waiting {}ms",
                    operation_name,
                    attempt + 1,
                    config.max_attempts,
                    e,
                    delay.as_millis()
                );
                sleep(delay);
                attempt += 1;
            }
        }
    }
}

/// Poll `check` every `interval` until it returns true or `timeout` elapses.
/// `check` always runs at least once.
pub fn poll_until<F>(timeout: Duration, interval: Duration, mut check: F) -> Result<bool, DriverError>
where
    F: FnMut() -> Result<bool, DriverError>,
{
    let start = Instant::now();
    loop {
        if check()? {
            return Ok(true);
        }
        if start.elapsed() + interval > timeout {
            return Ok(false);
        }
        sleep(interval);
    }
}

// =====================================================
// TESTS
// =====================================================
