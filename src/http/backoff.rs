//! Retry delay policy.
//!
//! Priority: `Retry-After` seconds, then the platform's rate-limit reset
//! header, then a linear fallback. Header-derived waits are clamped to
//! `MAX_HEADER_WAIT`.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};

/// Longest wait honored from a response header.
pub const MAX_HEADER_WAIT: Duration = Duration::from_secs(60);
/// Fallback delay per attempt when no header says otherwise.
pub const BASE_DELAY: Duration = Duration::from_millis(1_500);
/// Reset header values beyond this many seconds are ignored.
const MAX_RESET_VALUE: f64 = 1e12;

/// How a platform reports rate-limit state in response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetStyle {
    /// `x-rate-limit-*`; reset is an absolute epoch second
    Epoch,
    /// `x-ratelimit-*`; reset is seconds from now
    Delta,
}

impl ResetStyle {
    pub fn remaining_header(&self) -> &'static str {
        match self {
            ResetStyle::Epoch => "x-rate-limit-remaining",
            ResetStyle::Delta => "x-ratelimit-remaining",
        }
    }

    pub fn reset_header(&self) -> &'static str {
        match self {
            ResetStyle::Epoch => "x-rate-limit-reset",
            ResetStyle::Delta => "x-ratelimit-reset",
        }
    }

    /// Seconds until the window resets, if the header is present and sane.
    pub fn seconds_until_reset(&self, headers: &HeaderMap, now_epoch_secs: i64) -> Option<i64> {
        let value = header_f64(headers, self.reset_header())?.ceil();
        if !value.is_finite() || value.abs() > MAX_RESET_VALUE {
            return None;
        }
        let value = value as i64;
        match self {
            ResetStyle::Epoch => value.checked_sub(now_epoch_secs),
            ResetStyle::Delta => Some(value),
        }
    }
}

/// Parse a numeric header. Some platforms send floats such as `"599.0"`.
pub fn header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
    headers.get(name)?.to_str().ok()?.trim().parse::<f64>().ok()
}

/// 429 and 5xx are retried; other failures are not.
pub fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Delay before retry number `attempt` (1-based).
pub fn retry_delay(headers: &HeaderMap, style: ResetStyle, attempt: u32, now_epoch_secs: i64) -> Duration {
    if let Some(secs) = header_f64(headers, RETRY_AFTER.as_str())
        && secs >= 0.0
    {
        return Duration::from_secs_f64(secs.min(MAX_HEADER_WAIT.as_secs_f64()));
    }

    if let Some(secs) = style.seconds_until_reset(headers, now_epoch_secs)
        && secs > 0
    {
        return Duration::from_secs(secs as u64).min(MAX_HEADER_WAIT);
    }

    BASE_DELAY * attempt.max(1)
}
