//! Time and key helpers for Scoutr
//!
//! Usage counters and queue days are keyed by UTC calendar day; the adaptive
//! selector buckets wall-clock time by hour.

use chrono::{DateTime, TimeZone, Utc};

const MS_PER_DAY: i64 = 86_400_000;
const MS_PER_HOUR: i64 = 3_600_000;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// UTC calendar day key (`YYYY-MM-DD`) for a millisecond timestamp.
pub fn day_key(ts_ms: i64) -> String {
    to_datetime(ts_ms).format("%Y-%m-%d").to_string()
}

/// Number of whole hours since the epoch.
pub fn hour_bucket(ts_ms: i64) -> i64 {
    ts_ms.div_euclid(MS_PER_HOUR)
}

/// Timestamp `days` days before `ts_ms`.
pub fn days_before(ts_ms: i64, days: u32) -> i64 {
    ts_ms - i64::from(days) * MS_PER_DAY
}

/// Stable 64-bit seed derived from a day key, used for the daily queue.
pub fn day_seed(day: &str) -> u64 {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(day.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

fn to_datetime(ts_ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ts_ms).single().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2026-03-01T12:30:00Z
    const TS: i64 = 1_772_368_200_000;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        // After 2024-01-01
        assert!(ts > 1_704_067_200_000);
    }

    #[test]
    fn test_day_key_is_utc() {
        assert_eq!(day_key(TS), "2026-03-01");
        assert_eq!(day_key(0), "1970-01-01");
    }

    #[test]
    fn test_day_key_rolls_at_midnight() {
        let midnight = 1_772_409_600_000; // 2026-03-02T00:00:00Z
        assert_eq!(day_key(midnight - 1), "2026-03-01");
        assert_eq!(day_key(midnight), "2026-03-02");
    }

    #[test]
    fn test_hour_bucket() {
        assert_eq!(hour_bucket(0), 0);
        assert_eq!(hour_bucket(MS_PER_HOUR - 1), 0);
        assert_eq!(hour_bucket(MS_PER_HOUR), 1);
    }

    #[test]
    fn test_days_before() {
        assert_eq!(days_before(TS, 1), TS - MS_PER_DAY);
        assert_eq!(days_before(TS, 0), TS);
    }

    #[test]
    fn test_day_seed_is_stable_per_day() {
        assert_eq!(day_seed("2026-03-01"), day_seed("2026-03-01"));
        assert_ne!(day_seed("2026-03-01"), day_seed("2026-03-02"));
    }
}
