//! Time utilities.
//!
//! Call record timestamps are Unix epoch milliseconds everywhere in this
//! crate, matching what the calling layer and sync messages carry.

/// Returns the current Unix timestamp in milliseconds.
pub fn now_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Returns true if `timestamp` is older than `retention_ms` relative to `now`.
pub fn is_expired(timestamp: i64, retention_ms: i64, now: i64) -> bool {
    timestamp.saturating_add(retention_ms) <= now
}
