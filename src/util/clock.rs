//! Millisecond clock helpers for queue-internal timestamps.
//!
//! Ledger state uses `chrono::DateTime<Utc>` because it is persisted; the
//! queue only needs cheap monotonic-enough stamps for logging and ordering.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
