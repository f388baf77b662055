//! Time utilities for rate freshness bookkeeping.

use chrono::{DateTime, Duration, Utc};

/// A wall-clock timestamp (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// How long ago `timestamp` was, clamped at zero for timestamps in the future.
pub fn age(timestamp: Timestamp) -> Duration {
    let age = now() - timestamp;
    if age < Duration::zero() {
        Duration::zero()
    } else {
        age
    }
}

/// Human-readable age, e.g. `12s ago`, `3m ago`, or the time of day once it
/// is more than an hour old.
pub fn describe_age(timestamp: Timestamp) -> String {
    let seconds = age(timestamp).num_seconds();
    if seconds < 60 {
        format!("{}s ago", seconds)
    } else if seconds < 3600 {
        format!("{}m ago", seconds / 60)
    } else {
        timestamp.format("%H:%M:%S UTC").to_string()
    }
}
