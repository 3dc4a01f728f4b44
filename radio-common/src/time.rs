//! Timestamp and media-time utilities
//!
//! Media positions travel through the engine as integer milliseconds and are
//! converted to fractional seconds only for envelope math.

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert a media position in milliseconds to fractional seconds
pub fn millis_to_seconds(millis: u64) -> f64 {
    millis as f64 / 1000.0
}
