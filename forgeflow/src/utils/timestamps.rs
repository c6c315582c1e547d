//! Timestamp utilities.
//!
//! Build reports and events carry RFC 3339 timestamps so recipes and run
//! records serialize identically across platforms.

use chrono::{DateTime, Utc};

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time as an ISO 8601 formatted string.
///
/// Format: `YYYY-MM-DDTHH:MM:SS.ffffff+00:00`
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Converts an elapsed duration to fractional milliseconds.
#[must_use]
pub fn duration_ms(elapsed: std::time::Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}
