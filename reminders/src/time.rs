//! Timestamp parsing and clocks.
//!
//! Every instant the engine handles is normalized to `DateTime<Utc>` so that
//! reminders from different sources share one comparable timeline.
//!
//! # Accepted formats
//!
//! | Input | Interpretation |
//! |-------|----------------|
//! | `2026-01-15T10:00:00Z` | RFC 3339, UTC |
//! | `2026-01-15T12:00:00+02:00` | RFC 3339 with offset, converted to UTC |
//! | `2026-01-15T12:00:00+0200` | offset without colon |
//! | `2026-01-15T10:00:00.250` | naive, assumed UTC |
//! | `2026-01-15 10:00` | naive with space separator, seconds optional |
//! | `2026-01-15` | midnight UTC |
//!
//! # Example
//!
//! ```
//! use todolist_reminders::time::parse_instant;
//!
//! let instant = parse_instant("2026-01-15T12:00:00+02:00").unwrap();
//! assert_eq!(instant.to_rfc3339(), "2026-01-15T10:00:00+00:00");
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;

/// Naive date-time layouts tried after RFC 3339 and explicit offsets fail.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Layouts carrying an explicit offset that RFC 3339 parsing rejects.
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// A reminder timestamp could not be interpreted as an absolute instant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The timestamp was empty or whitespace only.
    #[error("reminder timestamp is empty")]
    Empty,

    /// The timestamp did not match any accepted layout.
    #[error("invalid reminder timestamp '{0}'")]
    Invalid(String),
}

/// Parses an ISO-8601-like timestamp into a UTC instant.
///
/// Naive timestamps (no `Z`, no offset) are taken to be UTC.
///
/// # Errors
///
/// Returns [`ParseError::Empty`] for blank input and [`ParseError::Invalid`]
/// when no accepted layout matches.
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>, ParseError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(trimmed, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    Err(ParseError::Invalid(trimmed.to_string()))
}

/// Source of the current wall-clock instant.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying instant, so a test can keep one handle
/// and give another to the engine.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Creates a clock frozen at the current system time.
    #[must_use]
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: ChronoDuration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    /// Jumps the clock to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
