//! Error types for the reminders crate.
//!
//! Each module owns its specific error ([`ParseError`] for timestamps,
//! [`DeliveryError`] for notifiers). [`ReminderError`] wraps them for
//! callers that cross module boundaries, such as [`TaskSource`]
//! implementations.
//!
//! [`TaskSource`]: crate::ingest::TaskSource

use thiserror::Error;

use crate::notify::DeliveryError;
use crate::time::ParseError;

/// Errors surfaced by the reminders crate.
#[derive(Error, Debug)]
pub enum ReminderError {
    /// A reminder timestamp could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// A notifier could not be built or failed to deliver.
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// The task source could not be read.
    #[error("task source error: {0}")]
    Source(String),
}

/// Result type alias for reminder operations.
pub type Result<T> = std::result::Result<T, ReminderError>;
