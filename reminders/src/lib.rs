//! todolist reminders - in-memory, future-only reminder scheduling.
//!
//! This crate turns reminder timestamps attached to tasks into desktop
//! notifications delivered at the right time, exactly once per
//! `(task, timestamp)` pair for the lifetime of the process.
//!
//! # Overview
//!
//! Tasks are ingested through [`ingest`], [`bootstrap`] at startup and
//! [`resync`] after an edit. The [`ReminderEngine`] keeps the future
//! reminders in due order and a background loop, owned by
//! [`ReminderService`], hands each one to a [`Notifier`] when it falls due. Nothing is persisted; the queue is rebuilt
//! from task data on every start.
//!
//! # Modules
//!
//! - [`time`]: Timestamp parsing and clocks
//! - [`engine`]: The ordered queue, dedup set and delivery loop
//! - [`ingest`]: Task-to-engine adapter and startup bootstrap
//! - [`notify`]: Delivery sinks (desktop, log)
//! - [`service`]: Start/stop of the background loop
//! - [`error`]: Error types

pub mod engine;
pub mod error;
pub mod ingest;
pub mod notify;
pub mod service;
pub mod time;

pub use engine::{
    EngineConfig, Rejection, ReminderEngine, ReminderEntry, ReminderKey, DEFAULT_POLL_INTERVAL,
};
pub use error::{ReminderError, Result};
pub use ingest::{
    bootstrap, ingest, resync, IngestReport, TaskReminders, TaskSource, DEFAULT_MESSAGE,
};
pub use notify::{ready, DeliveryError, DesktopNotifier, LogNotifier, Notifier, NotifierInit};
pub use service::{ReminderService, ShutdownOutcome};
pub use time::{parse_instant, Clock, ManualClock, ParseError, SystemClock};
