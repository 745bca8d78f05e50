//! Feeds task reminders into the engine.
//!
//! Ingestion is idempotent: the engine's dedup set makes re-ingesting an
//! unchanged task a no-op, so callers can ingest on every create, every
//! update and again at startup without tracking what they already sent.
//! When a task's reminder list may have shrunk, [`resync`] also drops the
//! pending instants it no longer names.

use std::ops::AddAssign;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::{ReminderEngine, ReminderKey, Rejection};
use crate::error::Result;
use crate::time::parse_instant;

/// Message used when a task has neither an explicit message nor a
/// description.
pub const DEFAULT_MESSAGE: &str = "Reminder";

/// Outcome counts for one or more ingestion passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub scheduled: usize,
    pub invalid: usize,
    pub past_due: usize,
    pub duplicate: usize,
    /// Pending reminders dropped because their task no longer lists them.
    pub cancelled: usize,
}

impl IngestReport {
    /// Number of instants looked at. Cancellations are not counted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.scheduled + self.invalid + self.past_due + self.duplicate
    }
}

impl AddAssign for IngestReport {
    fn add_assign(&mut self, other: Self) {
        self.scheduled += other.scheduled;
        self.invalid += other.invalid;
        self.past_due += other.past_due;
        self.duplicate += other.duplicate;
        self.cancelled += other.cancelled;
    }
}

/// Schedules every reminder instant of one task.
///
/// Unparseable instants are logged and skipped, past instants are skipped,
/// and the rest go through [`ReminderEngine::schedule_instant`].
pub fn ingest<S: AsRef<str>>(
    engine: &ReminderEngine,
    task_identifier: &str,
    reminder_instants: &[S],
    title: &str,
    message: &str,
) -> IngestReport {
    let mut report = IngestReport::default();

    for raw in reminder_instants {
        let raw = raw.as_ref();
        let due = match parse_instant(raw) {
            Ok(due) => due,
            Err(err) => {
                warn!(
                    task = %task_identifier,
                    value = %raw,
                    error = %err,
                    "Skipping invalid reminder"
                );
                report.invalid += 1;
                continue;
            }
        };

        let key = ReminderKey::new(task_identifier, raw);
        match engine.schedule_instant(key, due, title, message) {
            Ok(_) => report.scheduled += 1,
            Err(Rejection::PastDue { .. }) => report.past_due += 1,
            Err(Rejection::Duplicate) => report.duplicate += 1,
            Err(Rejection::Malformed(_)) => report.invalid += 1,
        }
    }

    debug!(
        task = %task_identifier,
        scheduled = report.scheduled,
        invalid = report.invalid,
        past_due = report.past_due,
        duplicate = report.duplicate,
        "Ingested task reminders"
    );

    report
}

/// Brings the pending reminders of one task in line with its current list.
///
/// Pending instants the task still names stay queued where they are, with
/// their payload refreshed, even if they are already due and waiting to be
/// popped. Pending instants it no longer names are cancelled. New instants
/// are scheduled as by [`ingest`].
pub fn resync<S: AsRef<str>>(
    engine: &ReminderEngine,
    task_identifier: &str,
    reminder_instants: &[S],
    title: &str,
    message: &str,
) -> IngestReport {
    let cancelled = engine.retain_source(task_identifier, |token| {
        reminder_instants.iter().any(|raw| raw.as_ref() == token)
    });

    let mut kept = IngestReport::default();
    let mut fresh = Vec::with_capacity(reminder_instants.len());
    for raw in reminder_instants {
        let raw = raw.as_ref();
        let key = ReminderKey::new(task_identifier, raw);
        if engine.refresh_pending(&key, title, message) {
            kept.duplicate += 1;
        } else {
            fresh.push(raw);
        }
    }

    let mut report = ingest(engine, task_identifier, &fresh, title, message);
    report += kept;
    report.cancelled = cancelled;
    report
}

/// The reminder-relevant slice of a stored task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskReminders {
    /// Stable identifier, typically the task's path in the store.
    pub identifier: String,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Raw timestamp strings as stored.
    pub reminders: Vec<String>,
}

impl TaskReminders {
    /// Popup title: the task title, or its identifier when untitled.
    #[must_use]
    pub fn display_title(&self) -> &str {
        non_blank(self.title.as_deref()).unwrap_or(&self.identifier)
    }

    /// Popup body: the description, or [`DEFAULT_MESSAGE`].
    #[must_use]
    pub fn display_message(&self) -> &str {
        non_blank(self.description.as_deref()).unwrap_or(DEFAULT_MESSAGE)
    }

    /// Replaces this task's pending reminders with its current list. See
    /// [`resync`].
    pub fn resync_into(&self, engine: &ReminderEngine) -> IngestReport {
        resync(
            engine,
            &self.identifier,
            &self.reminders,
            self.display_title(),
            self.display_message(),
        )
    }

    /// Ingests this task's reminders.
    pub fn ingest_into(&self, engine: &ReminderEngine) -> IngestReport {
        ingest(
            engine,
            &self.identifier,
            &self.reminders,
            self.display_title(),
            self.display_message(),
        )
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Anything that can enumerate stored tasks with their reminders.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Lists every active task.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing store cannot be read.
    async fn task_reminders(&self) -> Result<Vec<TaskReminders>>;
}

/// Rebuilds the queue from a task source.
///
/// # Errors
///
/// Propagates the source's listing error; nothing is scheduled in that case.
pub async fn bootstrap(engine: &ReminderEngine, source: &dyn TaskSource) -> Result<IngestReport> {
    let tasks = source.task_reminders().await?;
    let mut report = IngestReport::default();

    for task in &tasks {
        report += task.ingest_into(engine);
    }

    info!(
        tasks = tasks.len(),
        scheduled = report.scheduled,
        invalid = report.invalid,
        past_due = report.past_due,
        duplicate = report.duplicate,
        "Reminder bootstrap complete"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::error::ReminderError;
    use crate::time::ManualClock;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn engine() -> ReminderEngine {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        ReminderEngine::with_clock(EngineConfig::default(), Arc::new(clock))
    }

    #[test]
    fn ingest_counts_every_outcome() {
        let engine = engine();
        let instants = [
            "2026-03-01T10:00:00Z",
            "2026-03-01T11:00:00Z",
            "2026-03-01T10:00:00Z",
            "2020-01-01T00:00:00Z",
            "not a date",
        ];

        let report = ingest(&engine, "tasks/a.yaml", &instants, "Title", "Body");

        assert_eq!(
            report,
            IngestReport {
                scheduled: 2,
                invalid: 1,
                past_due: 1,
                duplicate: 1,
                cancelled: 0,
            }
        );
        assert_eq!(report.total(), 5);
        assert_eq!(engine.pending_len(), 2);
    }

    #[test]
    fn ingest_is_idempotent() {
        let engine = engine();
        let instants = vec!["2026-03-01T10:00:00Z".to_string()];

        assert_eq!(ingest(&engine, "tasks/a.yaml", &instants, "t", "m").scheduled, 1);
        let second = ingest(&engine, "tasks/a.yaml", &instants, "t", "m");
        assert_eq!(second.scheduled, 0);
        assert_eq!(second.duplicate, 1);
        assert_eq!(engine.pending_len(), 1);
    }

    #[test]
    fn ingest_with_no_instants_is_empty() {
        let engine = engine();
        let report = ingest::<&str>(&engine, "tasks/a.yaml", &[], "t", "m");
        assert_eq!(report, IngestReport::default());
    }

    #[test]
    fn resync_cancels_removed_instants_and_keeps_the_rest() {
        let engine = engine();
        let before = ["2026-03-01T10:00:00Z", "2026-03-01T11:00:00Z"];
        ingest(&engine, "tasks/a.yaml", &before, "Old", "m");
        assert!(engine.schedule("tasks/b.yaml", before[0], before[0], "B", "m"));

        let after = ["2026-03-01T11:00:00Z", "2026-03-01T12:00:00Z"];
        let report = resync(&engine, "tasks/a.yaml", &after, "New", "body");

        assert_eq!(report.cancelled, 1);
        assert_eq!(report.scheduled, 1);
        assert_eq!(report.duplicate, 1);

        let pending: Vec<(String, String, String)> = engine
            .pending()
            .into_iter()
            .map(|e| (e.source_key, e.origin_token, e.title))
            .collect();
        assert_eq!(
            pending,
            vec![
                ("tasks/b.yaml".to_string(), before[0].to_string(), "B".to_string()),
                ("tasks/a.yaml".to_string(), after[0].to_string(), "New".to_string()),
                ("tasks/a.yaml".to_string(), after[1].to_string(), "New".to_string()),
            ]
        );
    }

    #[test]
    fn resync_keeps_an_unchanged_instant_that_is_already_due() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        let engine = ReminderEngine::with_clock(EngineConfig::default(), Arc::new(clock.clone()));
        let instants = ["2026-03-01T09:00:01Z"];

        assert_eq!(ingest(&engine, "tasks/a.yaml", &instants, "A", "m").scheduled, 1);
        clock.advance(chrono::Duration::seconds(2));

        let report = resync(&engine, "tasks/a.yaml", &instants, "A edited", "m");
        assert_eq!(report.past_due, 0);
        assert_eq!(report.cancelled, 0);
        assert_eq!(report.duplicate, 1);

        let pending = engine.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title, "A edited");
    }

    #[test]
    fn resync_with_empty_list_cancels_everything_for_the_task() {
        let engine = engine();
        ingest(&engine, "tasks/a.yaml", &["2026-03-01T10:00:00Z"], "A", "m");

        let report = resync::<&str>(&engine, "tasks/a.yaml", &[], "A", "m");
        assert_eq!(report.cancelled, 1);
        assert_eq!(engine.pending_len(), 0);
    }

    #[test]
    fn display_payload_falls_back() {
        let task = TaskReminders {
            identifier: "tasks/call-bob.yaml".to_string(),
            title: Some("  ".to_string()),
            description: None,
            reminders: vec![],
        };
        assert_eq!(task.display_title(), "tasks/call-bob.yaml");
        assert_eq!(task.display_message(), DEFAULT_MESSAGE);

        let task = TaskReminders {
            title: Some("Call Bob".to_string()),
            description: Some("About the invoice".to_string()),
            ..task
        };
        assert_eq!(task.display_title(), "Call Bob");
        assert_eq!(task.display_message(), "About the invoice");
    }

    struct FixedSource(Vec<TaskReminders>);

    #[async_trait]
    impl TaskSource for FixedSource {
        async fn task_reminders(&self) -> Result<Vec<TaskReminders>> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl TaskSource for FailingSource {
        async fn task_reminders(&self) -> Result<Vec<TaskReminders>> {
            Err(ReminderError::Source("store offline".to_string()))
        }
    }

    #[tokio::test]
    async fn bootstrap_merges_reports_across_tasks() {
        let engine = engine();
        let source = FixedSource(vec![
            TaskReminders {
                identifier: "tasks/a.yaml".to_string(),
                title: Some("A".to_string()),
                description: None,
                reminders: vec!["2026-03-01T10:00:00Z".to_string()],
            },
            TaskReminders {
                identifier: "tasks/b.yaml".to_string(),
                title: None,
                description: Some("Details".to_string()),
                reminders: vec![
                    "2026-03-01T10:00:00Z".to_string(),
                    "yesterday".to_string(),
                ],
            },
        ]);

        let report = bootstrap(&engine, &source).await.unwrap();
        assert_eq!(report.scheduled, 2);
        assert_eq!(report.invalid, 1);

        let pending = engine.pending();
        assert_eq!(pending[0].title, "A");
        assert_eq!(pending[0].message, DEFAULT_MESSAGE);
        assert_eq!(pending[1].title, "tasks/b.yaml");
        assert_eq!(pending[1].message, "Details");
    }

    #[tokio::test]
    async fn bootstrap_twice_schedules_nothing_new() {
        let engine = engine();
        let source = FixedSource(vec![TaskReminders {
            identifier: "tasks/a.yaml".to_string(),
            reminders: vec!["2026-03-01T10:00:00Z".to_string()],
            ..TaskReminders::default()
        }]);

        bootstrap(&engine, &source).await.unwrap();
        let again = bootstrap(&engine, &source).await.unwrap();
        assert_eq!(again.scheduled, 0);
        assert_eq!(again.duplicate, 1);
        assert_eq!(engine.pending_len(), 1);
    }

    #[tokio::test]
    async fn bootstrap_propagates_source_errors() {
        let engine = engine();
        let err = bootstrap(&engine, &FailingSource).await.unwrap_err();
        assert!(matches!(err, ReminderError::Source(_)));
        assert_eq!(engine.pending_len(), 0);
    }
}
