//! The reminder scheduling engine.
//!
//! # Architecture
//!
//! The engine keeps every pending reminder in a map ordered by
//! `(due_instant, sequence)`, plus a key index that doubles as the dedup set
//! and an id index for cancellation. All of them live behind a single mutex. Callers insert through [`schedule`];
//! one background task runs [`run_forever`], popping the head once it is due
//! and handing it to the [`Notifier`] with the lock released.
//!
//! ```text
//!   schedule() ──┐                         ┌──> show_popup()
//!   schedule() ──┼──> [ ordered queue ] ──>│
//!   ingest()   ──┘        (Mutex)          └──> play_sound()
//!                           ▲
//!                 Notify ───┘ (new earlier head)
//! ```
//!
//! The loop sleeps until the head is due or for the poll interval, whichever
//! is shorter. Inserting a new head wakes it early through [`Notify`], whose
//! stored permit closes the gap between releasing the lock and starting the
//! wait.
//!
//! # Delivery semantics
//!
//! At most once. A popped entry is never re-enqueued, and its key stays in the
//! dedup set, so re-ingesting the same task after delivery is a no-op.
//!
//! [`schedule`]: ReminderEngine::schedule
//! [`run_forever`]: ReminderEngine::run_forever

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::notify::{Notifier, NotifierInit};
use crate::time::{parse_instant, Clock, ParseError, SystemClock};

/// Default interval between queue checks when nothing is due sooner.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Namespace for deterministic reminder ids ("todolist-remind\0").
const REMINDER_NAMESPACE: Uuid = Uuid::from_bytes([
    0x74, 0x6f, 0x64, 0x6f, // "todo"
    0x6c, 0x69, 0x73, 0x74, // "list"
    0x2d, 0x72, 0x65, 0x6d, // "-rem"
    0x69, 0x6e, 0x64, 0x00, // "ind\0"
]);

/// Identity of a reminder for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReminderKey {
    /// Owner of the reminder, typically a task path.
    pub source_key: String,
    /// The timestamp literal as the source wrote it.
    pub origin_token: String,
}

impl ReminderKey {
    #[must_use]
    pub fn new(source_key: impl Into<String>, origin_token: impl Into<String>) -> Self {
        Self {
            source_key: source_key.into(),
            origin_token: origin_token.into(),
        }
    }

    /// Deterministic id for this key; the same pair always maps to the same id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        let mut name = Vec::with_capacity(self.source_key.len() + self.origin_token.len() + 1);
        name.extend_from_slice(self.source_key.as_bytes());
        name.push(0);
        name.extend_from_slice(self.origin_token.as_bytes());
        Uuid::new_v5(&REMINDER_NAMESPACE, &name)
    }
}

/// A scheduled reminder. Its key and instant are fixed once queued; only the
/// popup payload can be refreshed while it is pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReminderEntry {
    pub id: Uuid,
    pub due_instant: DateTime<Utc>,
    pub source_key: String,
    pub origin_token: String,
    pub title: String,
    pub message: String,
}

impl ReminderEntry {
    fn key(&self) -> ReminderKey {
        ReminderKey::new(self.source_key.clone(), self.origin_token.clone())
    }
}

/// Why a reminder was not queued.
///
/// None of these are failures of the engine; they are the expected outcomes
/// of re-scanning tasks and of stale or malformed input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The timestamp could not be parsed.
    #[error(transparent)]
    Malformed(#[from] ParseError),

    /// The instant is not strictly in the future.
    #[error("reminder due at {due} is not in the future")]
    PastDue { due: DateTime<Utc> },

    /// The `(source_key, origin_token)` pair was already scheduled.
    #[error("reminder already scheduled")]
    Duplicate,
}

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Longest the loop sleeps before re-checking the queue head.
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// State of a key in the dedup index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyState {
    Pending(QueuePosition),
    Delivered,
}

/// Position in the ordered queue. The sequence number breaks ties between
/// equal instants in insertion order.
type QueuePosition = (DateTime<Utc>, u64);

#[derive(Debug, Default)]
struct QueueState {
    queue: BTreeMap<QueuePosition, ReminderEntry>,
    keys: HashMap<ReminderKey, KeyState>,
    ids: HashMap<Uuid, ReminderKey>,
    next_seq: u64,
}

impl QueueState {
    fn head_due(&self) -> Option<DateTime<Utc>> {
        self.queue.keys().next().map(|(due, _)| *due)
    }

    fn pop_due(&mut self, now: DateTime<Utc>) -> Option<ReminderEntry> {
        if self.head_due()? > now {
            return None;
        }
        let (_, entry) = self.queue.pop_first()?;
        self.ids.remove(&entry.id);
        self.keys.insert(entry.key(), KeyState::Delivered);
        Some(entry)
    }

    fn remove_pending(&mut self, key: &ReminderKey) -> Option<ReminderEntry> {
        match self.keys.get(key) {
            Some(KeyState::Pending(position)) => {
                let position = *position;
                self.keys.remove(key);
                let entry = self.queue.remove(&position)?;
                self.ids.remove(&entry.id);
                Some(entry)
            }
            _ => None,
        }
    }
}

/// In-memory, future-only reminder scheduler.
///
/// Construct one per process and share it through `Arc`; all methods take
/// `&self`.
#[derive(Debug)]
pub struct ReminderEngine {
    state: Mutex<QueueState>,
    wakeup: Notify,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    delivered: AtomicU64,
}

impl Default for ReminderEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl ReminderEngine {
    /// Creates an engine driven by the system clock.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates an engine driven by `clock`.
    #[must_use]
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            wakeup: Notify::new(),
            clock,
            config,
            delivered: AtomicU64::new(0),
        }
    }

    /// Current instant according to the engine's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // The queue is left consistent between statements, so a panic in
        // another holder does not invalidate it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedules a reminder, returning whether it was queued.
    ///
    /// Malformed timestamps are logged. Past-due and duplicate reminders are
    /// dropped quietly.
    pub fn schedule(
        &self,
        source_key: &str,
        origin_token: &str,
        due_instant: &str,
        title: &str,
        message: &str,
    ) -> bool {
        match self.try_schedule(source_key, origin_token, due_instant, title, message) {
            Ok(_) => true,
            Err(Rejection::Malformed(err)) => {
                warn!(
                    source_key = %source_key,
                    value = %due_instant,
                    error = %err,
                    "Rejected reminder with invalid timestamp"
                );
                false
            }
            Err(rejection) => {
                trace!(source_key = %source_key, reason = %rejection, "Reminder not scheduled");
                false
            }
        }
    }

    /// Like [`schedule`](Self::schedule) but reports why a reminder was not
    /// queued.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] reason when nothing was inserted.
    pub fn try_schedule(
        &self,
        source_key: &str,
        origin_token: &str,
        due_instant: &str,
        title: &str,
        message: &str,
    ) -> Result<ReminderEntry, Rejection> {
        let due = parse_instant(due_instant)?;
        self.schedule_instant(
            ReminderKey::new(source_key, origin_token),
            due,
            title,
            message,
        )
    }

    /// Schedules an already-parsed instant.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::PastDue`] if `due` is not after the current
    /// instant and [`Rejection::Duplicate`] if `key` was seen before.
    pub fn schedule_instant(
        &self,
        key: ReminderKey,
        due: DateTime<Utc>,
        title: &str,
        message: &str,
    ) -> Result<ReminderEntry, Rejection> {
        if due <= self.clock.now() {
            return Err(Rejection::PastDue { due });
        }

        let entry = ReminderEntry {
            id: key.id(),
            due_instant: due,
            source_key: key.source_key.clone(),
            origin_token: key.origin_token.clone(),
            title: title.to_string(),
            message: message.to_string(),
        };

        let is_new_head = {
            let mut state = self.lock();
            if state.keys.contains_key(&key) {
                return Err(Rejection::Duplicate);
            }
            let position = (due, state.next_seq);
            state.next_seq += 1;
            state.ids.insert(entry.id, key.clone());
            state.keys.insert(key, KeyState::Pending(position));
            state.queue.insert(position, entry.clone());
            state.head_due() == Some(due)
        };

        debug!(
            id = %entry.id,
            source_key = %entry.source_key,
            due = %entry.due_instant,
            "Reminder scheduled"
        );

        if is_new_head {
            self.wakeup.notify_one();
        }

        Ok(entry)
    }

    /// Removes a pending reminder by id. The key becomes schedulable again.
    pub fn cancel(&self, id: Uuid) -> bool {
        let mut state = self.lock();
        let key = state.ids.get(&id).cloned();
        let removed = key.and_then(|key| state.remove_pending(&key)).is_some();
        drop(state);

        if removed {
            debug!(id = %id, "Reminder cancelled");
        }
        removed
    }

    /// Removes every pending reminder owned by `source_key`.
    pub fn cancel_source(&self, source_key: &str) -> usize {
        let mut state = self.lock();
        let keys: Vec<ReminderKey> = state
            .queue
            .values()
            .filter(|entry| entry.source_key == source_key)
            .map(ReminderEntry::key)
            .collect();
        let removed = keys
            .iter()
            .filter(|key| state.remove_pending(key).is_some())
            .count();
        drop(state);

        if removed > 0 {
            debug!(source_key = %source_key, removed, "Reminders cancelled for source");
        }
        removed
    }

    /// Removes the pending reminders of `source_key` whose origin token
    /// `keep` rejects. Entries it accepts stay queued untouched.
    pub fn retain_source(&self, source_key: &str, keep: impl Fn(&str) -> bool) -> usize {
        let mut state = self.lock();
        let keys: Vec<ReminderKey> = state
            .queue
            .values()
            .filter(|entry| {
                entry.source_key == source_key && !keep(entry.origin_token.as_str())
            })
            .map(ReminderEntry::key)
            .collect();
        let removed = keys
            .iter()
            .filter(|key| state.remove_pending(key).is_some())
            .count();
        drop(state);

        if removed > 0 {
            debug!(source_key = %source_key, removed, "Stale reminders cancelled for source");
        }
        removed
    }

    /// Replaces the title and message of a pending reminder in place.
    ///
    /// Returns `false` when `key` is not pending (never seen, cancelled or
    /// already delivered). The queue position does not change.
    pub fn refresh_pending(&self, key: &ReminderKey, title: &str, message: &str) -> bool {
        let mut state = self.lock();
        let Some(KeyState::Pending(position)) = state.keys.get(key).copied() else {
            return false;
        };
        match state.queue.get_mut(&position) {
            Some(entry) => {
                if entry.title != title || entry.message != message {
                    entry.title = title.to_string();
                    entry.message = message.to_string();
                    trace!(id = %entry.id, "Reminder payload refreshed");
                }
                true
            }
            None => false,
        }
    }

    /// Removes every pending reminder. Delivered keys stay blocked.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let removed = state.queue.len();
        state.queue.clear();
        state.ids.clear();
        state
            .keys
            .retain(|_, key_state| *key_state == KeyState::Delivered);
        removed
    }

    /// Pending reminders in delivery order.
    #[must_use]
    pub fn pending(&self) -> Vec<ReminderEntry> {
        self.lock().queue.values().cloned().collect()
    }

    /// Number of pending reminders.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Number of reminders popped for delivery since construction.
    #[must_use]
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Pops the head if it is due at `now`.
    fn pop_due(&self, now: DateTime<Utc>) -> Result<ReminderEntry, Duration> {
        let mut state = self.lock();
        if let Some(entry) = state.pop_due(now) {
            return Ok(entry);
        }
        let wait = state
            .head_due()
            .and_then(|due| (due - now).to_std().ok())
            .map_or(self.config.poll_interval, |until| {
                until.min(self.config.poll_interval)
            });
        Err(wait)
    }

    /// The background loop body.
    ///
    /// Runs until `shutdown` carries `true` or its sender is dropped. The
    /// notifier is built from `notifier_init` on the first delivery; if that
    /// fails, due reminders are still popped and logged but not shown.
    pub async fn run_forever(
        &self,
        notifier_init: NotifierInit,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut sink = SinkSlot::Pending(notifier_init);

        info!(
            poll_interval_ms = self.config.poll_interval.as_millis(),
            "Reminder loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let now = self.clock.now();
            match self.pop_due(now) {
                Ok(entry) => {
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                    deliver(&mut sink, &entry).await;
                }
                Err(wait) => {
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                debug!("Shutdown sender dropped, stopping reminder loop");
                                break;
                            }
                        }
                        () = self.wakeup.notified() => {
                            trace!("Reminder loop woken by new head");
                        }
                        () = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }

        info!(pending = self.pending_len(), "Reminder loop stopped");
    }
}

/// Lazily-initialized delivery sink owned by the loop.
enum SinkSlot {
    Pending(NotifierInit),
    Ready(Arc<dyn Notifier>),
    Unavailable,
}

impl SinkSlot {
    fn get(&mut self) -> Option<Arc<dyn Notifier>> {
        *self = match std::mem::replace(self, Self::Unavailable) {
            Self::Pending(init) => match init() {
                Ok(notifier) => {
                    info!(notifier = notifier.name(), "Reminder notifier initialized");
                    Self::Ready(notifier)
                }
                Err(err) => {
                    warn!(error = %err, "Failed to initialize reminder notifier");
                    Self::Unavailable
                }
            },
            settled => settled,
        };

        match self {
            Self::Ready(notifier) => Some(Arc::clone(notifier)),
            _ => None,
        }
    }
}

/// Hands one entry to the sink. Popup and sound fail independently and
/// neither failure escapes.
async fn deliver(sink: &mut SinkSlot, entry: &ReminderEntry) {
    info!(
        id = %entry.id,
        source_key = %entry.source_key,
        reminder = %entry.origin_token,
        "Delivering reminder"
    );

    let Some(notifier) = sink.get() else {
        warn!(id = %entry.id, "No notifier available, reminder dropped");
        return;
    };

    if let Err(err) = notifier.show_popup(&entry.title, &entry.message).await {
        warn!(id = %entry.id, error = %err, "Reminder popup failed");
    }
    if let Err(err) = notifier.play_sound().await {
        warn!(id = %entry.id, error = %err, "Reminder sound failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn engine_at(clock: &ManualClock) -> ReminderEngine {
        ReminderEngine::with_clock(EngineConfig::default(), Arc::new(clock.clone()))
    }

    fn iso(instant: DateTime<Utc>) -> String {
        instant.to_rfc3339()
    }

    #[test]
    fn past_instant_is_not_admitted() {
        let engine = ReminderEngine::default();
        assert!(!engine.schedule("tasks/a.yaml", "2020-01-01T00:00:00Z", "2020-01-01T00:00:00Z", "t", "m"));
        assert_eq!(engine.pending_len(), 0);
    }

    #[test]
    fn instant_equal_to_now_is_not_admitted() {
        let clock = ManualClock::new(start());
        let engine = engine_at(&clock);
        let now = iso(start());

        let result = engine.try_schedule("tasks/a.yaml", &now, &now, "t", "m");
        assert_eq!(result, Err(Rejection::PastDue { due: start() }));
        assert_eq!(engine.pending_len(), 0);
    }

    #[test]
    fn future_instant_is_queued() {
        let clock = ManualClock::new(start());
        let engine = engine_at(&clock);
        let due = iso(start() + ChronoDuration::minutes(5));

        assert!(engine.schedule("tasks/a.yaml", &due, &due, "Standup", "Join the call"));
        let pending = engine.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title, "Standup");
        assert_eq!(pending[0].message, "Join the call");
        assert_eq!(pending[0].due_instant, start() + ChronoDuration::minutes(5));
    }

    #[test]
    fn malformed_instant_is_rejected() {
        let engine = ReminderEngine::default();
        assert!(!engine.schedule("tasks/a.yaml", "soon", "soon", "t", "m"));

        let result = engine.try_schedule("tasks/a.yaml", "soon", "soon", "t", "m");
        assert!(matches!(result, Err(Rejection::Malformed(ParseError::Invalid(_)))));
        assert_eq!(engine.pending_len(), 0);
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let clock = ManualClock::new(start());
        let engine = engine_at(&clock);
        let due = iso(start() + ChronoDuration::hours(1));

        assert!(engine.schedule("tasks/a.yaml", &due, &due, "t", "m"));
        assert_eq!(
            engine.try_schedule("tasks/a.yaml", &due, &due, "t", "m"),
            Err(Rejection::Duplicate)
        );
        assert_eq!(engine.pending_len(), 1);
    }

    #[test]
    fn same_instant_from_different_literals_is_two_entries() {
        let clock = ManualClock::new(start());
        let engine = engine_at(&clock);

        assert!(engine.schedule("tasks/a.yaml", "2026-03-01T10:00:00Z", "2026-03-01T10:00:00Z", "t", "m"));
        assert!(engine.schedule("tasks/a.yaml", "2026-03-01T11:00:00+01:00", "2026-03-01T11:00:00+01:00", "t", "m"));
        assert_eq!(engine.pending_len(), 2);
    }

    #[test]
    fn same_token_for_different_sources_is_two_entries() {
        let clock = ManualClock::new(start());
        let engine = engine_at(&clock);
        let due = iso(start() + ChronoDuration::hours(1));

        assert!(engine.schedule("tasks/a.yaml", &due, &due, "t", "m"));
        assert!(engine.schedule("tasks/b.yaml", &due, &due, "t", "m"));
        assert_eq!(engine.pending_len(), 2);
    }

    #[test]
    fn pending_is_sorted_by_due_instant_then_insertion() {
        let clock = ManualClock::new(start());
        let engine = engine_at(&clock);
        let at = |mins| start() + ChronoDuration::minutes(mins);

        for (source, mins) in [("c", 30), ("a", 10), ("b", 20), ("a2", 10)] {
            engine
                .schedule_instant(ReminderKey::new(source, "tok"), at(mins), source, "m")
                .unwrap();
        }

        let order: Vec<String> = engine.pending().into_iter().map(|e| e.source_key).collect();
        assert_eq!(order, vec!["a", "a2", "b", "c"]);
    }

    #[test]
    fn pop_due_only_returns_entries_at_or_before_now() {
        let clock = ManualClock::new(start());
        let engine = engine_at(&clock);
        let due = start() + ChronoDuration::seconds(10);
        engine
            .schedule_instant(ReminderKey::new("a", "t"), due, "t", "m")
            .unwrap();

        assert!(engine.pop_due(start()).is_err());
        let popped = engine.pop_due(due).expect("due at its instant");
        assert_eq!(popped.source_key, "a");
        assert_eq!(engine.pending_len(), 0);
    }

    #[test]
    fn delivered_key_cannot_be_rescheduled() {
        let clock = ManualClock::new(start());
        let engine = engine_at(&clock);
        let due = start() + ChronoDuration::seconds(10);
        let key = ReminderKey::new("tasks/a.yaml", "tok");

        engine.schedule_instant(key.clone(), due, "t", "m").unwrap();
        engine.pop_due(due).unwrap();

        let later = due + ChronoDuration::hours(1);
        assert_eq!(
            engine.schedule_instant(key, later, "t", "m"),
            Err(Rejection::Duplicate)
        );
        assert_eq!(engine.pending_len(), 0);
    }

    #[test]
    fn wait_is_capped_by_poll_interval_and_head() {
        let clock = ManualClock::new(start());
        let engine = engine_at(&clock);

        assert_eq!(engine.pop_due(start()).unwrap_err(), DEFAULT_POLL_INTERVAL);

        let soon = start() + ChronoDuration::milliseconds(100);
        engine
            .schedule_instant(ReminderKey::new("a", "t"), soon, "t", "m")
            .unwrap();
        assert_eq!(
            engine.pop_due(start()).unwrap_err(),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn cancel_removes_entry_and_frees_key() {
        let clock = ManualClock::new(start());
        let engine = engine_at(&clock);
        let due = start() + ChronoDuration::minutes(1);
        let key = ReminderKey::new("tasks/a.yaml", "tok");

        let entry = engine.schedule_instant(key.clone(), due, "t", "m").unwrap();
        assert!(engine.cancel(entry.id));
        assert!(!engine.cancel(entry.id));
        assert_eq!(engine.pending_len(), 0);

        assert!(engine.schedule_instant(key, due, "t", "m").is_ok());
    }

    #[test]
    fn cancel_source_only_touches_that_source() {
        let clock = ManualClock::new(start());
        let engine = engine_at(&clock);
        let due = start() + ChronoDuration::minutes(1);

        for (source, token) in [("a", "1"), ("a", "2"), ("b", "1")] {
            engine
                .schedule_instant(ReminderKey::new(source, token), due, "t", "m")
                .unwrap();
        }

        assert_eq!(engine.cancel_source("a"), 2);
        let remaining = engine.pending();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].source_key, "b");
    }

    #[test]
    fn cancel_by_id_ignores_delivered_and_unknown_ids() {
        let clock = ManualClock::new(start());
        let engine = engine_at(&clock);
        let first = start() + ChronoDuration::seconds(1);
        let second = start() + ChronoDuration::minutes(1);

        let delivered = engine
            .schedule_instant(ReminderKey::new("a", "1"), first, "t", "m")
            .unwrap();
        let pending = engine
            .schedule_instant(ReminderKey::new("a", "2"), second, "t", "m")
            .unwrap();
        engine.pop_due(first).unwrap();

        assert!(!engine.cancel(delivered.id));
        assert!(!engine.cancel(Uuid::nil()));
        assert!(engine.cancel(pending.id));
        assert_eq!(engine.pending_len(), 0);
    }

    #[test]
    fn retain_source_drops_only_rejected_tokens_of_that_source() {
        let clock = ManualClock::new(start());
        let engine = engine_at(&clock);
        let due = start() + ChronoDuration::minutes(1);

        for (source, token) in [("a", "1"), ("a", "2"), ("b", "2")] {
            engine
                .schedule_instant(ReminderKey::new(source, token), due, "t", "m")
                .unwrap();
        }

        assert_eq!(engine.retain_source("a", |token| token == "1"), 1);
        let remaining: Vec<(String, String)> = engine
            .pending()
            .into_iter()
            .map(|e| (e.source_key, e.origin_token))
            .collect();
        assert_eq!(
            remaining,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn refresh_pending_rewrites_payload_only_while_pending() {
        let clock = ManualClock::new(start());
        let engine = engine_at(&clock);
        let first = start() + ChronoDuration::seconds(1);
        let second = start() + ChronoDuration::minutes(1);
        let early = ReminderKey::new("a", "1");
        let late = ReminderKey::new("a", "2");

        engine.schedule_instant(early.clone(), first, "old", "m").unwrap();
        engine.schedule_instant(late.clone(), second, "old", "m").unwrap();
        engine.pop_due(first).unwrap();

        assert!(!engine.refresh_pending(&early, "new", "body"));
        assert!(engine.refresh_pending(&late, "new", "body"));
        assert!(!engine.refresh_pending(&ReminderKey::new("zz", "1"), "new", "body"));

        let pending = engine.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title, "new");
        assert_eq!(pending[0].message, "body");
        assert_eq!(pending[0].due_instant, second);
    }

    #[test]
    fn clear_keeps_delivered_keys_blocked() {
        let clock = ManualClock::new(start());
        let engine = engine_at(&clock);
        let first = start() + ChronoDuration::seconds(1);
        let second = start() + ChronoDuration::minutes(1);

        engine
            .schedule_instant(ReminderKey::new("a", "1"), first, "t", "m")
            .unwrap();
        engine
            .schedule_instant(ReminderKey::new("a", "2"), second, "t", "m")
            .unwrap();
        engine.pop_due(first).unwrap();

        assert_eq!(engine.clear(), 1);
        assert_eq!(engine.pending_len(), 0);
        let later = second + ChronoDuration::minutes(1);
        assert_eq!(
            engine.schedule_instant(ReminderKey::new("a", "1"), later, "t", "m"),
            Err(Rejection::Duplicate)
        );
        assert!(engine
            .schedule_instant(ReminderKey::new("a", "2"), later, "t", "m")
            .is_ok());
    }

    #[test]
    fn reminder_id_is_deterministic() {
        let a = ReminderKey::new("tasks/a.yaml", "2026-01-01T00:00:00Z");
        let b = ReminderKey::new("tasks/a.yaml", "2026-01-01T00:00:00Z");
        let c = ReminderKey::new("tasks/a.yaml2026-01-01T00:00:00Z", "");
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn rejection_display() {
        assert_eq!(Rejection::Duplicate.to_string(), "reminder already scheduled");
        assert_eq!(
            Rejection::Malformed(ParseError::Empty).to_string(),
            "reminder timestamp is empty"
        );
    }
}
