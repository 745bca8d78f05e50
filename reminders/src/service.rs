//! Lifecycle of the background reminder loop.
//!
//! The loop runs as a supervised tokio task owned by [`ReminderService`].
//! Stopping it is cooperative: [`ReminderService::shutdown`] flips a
//! `watch` flag that the loop checks on every iteration and inside every
//! wait, then joins the task under a timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::engine::ReminderEngine;
use crate::notify::NotifierInit;

/// How the loop ended after [`ReminderService::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The loop observed the signal and returned.
    Stopped,
    /// The loop did not return in time and was aborted.
    TimedOut,
    /// The loop task panicked before or during shutdown.
    Panicked,
}

/// Owns the running reminder loop.
#[derive(Debug)]
pub struct ReminderService {
    engine: Arc<ReminderEngine>,
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
    outcome: Option<ShutdownOutcome>,
}

impl ReminderService {
    /// Spawns the loop on the current tokio runtime.
    ///
    /// `notifier_init` runs inside the loop task on first delivery.
    #[must_use]
    pub fn start(engine: Arc<ReminderEngine>, notifier_init: NotifierInit) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let loop_engine = Arc::clone(&engine);

        let handle = tokio::spawn(async move {
            loop_engine.run_forever(notifier_init, shutdown_rx).await;
        });

        info!("Reminder service started");

        Self {
            engine,
            shutdown_tx,
            handle: Some(handle),
            outcome: None,
        }
    }

    /// The engine this service drives.
    #[must_use]
    pub fn engine(&self) -> &Arc<ReminderEngine> {
        &self.engine
    }

    /// Whether the loop task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signals the loop to stop and waits up to `timeout` for it.
    ///
    /// Never fails. A loop that overruns the timeout is aborted and reported
    /// as [`ShutdownOutcome::TimedOut`]. Calling this again returns the first
    /// outcome.
    pub async fn shutdown(&mut self, timeout: Duration) -> ShutdownOutcome {
        if let Some(outcome) = self.outcome {
            return outcome;
        }

        // The receiver is gone if the loop already exited.
        let _ = self.shutdown_tx.send(true);

        let outcome = match self.handle.take() {
            None => ShutdownOutcome::Stopped,
            Some(mut handle) => match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(())) => ShutdownOutcome::Stopped,
                Ok(Err(err)) if err.is_panic() => {
                    error!(error = %err, "Reminder loop panicked");
                    ShutdownOutcome::Panicked
                }
                Ok(Err(_)) => ShutdownOutcome::Stopped,
                Err(_) => {
                    warn!(
                        timeout_ms = timeout.as_millis(),
                        "ShutdownTimeout: reminder loop did not stop in time"
                    );
                    handle.abort();
                    ShutdownOutcome::TimedOut
                }
            },
        };

        info!(
            outcome = ?outcome,
            pending = self.engine.pending_len(),
            delivered = self.engine.delivered_count(),
            "Reminder service stopped"
        );

        self.outcome = Some(outcome);
        outcome
    }
}

impl Drop for ReminderService {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.shutdown_tx.send(true);
            handle.abort();
        }
    }
}
