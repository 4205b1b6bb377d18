//! Cancellable one-shot tasks.
//!
//! A [`ScheduledTask`] runs its callback on a dedicated thread once the delay
//! has elapsed, unless it was cancelled first. Dropping the handle cancels the
//! task, so a task stored next to the state it checks dies with that state.
//! Callbacks must re-check the real state when they fire.

use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use tracing::{debug, warn};

pub struct ScheduledTask {
    name: String,
    deadline: Instant,
    cancel_tx: Option<Sender<()>>,
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("name", &self.name)
            .field("remaining", &self.remaining())
            .finish()
    }
}

impl ScheduledTask {
    /// Schedules `task` to run after `delay`.
    pub fn schedule<F>(name: &str, delay: Duration, task: F) -> ScheduledTask
    where
        F: FnOnce() + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        let task_name = name.to_string();

        let spawned = thread::Builder::new()
            .name(format!("timer-{}", name))
            .spawn(move || match cancel_rx.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => {
                    debug!(task = task_name.as_str(), "Scheduled task firing");
                    task();
                }
                // Explicit cancel, or handle dropped
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    debug!(task = task_name.as_str(), "Scheduled task cancelled");
                }
            });

        if let Err(err) = spawned {
            warn!(task = name, error = %err, "Failed to spawn timer thread");
        }

        ScheduledTask {
            name: name.to_string(),
            deadline: Instant::now() + delay,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Time left before the task fires (zero once due).
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn cancel(mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.try_send(());
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.try_send(());
        }
    }
}
