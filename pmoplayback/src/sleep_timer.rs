//! Pause-after-delay timer owned by the orchestrator.

use std::time::Duration;

use crate::errors::PlaybackError;
use crate::timer::ScheduledTask;

#[derive(Debug)]
struct Armed {
    task: ScheduledTask,
    seconds: u32,
    generation: u64,
}

#[derive(Debug, Default)]
pub struct SleepTimer {
    armed: Option<Armed>,
    generation: u64,
}

fn check_duration(seconds: u32, max_seconds: u32) -> Result<Duration, PlaybackError> {
    match seconds {
        0 => Err(PlaybackError::SleepTimer(
            "Sleep duration must be at least one second".to_string(),
        )),
        s if s > max_seconds => Err(PlaybackError::SleepTimer(format!(
            "Sleep duration {}s is over the {}s limit",
            s, max_seconds
        ))),
        s => Ok(Duration::from_secs(u64::from(s))),
    }
}

impl SleepTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whole seconds left, None when idle.
    pub fn remaining_seconds(&self) -> Option<u32> {
        let armed = self.armed.as_ref()?;
        u32::try_from(armed.task.remaining().as_secs()).ok()
    }

    /// Duration the running timer was armed with, 0 when idle.
    pub fn duration_seconds(&self) -> u32 {
        self.armed.as_ref().map_or(0, |armed| armed.seconds)
    }

    pub fn is_active(&self) -> bool {
        self.armed.is_some()
    }

    /// Arms the timer, replacing any running one. `on_expire` runs on the
    /// timer thread and receives the generation to hand to
    /// [`SleepTimer::mark_expired`].
    pub fn start<F>(&mut self, seconds: u32, max_seconds: u32, on_expire: F) -> Result<(), PlaybackError>
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let delay = check_duration(seconds, max_seconds)?;
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        self.armed = Some(Armed {
            task: ScheduledTask::schedule("sleep", delay, move || on_expire(generation)),
            seconds,
            generation,
        });
        Ok(())
    }

    /// Forgets the timer of `generation` once it fired. False when that
    /// timer was already cancelled or replaced.
    pub(crate) fn mark_expired(&mut self, generation: u64) -> bool {
        if self.armed.as_ref().is_some_and(|armed| armed.generation == generation) {
            self.armed = None;
            true
        } else {
            false
        }
    }

    pub fn cancel(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.task.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_bounds() {
        assert!(check_duration(0, 7200).is_err());
        assert!(check_duration(7201, 7200).is_err());
        assert_eq!(check_duration(7200, 7200).unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn test_rejected_start_keeps_running_timer() {
        let mut timer = SleepTimer::new();
        timer.start(600, 7200, |_| {}).unwrap();

        assert!(timer.start(9000, 7200, |_| {}).is_err());
        assert_eq!(timer.duration_seconds(), 600);
        let remaining = timer.remaining_seconds().unwrap();
        assert!(remaining > 590 && remaining <= 600);
    }

    #[test]
    fn test_restart_replaces_previous_task() {
        let (tx, rx) = unbounded::<&str>();
        let first = tx.clone();
        let mut timer = SleepTimer::new();
        timer.start(1, 7200, move |_| first.send("first").unwrap()).unwrap();
        timer.start(1, 7200, move |_| tx.send("second").unwrap()).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(3)), Ok("second"));
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn test_cancel_goes_idle() {
        let (tx, rx) = unbounded::<()>();
        let mut timer = SleepTimer::new();
        timer.start(1, 7200, move |_| tx.send(()).unwrap()).unwrap();

        timer.cancel();
        assert!(!timer.is_active());
        assert_eq!(timer.duration_seconds(), 0);
        assert_eq!(timer.remaining_seconds(), None);
        assert!(rx.recv_timeout(Duration::from_millis(1300)).is_err());
    }

    #[test]
    fn test_stale_expiry_keeps_newer_timer() {
        let (tx, rx) = unbounded::<u64>();
        let mut timer = SleepTimer::new();
        let first = tx.clone();
        timer.start(1, 7200, move |generation| first.send(generation).unwrap()).unwrap();
        let stale = rx.recv_timeout(Duration::from_secs(3)).unwrap();

        timer.start(600, 7200, move |generation| tx.send(generation).unwrap()).unwrap();

        assert!(!timer.mark_expired(stale));
        assert!(timer.is_active());
        assert_eq!(timer.duration_seconds(), 600);
    }

    #[test]
    fn test_expiry_of_current_timer_goes_idle() {
        let (tx, rx) = unbounded::<u64>();
        let mut timer = SleepTimer::new();
        timer.start(1, 7200, move |generation| tx.send(generation).unwrap()).unwrap();
        let generation = rx.recv_timeout(Duration::from_secs(3)).unwrap();

        assert!(timer.mark_expired(generation));
        assert!(!timer.is_active());
        assert!(!timer.mark_expired(generation));
    }
}
