//! Timer bookings not yet written to disk.
//!
//! A long-running `timer run` holds its own copy of the task registry and
//! daily session. Writing that copy back would erase edits made by other
//! processes in the meantime, so the timer books through a [`BookingJournal`]
//! instead: each booking is applied in memory and remembered. On checkpoint
//! the workspace reloads the documents and replays only the pending bookings.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::daily::DailyManager;
use crate::error::{Error, Result};
use crate::task::TaskRegistry;
use crate::timer::{FocusSessionSink, TaskTimeSink};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Booking {
    TimeSpent {
        task_id: String,
        seconds: u64,
    },
    Pomodoro {
        task_id: String,
    },
    FocusSession {
        task_id: String,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    },
}

impl Booking {
    /// Whether the booking lands in `tasks.json` (otherwise `daily.json`).
    pub fn touches_tasks(&self) -> bool {
        !matches!(self, Booking::FocusSession { .. })
    }

    /// Apply to freshly loaded state.
    pub fn apply(&self, tasks: &mut TaskRegistry, daily: &mut DailyManager) -> Result<()> {
        match self {
            Booking::TimeSpent { task_id, seconds } => {
                tasks.add_time_spent(task_id, *seconds).map(|_| ())
            }
            Booking::Pomodoro { task_id } => tasks.increment_pomodoro(task_id).map(|_| ()),
            Booking::FocusSession {
                task_id,
                started_at,
                ended_at,
            } => {
                daily.record_focus_session(task_id, *started_at, *ended_at);
                Ok(())
            }
        }
    }
}

/// Timer sink that books into the shared registries and keeps a log of
/// what it booked since the last successful save.
pub struct BookingJournal {
    tasks: Arc<Mutex<TaskRegistry>>,
    daily: Arc<Mutex<DailyManager>>,
    pending: Mutex<Vec<Booking>>,
}

impl BookingJournal {
    pub fn new(tasks: Arc<Mutex<TaskRegistry>>, daily: Arc<Mutex<DailyManager>>) -> Self {
        Self {
            tasks,
            daily,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn pending(&self) -> Result<Vec<Booking>> {
        Ok(self.lock_pending()?.clone())
    }

    /// Replay every pending booking onto reloaded state. Bookings whose task
    /// is gone are reported and skipped.
    pub fn replay(&self, tasks: &mut TaskRegistry, daily: &mut DailyManager) -> Result<Vec<String>> {
        let mut skipped = Vec::new();
        for booking in self.lock_pending()?.iter() {
            if let Err(err) = booking.apply(tasks, daily) {
                warn!(?booking, error = %err, "dropping timer booking");
                skipped.push(format!("timer booking dropped: {err}"));
            }
        }
        Ok(skipped)
    }

    /// Forget bookings that are now on disk.
    pub fn settle(&self, tasks_saved: bool, daily_saved: bool) -> Result<()> {
        self.lock_pending()?.retain(|booking| {
            if booking.touches_tasks() {
                !tasks_saved
            } else {
                !daily_saved
            }
        });
        Ok(())
    }

    fn record(&self, booking: Booking) -> Result<()> {
        self.lock_pending()?.push(booking);
        Ok(())
    }

    fn lock_pending(&self) -> Result<MutexGuard<'_, Vec<Booking>>> {
        self.pending
            .lock()
            .map_err(|_| Error::OperationFailed("booking journal lock poisoned".to_string()))
    }
}

impl TaskTimeSink for BookingJournal {
    fn add_time_spent(&self, task_id: &str, delta_seconds: u64) -> Result<()> {
        self.tasks.add_time_spent(task_id, delta_seconds)?;
        self.record(Booking::TimeSpent {
            task_id: task_id.to_string(),
            seconds: delta_seconds,
        })
    }

    fn increment_pomodoro(&self, task_id: &str) -> Result<()> {
        self.tasks.increment_pomodoro(task_id)?;
        self.record(Booking::Pomodoro {
            task_id: task_id.to_string(),
        })
    }
}

impl FocusSessionSink for BookingJournal {
    fn record_focus_session(
        &self,
        task_id: &str,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        self.daily
            .record_focus_session(task_id, started_at, ended_at)?;
        self.record(Booking::FocusSession {
            task_id: task_id.to_string(),
            started_at,
            ended_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{NewTask, TaskStatus};

    fn journal_with_task() -> (BookingJournal, String) {
        let mut registry = TaskRegistry::new();
        let id = registry
            .create_task(NewTask::new("FE-1", "Fix bug", TaskStatus::InProgress))
            .unwrap()
            .id;
        let journal = BookingJournal::new(
            Arc::new(Mutex::new(registry)),
            Arc::new(Mutex::new(DailyManager::new())),
        );
        (journal, id)
    }

    #[test]
    fn bookings_apply_in_memory_and_are_remembered() {
        let (journal, id) = journal_with_task();
        journal.add_time_spent(&id, 30).unwrap();
        journal.increment_pomodoro(&id).unwrap();

        let registry = journal.tasks.lock().unwrap();
        let task = registry.get(&id).unwrap();
        assert_eq!(task.pomodoro.time_spent, 30);
        assert_eq!(task.pomodoro.actual, 1);
        drop(registry);

        assert_eq!(journal.pending().unwrap().len(), 2);
    }

    #[test]
    fn failed_bookings_are_not_remembered() {
        let (journal, _) = journal_with_task();
        assert!(journal.add_time_spent("missing", 30).is_err());
        assert!(journal.pending().unwrap().is_empty());
    }

    #[test]
    fn replay_adds_to_reloaded_state() {
        let (journal, id) = journal_with_task();
        journal.add_time_spent(&id, 40).unwrap();
        let now = Utc::now();
        journal.record_focus_session(&id, now, now).unwrap();

        let mut reloaded = journal.tasks.lock().unwrap().clone();
        reloaded.add_time_spent(&id, 100).unwrap();
        let mut daily = DailyManager::new();

        let skipped = journal.replay(&mut reloaded, &mut daily).unwrap();
        assert!(skipped.is_empty());
        assert_eq!(reloaded.get(&id).unwrap().pomodoro.time_spent, 180);
        assert_eq!(daily.session().pomodoro_sessions.len(), 1);
    }

    #[test]
    fn replay_skips_deleted_tasks() {
        let (journal, id) = journal_with_task();
        journal.add_time_spent(&id, 40).unwrap();

        let mut reloaded = TaskRegistry::new();
        let skipped = journal
            .replay(&mut reloaded, &mut DailyManager::new())
            .unwrap();
        assert_eq!(skipped.len(), 1);
    }

    #[test]
    fn settle_keeps_what_was_not_saved() {
        let (journal, id) = journal_with_task();
        journal.add_time_spent(&id, 10).unwrap();
        let now = Utc::now();
        journal.record_focus_session(&id, now, now).unwrap();

        journal.settle(true, false).unwrap();
        let pending = journal.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert!(!pending[0].touches_tasks());

        journal.settle(false, true).unwrap();
        assert!(journal.pending().unwrap().is_empty());
    }
}
