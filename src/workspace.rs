//! Service wiring for one data directory.
//!
//! A [`Workspace`] loads the three persisted documents, builds the task
//! registry and daily manager behind shared handles, and injects those handles
//! into the timer engine. Lock order is always tasks before daily.
//!
//! Short commands open the workspace with [`Workspace::open_locked`] and keep
//! the data directory lock until they have saved. A long-running timer gives
//! the lock up and calls [`Workspace::sync`] instead, which reloads the
//! documents and replays only the timer's own bookings onto them.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::daily::{DailyManager, DailyReport};
use crate::error::{Error, Result};
use crate::journal::BookingJournal;
use crate::lock::FileLock;
use crate::storage::Storage;
use crate::task::TaskRegistry;
use crate::timer::{CompletionAlert, TimerDriver, TimerEngine, TimerSnapshot};

pub struct Workspace {
    storage: Storage,
    config: Config,
    tasks: Arc<Mutex<TaskRegistry>>,
    daily: Arc<Mutex<DailyManager>>,
    journal: Arc<BookingJournal>,
    timer: TimerDriver,
    /// Timer document as this workspace last read or wrote it
    persisted_timer: Mutex<TimerSnapshot>,
    dir_lock: Option<FileLock>,
}

/// Result of reconciling with the documents on disk.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Another process rewrote `timer.json`; the driver now follows it.
    pub timer_changed_elsewhere: bool,
    pub warnings: Vec<String>,
}

impl Workspace {
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        let config = Config::load_from_dir(&data_dir);
        Self::open_with_config(data_dir, config)
    }

    pub fn open_with_config(data_dir: impl Into<PathBuf>, config: Config) -> Result<Self> {
        let storage = Storage::new(data_dir).with_lock_timeout(config.storage.lock_timeout_ms);
        Self::load(storage, config, None)
    }

    /// Open while holding the data directory lock. The lock is released when
    /// the workspace is dropped or [`release_lock`](Self::release_lock) is called.
    pub fn open_locked(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        let config = Config::load_from_dir(&data_dir);
        let storage = Storage::new(data_dir).with_lock_timeout(config.storage.lock_timeout_ms);
        let guard = storage.lock_data_dir()?;
        Self::load(storage, config, Some(guard))
    }

    fn load(storage: Storage, config: Config, dir_lock: Option<FileLock>) -> Result<Self> {
        let tasks_doc = storage.load_tasks()?;
        let daily_doc = storage.load_daily()?;
        let timer_doc = storage.load_timer()?;
        debug!(
            data_dir = %storage.data_dir().display(),
            tasks = tasks_doc.tasks.len(),
            reports = daily_doc.history.len(),
            locked = dir_lock.is_some(),
            "workspace opened"
        );

        let tasks = Arc::new(Mutex::new(TaskRegistry::from_tasks(tasks_doc.tasks)));
        let daily = Arc::new(Mutex::new(DailyManager::from_parts(
            daily_doc.session,
            daily_doc.history,
        )));
        let journal = Arc::new(BookingJournal::new(tasks.clone(), daily.clone()));

        let mut engine = TimerEngine::new(journal.clone(), journal.clone());
        engine.restore(timer_doc.timer.clone());

        Ok(Self {
            storage,
            config,
            tasks,
            daily,
            journal,
            timer: TimerDriver::manual(engine),
            persisted_timer: Mutex::new(timer_doc.timer),
            dir_lock,
        })
    }

    pub fn data_dir(&self) -> &Path {
        self.storage.data_dir()
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tasks(&self) -> Result<MutexGuard<'_, TaskRegistry>> {
        self.tasks
            .lock()
            .map_err(|_| Error::OperationFailed("task registry lock poisoned".to_string()))
    }

    pub fn daily(&self) -> Result<MutexGuard<'_, DailyManager>> {
        self.daily
            .lock()
            .map_err(|_| Error::OperationFailed("daily manager lock poisoned".to_string()))
    }

    pub fn timer(&self) -> &TimerDriver {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut TimerDriver {
        &mut self.timer
    }

    pub fn holds_lock(&self) -> bool {
        self.dir_lock.is_some()
    }

    pub fn release_lock(&mut self) {
        if self.dir_lock.take().is_some() {
            debug!("data directory lock released");
        }
    }

    /// Replace the completion side effect (the default rings the terminal bell).
    pub fn set_alert(&mut self, alert: Box<dyn CompletionAlert + Send>) {
        self.timer.set_alert(alert);
    }

    /// Attach the background clock using the configured wake interval.
    pub fn attach_clock(&mut self) -> bool {
        let wake: Duration = self.config.clock.wake_interval();
        self.timer.attach_clock(wake)
    }

    /// Archive the open day if it belongs to a date other than `today`.
    pub fn roll_over_if_needed(&self, today: NaiveDate) -> Result<Option<DailyReport>> {
        let tasks = self.tasks()?;
        let mut daily = self.daily()?;
        if !daily.needs_rollover_on(today) {
            return Ok(None);
        }
        Ok(daily.start_day(&*tasks))
    }

    pub fn end_day(&self) -> Result<Option<DailyReport>> {
        let tasks = self.tasks()?;
        let mut daily = self.daily()?;
        Ok(daily.end_day(&*tasks))
    }

    /// Write all three documents. Failures are logged and returned, never fatal.
    ///
    /// This overwrites the documents with the in-memory state, so it is only
    /// safe while holding the data directory lock taken before loading, or
    /// from [`sync`](Self::sync).
    pub fn save(&self) -> Vec<String> {
        let mut failures = Vec::new();

        let tasks_saved = match self.tasks() {
            Ok(tasks) => record_failure(
                &mut failures,
                "tasks",
                self.storage.save_tasks(tasks.tasks()),
            ),
            Err(err) => record_failure(&mut failures, "tasks", Err(err)),
        };

        let daily_saved = match self.daily() {
            Ok(daily) => record_failure(
                &mut failures,
                "daily",
                self.storage.save_daily(daily.session(), daily.reports()),
            ),
            Err(err) => record_failure(&mut failures, "daily", Err(err)),
        };

        if let Err(err) = self.journal.settle(tasks_saved, daily_saved) {
            failures.push(format!("timer bookings: {err}"));
        }

        let snapshot = self.timer.engine().snapshot();
        if record_failure(&mut failures, "timer", self.storage.save_timer(&snapshot)) {
            self.remember_timer(snapshot);
        }

        for failure in &failures {
            warn!(failure = %failure, "could not persist state");
        }
        failures
    }

    /// Reload the documents under the data directory lock, replay pending
    /// timer bookings onto them, and write the result back.
    ///
    /// Edits other processes made since the last sync are kept. If one of
    /// them rewrote the timer (a pause, reset, or mode switch), the driver
    /// adopts that state instead of overwriting it.
    pub fn sync(&mut self) -> Result<SyncReport> {
        let _guard = if self.holds_lock() {
            None
        } else {
            Some(self.storage.lock_data_dir()?)
        };
        self.sync_locked()
    }

    /// [`sync`](Self::sync) without waiting. Returns `None` when another
    /// process holds the data directory lock.
    pub fn try_sync(&mut self) -> Result<Option<SyncReport>> {
        let _guard = if self.holds_lock() {
            None
        } else {
            match self.storage.try_lock_data_dir()? {
                Some(guard) => Some(guard),
                None => return Ok(None),
            }
        };
        self.sync_locked().map(Some)
    }

    fn sync_locked(&mut self) -> Result<SyncReport> {
        let tasks_doc = self.storage.load_tasks()?;
        let daily_doc = self.storage.load_daily()?;
        let timer_doc = self.storage.load_timer()?;

        let mut registry = TaskRegistry::from_tasks(tasks_doc.tasks);
        let mut daily = DailyManager::from_parts(daily_doc.session, daily_doc.history);
        debug!(
            bookings = self.journal.pending()?.len(),
            "replaying timer bookings"
        );
        let mut warnings = self.journal.replay(&mut registry, &mut daily)?;
        *self.tasks()? = registry;
        *self.daily()? = daily;

        let timer_changed_elsewhere = timer_doc.timer != self.persisted_timer()?;
        if timer_changed_elsewhere {
            info!(
                is_active = timer_doc.timer.is_active,
                time_left = timer_doc.timer.time_left,
                "timer changed by another process"
            );
            self.timer.adopt(timer_doc.timer);
        }

        warnings.extend(self.save());
        Ok(SyncReport {
            timer_changed_elsewhere,
            warnings,
        })
    }

    fn persisted_timer(&self) -> Result<TimerSnapshot> {
        self.persisted_timer
            .lock()
            .map(|snapshot| snapshot.clone())
            .map_err(|_| Error::OperationFailed("timer snapshot lock poisoned".to_string()))
    }

    fn remember_timer(&self, snapshot: TimerSnapshot) {
        match self.persisted_timer.lock() {
            Ok(mut persisted) => *persisted = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }
}

/// Push a labelled failure; returns whether the write succeeded.
fn record_failure(failures: &mut Vec<String>, label: &str, result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            failures.push(format!("{label}: {err}"));
            false
        }
    }
}
