//! Storage layer for devday
//!
//! All state lives in a single data directory:
//!
//! ```text
//! <data dir>/
//!   devday.toml      # Configuration (optional)
//!   tasks.json       # Task registry document
//!   daily.json       # Live daily session plus archived reports
//!   timer.json       # Partial timer snapshot
//!   devday.lock      # Held across one load, edit and save cycle
//! ```
//!
//! Every document carries a `schemaVersion`. A missing document loads as the
//! empty default, so a fresh directory behaves like a first launch.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::daily::{DailyReport, DailySession};
use crate::error::{Error, Result};
use crate::lock::{self, FileLock, DEFAULT_LOCK_TIMEOUT_MS};
use crate::task::Task;
use crate::timer::TimerSnapshot;

pub const TASKS_FILE: &str = "tasks.json";
pub const DAILY_FILE: &str = "daily.json";
pub const TIMER_FILE: &str = "timer.json";
pub const DATA_DIR_LOCK_FILE: &str = "devday.lock";

pub const TASKS_SCHEMA_VERSION: &str = "devday.tasks.v1";
pub const DAILY_SCHEMA_VERSION: &str = "devday.daily.v1";
pub const TIMER_SCHEMA_VERSION: &str = "devday.timer.v1";

/// Environment variable that overrides the data directory
pub const DATA_DIR_ENV: &str = "DEVDAY_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TasksDocument {
    #[serde(default = "tasks_schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Default for TasksDocument {
    fn default() -> Self {
        Self {
            schema_version: tasks_schema_version(),
            tasks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyDocument {
    #[serde(default = "daily_schema_version")]
    pub schema_version: String,
    #[serde(flatten)]
    pub session: DailySession,
    #[serde(default)]
    pub history: Vec<DailyReport>,
}

impl Default for DailyDocument {
    fn default() -> Self {
        Self {
            schema_version: daily_schema_version(),
            session: DailySession::default(),
            history: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerDocument {
    #[serde(default = "timer_schema_version")]
    pub schema_version: String,
    #[serde(flatten)]
    pub timer: TimerSnapshot,
}

impl Default for TimerDocument {
    fn default() -> Self {
        Self {
            schema_version: timer_schema_version(),
            timer: TimerSnapshot::default(),
        }
    }
}

fn tasks_schema_version() -> String {
    TASKS_SCHEMA_VERSION.to_string()
}

fn daily_schema_version() -> String {
    DAILY_SCHEMA_VERSION.to_string()
}

fn timer_schema_version() -> String {
    TIMER_SCHEMA_VERSION.to_string()
}

/// Storage manager for one devday data directory
#[derive(Debug, Clone)]
pub struct Storage {
    data_dir: PathBuf,
    lock_timeout_ms: u64,
}

impl Storage {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout_ms: u64) -> Self {
        self.lock_timeout_ms = lock_timeout_ms;
        self
    }

    /// Platform data directory, e.g. `~/.local/share/devday` on Linux
    pub fn default_data_dir() -> Result<PathBuf> {
        ProjectDirs::from("dev", "devday", "devday")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| {
                Error::OperationFailed(format!(
                    "could not determine a home directory; pass --data-dir or set {DATA_DIR_ENV}"
                ))
            })
    }

    /// Pick the explicit directory when given, otherwise the platform default.
    pub fn resolve_data_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
        match explicit {
            Some(dir) => Ok(dir),
            None => Self::default_data_dir(),
        }
    }

    // =========================================================================
    // Path accessors
    // =========================================================================

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn tasks_file(&self) -> PathBuf {
        self.data_dir.join(TASKS_FILE)
    }

    pub fn daily_file(&self) -> PathBuf {
        self.data_dir.join(DAILY_FILE)
    }

    pub fn timer_file(&self) -> PathBuf {
        self.data_dir.join(TIMER_FILE)
    }

    pub fn data_dir_lock_file(&self) -> PathBuf {
        self.data_dir.join(DATA_DIR_LOCK_FILE)
    }

    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    /// Lock the whole data directory, waiting up to the lock timeout.
    ///
    /// Document locks only cover single reads and writes; this one is held
    /// from loading the documents until the edited state is written back.
    pub fn lock_data_dir(&self) -> Result<FileLock> {
        self.init()?;
        let guard = FileLock::acquire(self.data_dir_lock_file(), self.lock_timeout_ms)?;
        debug!(lock = %guard.path().display(), "data directory locked");
        Ok(guard)
    }

    /// Like [`lock_data_dir`](Self::lock_data_dir) but returns `None` instead
    /// of waiting when another process holds the lock.
    pub fn try_lock_data_dir(&self) -> Result<Option<FileLock>> {
        self.init()?;
        FileLock::try_acquire(self.data_dir_lock_file())
    }

    // =========================================================================
    // File I/O helpers
    // =========================================================================

    /// Serialize and write under the document's lock (temp file + rename).
    pub fn write_json<T: Serialize>(&self, path: &Path, data: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        lock::write_atomic_locked(path, json.as_bytes(), self.lock_timeout_ms)
    }

    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = lock::read_locked(path, self.lock_timeout_ms)?;
        Ok(serde_json::from_slice(&content)?)
    }

    fn read_json_or_default<T: DeserializeOwned + Default>(&self, path: &Path) -> Result<T> {
        if !path.exists() {
            debug!(path = %path.display(), "document missing, using defaults");
            return Ok(T::default());
        }
        self.read_json(path)
    }

    // =========================================================================
    // Documents
    // =========================================================================

    pub fn load_tasks(&self) -> Result<TasksDocument> {
        let path = self.tasks_file();
        let doc: TasksDocument = self.read_json_or_default(&path)?;
        check_schema(&path, &doc.schema_version, TASKS_SCHEMA_VERSION)?;
        Ok(doc)
    }

    pub fn save_tasks(&self, tasks: &[Task]) -> Result<()> {
        let doc = TasksDocument {
            schema_version: tasks_schema_version(),
            tasks: tasks.to_vec(),
        };
        self.write_json(&self.tasks_file(), &doc)
    }

    pub fn load_daily(&self) -> Result<DailyDocument> {
        let path = self.daily_file();
        let doc: DailyDocument = self.read_json_or_default(&path)?;
        check_schema(&path, &doc.schema_version, DAILY_SCHEMA_VERSION)?;
        Ok(doc)
    }

    pub fn save_daily(&self, session: &DailySession, history: &[DailyReport]) -> Result<()> {
        let doc = DailyDocument {
            schema_version: daily_schema_version(),
            session: session.clone(),
            history: history.to_vec(),
        };
        self.write_json(&self.daily_file(), &doc)
    }

    pub fn load_timer(&self) -> Result<TimerDocument> {
        let path = self.timer_file();
        let doc: TimerDocument = self.read_json_or_default(&path)?;
        check_schema(&path, &doc.schema_version, TIMER_SCHEMA_VERSION)?;
        Ok(doc)
    }

    pub fn save_timer(&self, snapshot: &TimerSnapshot) -> Result<()> {
        let doc = TimerDocument {
            schema_version: timer_schema_version(),
            timer: snapshot.clone(),
        };
        self.write_json(&self.timer_file(), &doc)
    }
}

fn check_schema(path: &Path, found: &str, expected: &str) -> Result<()> {
    if found != expected {
        return Err(Error::OperationFailed(format!(
            "{} has unsupported schema version '{}' (expected '{}')",
            path.display(),
            found,
            expected
        )));
    }
    Ok(())
}
