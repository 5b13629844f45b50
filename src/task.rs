//! Task registry for devday.
//!
//! The registry is the only writer of [`Task`] values. Every mutation goes
//! through one of its operations, which keeps the completed-date invariant,
//! refreshes `last_updated`, and appends to the newest-first history log.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::timer::TaskTimeSink;

pub const CREATED_ACTION: &str = "Task created";
pub const UPDATED_ACTION: &str = "Task updated";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Todo,
    #[serde(rename = "In-Progress")]
    InProgress,
    Blocked,
    Waiting,
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Blocked,
        TaskStatus::Waiting,
        TaskStatus::Done,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "Todo",
            TaskStatus::InProgress => "In-Progress",
            TaskStatus::Blocked => "Blocked",
            TaskStatus::Waiting => "Waiting",
            TaskStatus::Done => "Done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|ch| !matches!(ch, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "todo" => Ok(TaskStatus::Todo),
            "inprogress" => Ok(TaskStatus::InProgress),
            "blocked" => Ok(TaskStatus::Blocked),
            "waiting" => Ok(TaskStatus::Waiting),
            "done" => Ok(TaskStatus::Done),
            _ => Err(Error::InvalidArgument(format!(
                "unknown task status '{}' (expected todo, in-progress, blocked, waiting, done)",
                s.trim()
            ))),
        }
    }
}

/// Urgency/importance bucket. Carried on the task, no behavior attached.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum EisenhowerQuad {
    Do,
    Decide,
    Delegate,
    Delete,
    #[default]
    None,
}

impl FromStr for EisenhowerQuad {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "do" => Ok(EisenhowerQuad::Do),
            "decide" => Ok(EisenhowerQuad::Decide),
            "delegate" => Ok(EisenhowerQuad::Delegate),
            "delete" => Ok(EisenhowerQuad::Delete),
            "none" => Ok(EisenhowerQuad::None),
            other => Err(Error::InvalidArgument(format!(
                "unknown quadrant '{other}' (expected do, decide, delegate, delete, none)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskDates {
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_date: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

/// The planning triad that decides whether a task is ready to work on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Refinement {
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub technical_analysis: String,
    #[serde(default)]
    pub testing_strategy: String,
}

impl Refinement {
    pub fn is_complete(&self) -> bool {
        !self.goal.trim().is_empty()
            && !self.technical_analysis.trim().is_empty()
            && !self.testing_strategy.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subtask {
    pub id: String,
    pub title: String,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PomodoroStats {
    #[serde(default)]
    pub estimated: u32,
    #[serde(default)]
    pub actual: u32,
    /// Total focused seconds tracked against this task
    #[serde(default)]
    pub time_spent: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub code: String,
    pub title: String,
    pub status: TaskStatus,
    pub dates: TaskDates,
    #[serde(default)]
    pub refinement: Refinement,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub eisenhower_quad: EisenhowerQuad,
    #[serde(default)]
    pub pomodoro: PomodoroStats,
}

impl Task {
    pub fn subtask(&self, subtask_id: &str) -> Option<&Subtask> {
        self.subtasks.iter().find(|sub| sub.id == subtask_id)
    }

    /// Timestamp of the creation entry, which is always the oldest history item.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.history
            .last()
            .filter(|entry| entry.action == CREATED_ACTION)
            .map(|entry| entry.timestamp)
    }

    fn touch(&mut self) -> DateTime<Utc> {
        let now = std::cmp::max(Utc::now(), self.dates.last_updated);
        self.dates.last_updated = now;
        now
    }

    fn record(&mut self, now: DateTime<Utc>, action: impl Into<String>) {
        self.history.insert(
            0,
            HistoryEntry {
                timestamp: now,
                action: action.into(),
            },
        );
    }
}

/// Input for [`TaskRegistry::create_task`].
#[derive(Debug, Clone)]
pub struct NewTask {
    pub code: String,
    pub title: String,
    pub status: TaskStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
}

impl NewTask {
    pub fn new(code: impl Into<String>, title: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            code: code.into(),
            title: title.into(),
            status,
            start_date: None,
            due_date: None,
        }
    }
}

/// Partial update for the `dates` object.
///
/// The outer `Option` means "leave as is", the inner one allows clearing.
/// `completed_date` is absent on purpose: it follows `status`.
#[derive(Debug, Clone, Default)]
pub struct DatesPatch {
    pub start_date: Option<Option<DateTime<Utc>>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Default)]
pub struct RefinementPatch {
    pub goal: Option<String>,
    pub technical_analysis: Option<String>,
    pub testing_strategy: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PomodoroPatch {
    pub estimated: Option<u32>,
    pub actual: Option<u32>,
    pub time_spent: Option<u64>,
}

/// Partial update for [`TaskRegistry::update_task`].
///
/// Top-level fields replace; `dates`, `refinement` and `pomodoro` merge key by
/// key. Subtasks, notes and history only change through their own operations.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub code: Option<String>,
    pub title: Option<String>,
    pub status: Option<TaskStatus>,
    pub eisenhower_quad: Option<EisenhowerQuad>,
    pub dates: Option<DatesPatch>,
    pub refinement: Option<RefinementPatch>,
    pub pomodoro: Option<PomodoroPatch>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Read access to tasks by id, used when archiving a day.
pub trait TaskLookup {
    fn find_task(&self, id: &str) -> Option<&Task>;
}

#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: Vec<Task>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn list(&self, status: Option<TaskStatus>) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|task| status.map_or(true, |status| task.status == status))
            .collect()
    }

    pub fn find_subtask(&self, task_id: &str, subtask_id: &str) -> Option<&Subtask> {
        self.get(task_id).and_then(|task| task.subtask(subtask_id))
    }

    /// Resolve user input to a task id: exact id, exact code, or unique id prefix.
    pub fn resolve(&self, input: &str) -> Result<String> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidArgument("task id cannot be empty".to_string()));
        }

        if let Some(task) = self.get(trimmed) {
            return Ok(task.id.clone());
        }

        let by_code: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|task| task.code.eq_ignore_ascii_case(trimmed))
            .collect();
        match by_code.as_slice() {
            [task] => return Ok(task.id.clone()),
            [] => {}
            many => {
                return Err(Error::InvalidArgument(format!(
                    "ambiguous task code '{}': {}",
                    trimmed,
                    many.iter()
                        .map(|task| task.id.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )))
            }
        }

        let prefix = trimmed.to_ascii_lowercase();
        let mut matches: Vec<&str> = self
            .tasks
            .iter()
            .filter(|task| task.id.starts_with(&prefix))
            .map(|task| task.id.as_str())
            .collect();
        matches.sort_unstable();
        match matches.as_slice() {
            [id] => Ok(id.to_string()),
            [] => Err(Error::not_found("task", trimmed)),
            many => Err(Error::InvalidArgument(format!(
                "ambiguous task id '{}': {}",
                trimmed,
                many.join(", ")
            ))),
        }
    }

    pub fn create_task(&mut self, input: NewTask) -> Result<Task> {
        let code = required("code", &input.code)?;
        let title = required("title", &input.title)?;

        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4().to_string(),
            code,
            title,
            status: input.status,
            dates: TaskDates {
                start_date: input.start_date,
                due_date: input.due_date,
                completed_date: (input.status == TaskStatus::Done).then_some(now),
                last_updated: now,
            },
            refinement: Refinement::default(),
            subtasks: Vec::new(),
            notes: Vec::new(),
            history: vec![HistoryEntry {
                timestamp: now,
                action: CREATED_ACTION.to_string(),
            }],
            eisenhower_quad: EisenhowerQuad::None,
            pomodoro: PomodoroStats::default(),
        };

        debug!(task_id = %task.id, code = %task.code, "task created");
        self.tasks.insert(0, task.clone());
        Ok(task)
    }

    pub fn update_task(&mut self, id: &str, patch: TaskPatch) -> Result<Task> {
        let code = patch
            .code
            .as_deref()
            .map(|value| required("code", value))
            .transpose()?;
        let title = patch
            .title
            .as_deref()
            .map(|value| required("title", value))
            .transpose()?;

        let task = self.get_mut(id)?;
        let now = task.touch();

        let status_changed = patch.status.filter(|status| *status != task.status);

        if let Some(code) = code {
            task.code = code;
        }
        if let Some(title) = title {
            task.title = title;
        }
        if let Some(quad) = patch.eisenhower_quad {
            task.eisenhower_quad = quad;
        }
        if let Some(dates) = patch.dates {
            if let Some(start) = dates.start_date {
                task.dates.start_date = start;
            }
            if let Some(due) = dates.due_date {
                task.dates.due_date = due;
            }
        }
        if let Some(refinement) = patch.refinement {
            if let Some(goal) = refinement.goal {
                task.refinement.goal = goal;
            }
            if let Some(analysis) = refinement.technical_analysis {
                task.refinement.technical_analysis = analysis;
            }
            if let Some(testing) = refinement.testing_strategy {
                task.refinement.testing_strategy = testing;
            }
        }
        if let Some(pomodoro) = patch.pomodoro {
            if let Some(estimated) = pomodoro.estimated {
                task.pomodoro.estimated = estimated;
            }
            if let Some(actual) = pomodoro.actual {
                task.pomodoro.actual = actual;
            }
            if let Some(time_spent) = pomodoro.time_spent {
                task.pomodoro.time_spent = time_spent;
            }
        }

        match status_changed {
            Some(status) => {
                task.status = status;
                if status == TaskStatus::Done {
                    task.dates.completed_date.get_or_insert(now);
                } else {
                    task.dates.completed_date = None;
                }
                task.record(now, format!("Status changed to {status}"));
                debug!(task_id = %task.id, %status, "task status changed");
            }
            None => task.record(now, UPDATED_ACTION),
        }

        Ok(task.clone())
    }

    pub fn delete_task(&mut self, id: &str) -> Result<Task> {
        let index = self
            .tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or_else(|| Error::not_found("task", id))?;
        let removed = self.tasks.remove(index);
        debug!(task_id = %id, "task deleted");
        Ok(removed)
    }

    pub fn add_subtask(&mut self, task_id: &str, title: &str) -> Result<Subtask> {
        let title = required("subtask title", title)?;
        let task = self.get_mut(task_id)?;
        let subtask = Subtask {
            id: Uuid::new_v4().to_string(),
            title,
            completed: false,
        };
        task.subtasks.push(subtask.clone());
        task.touch();
        Ok(subtask)
    }

    /// Flip a subtask's completion flag and return the new value.
    pub fn toggle_subtask(&mut self, task_id: &str, subtask_id: &str) -> Result<bool> {
        let task = self.get_mut(task_id)?;
        let subtask = task
            .subtasks
            .iter_mut()
            .find(|sub| sub.id == subtask_id)
            .ok_or_else(|| Error::not_found("subtask", subtask_id))?;
        subtask.completed = !subtask.completed;
        let completed = subtask.completed;
        task.touch();
        Ok(completed)
    }

    pub fn delete_subtask(&mut self, task_id: &str, subtask_id: &str) -> Result<()> {
        let task = self.get_mut(task_id)?;
        let before = task.subtasks.len();
        task.subtasks.retain(|sub| sub.id != subtask_id);
        if task.subtasks.len() == before {
            return Err(Error::not_found("subtask", subtask_id));
        }
        task.touch();
        Ok(())
    }

    pub fn add_note(&mut self, task_id: &str, content: &str) -> Result<Note> {
        if content.trim().is_empty() {
            return Err(Error::Validation("note content cannot be empty".to_string()));
        }
        let task = self.get_mut(task_id)?;
        let now = task.touch();
        let note = Note {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            created_at: now,
        };
        task.notes.push(note.clone());
        Ok(note)
    }

    pub fn increment_pomodoro(&mut self, task_id: &str) -> Result<u32> {
        let task = self.get_mut(task_id)?;
        task.pomodoro.actual += 1;
        task.touch();
        Ok(task.pomodoro.actual)
    }

    /// Add focused seconds on top of whatever is currently stored.
    pub fn add_time_spent(&mut self, task_id: &str, delta_seconds: u64) -> Result<u64> {
        let task = self.get_mut(task_id)?;
        task.pomodoro.time_spent = task.pomodoro.time_spent.saturating_add(delta_seconds);
        task.touch();
        Ok(task.pomodoro.time_spent)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Task> {
        self.tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| Error::not_found("task", id))
    }
}

impl TaskLookup for TaskRegistry {
    fn find_task(&self, id: &str) -> Option<&Task> {
        self.get(id)
    }
}

impl TaskTimeSink for Mutex<TaskRegistry> {
    fn add_time_spent(&self, task_id: &str, delta_seconds: u64) -> Result<()> {
        let mut registry = self
            .lock()
            .map_err(|_| Error::OperationFailed("task registry lock poisoned".to_string()))?;
        registry.add_time_spent(task_id, delta_seconds).map(|_| ())
    }

    fn increment_pomodoro(&self, task_id: &str) -> Result<()> {
        let mut registry = self
            .lock()
            .map_err(|_| Error::OperationFailed("task registry lock poisoned".to_string()))?;
        registry.increment_pomodoro(task_id).map(|_| ())
    }
}

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}
