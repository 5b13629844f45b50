//! Daily session manager.
//!
//! Owns the live "today" envelope (work hours, goals, code reviews, focus
//! sessions) and the archive of closed days. Closing a day resolves every goal
//! against the task registry at that moment and freezes the result into a
//! [`DailyReport`].

use std::sync::Mutex;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::task::{TaskLookup, TaskStatus};
use crate::timer::FocusSessionSink;

pub const UNKNOWN_TASK_TITLE: &str = "Unknown Task";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GoalKind {
    Task,
    Subtask,
}

/// A task or subtask picked as a goal for today.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyGoal {
    /// Id of the task or subtask itself
    pub id: String,
    /// Owning task; equals `id` for task goals
    pub task_id: String,
    #[serde(rename = "type")]
    pub kind: GoalKind,
}

impl DailyGoal {
    pub fn task(task_id: impl Into<String>) -> Self {
        let task_id = task_id.into();
        Self {
            id: task_id.clone(),
            task_id,
            kind: GoalKind::Task,
        }
    }

    pub fn subtask(task_id: impl Into<String>, subtask_id: impl Into<String>) -> Self {
        Self {
            id: subtask_id.into(),
            task_id: task_id.into(),
            kind: GoalKind::Subtask,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeReview {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub url: String,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FocusSession {
    pub id: String,
    pub task_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl FocusSession {
    pub fn duration_secs(&self) -> i64 {
        (self.end_time - self.start_time).num_seconds().max(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DailySession {
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub desired_end_time: Option<String>,
    #[serde(default)]
    pub actual_end_time: Option<String>,
    /// Calendar day this session belongs to; `None` when no day is open
    #[serde(default)]
    pub current_date: Option<NaiveDate>,
    #[serde(default)]
    pub today_goals: Vec<DailyGoal>,
    #[serde(default)]
    pub code_reviews: Vec<CodeReview>,
    #[serde(default)]
    pub pomodoro_sessions: Vec<FocusSession>,
    #[serde(default)]
    pub rule_of_three: [String; 3],
    #[serde(default)]
    pub summary: Option<String>,
}

impl DailySession {
    pub fn is_open(&self) -> bool {
        self.current_date.is_some() || self.start_time.is_some()
    }
}

/// A goal as it stood when its day was archived.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GoalSnapshot {
    pub id: String,
    pub task_id: String,
    #[serde(rename = "type")]
    pub kind: GoalKind,
    pub title: String,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyReport {
    pub id: String,
    pub date: NaiveDate,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub desired_end_time: Option<String>,
    pub goals: Vec<GoalSnapshot>,
    pub code_reviews: Vec<CodeReview>,
    pub pomodoro_sessions: Vec<FocusSession>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_of_three: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl DailyReport {
    pub fn completed_goals(&self) -> usize {
        self.goals.iter().filter(|goal| goal.completed).count()
    }

    pub fn focus_secs(&self) -> i64 {
        self.pomodoro_sessions
            .iter()
            .map(FocusSession::duration_secs)
            .sum()
    }
}

/// True when an open session belongs to a day other than `today`.
pub fn needs_rollover(current_date: Option<NaiveDate>, today: NaiveDate) -> bool {
    matches!(current_date, Some(date) if date != today)
}

#[derive(Debug, Clone, Default)]
pub struct DailyManager {
    session: DailySession,
    history: Vec<DailyReport>,
}

impl DailyManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(session: DailySession, history: Vec<DailyReport>) -> Self {
        Self { session, history }
    }

    pub fn session(&self) -> &DailySession {
        &self.session
    }

    /// Archived reports, newest first.
    pub fn reports(&self) -> &[DailyReport] {
        &self.history
    }

    pub fn report_for(&self, date: NaiveDate) -> Option<&DailyReport> {
        self.history.iter().find(|report| report.date == date)
    }

    /// Reports dated within `from..=to`, newest first.
    pub fn reports_between(&self, from: NaiveDate, to: NaiveDate) -> Vec<&DailyReport> {
        self.history
            .iter()
            .filter(|report| report.date >= from && report.date <= to)
            .collect()
    }

    pub fn needs_rollover_on(&self, today: NaiveDate) -> bool {
        needs_rollover(self.session.current_date, today)
    }

    pub fn set_start_time(&mut self, time: &str) -> Result<()> {
        self.set_start_time_on(time, Local::now().date_naive())
    }

    /// Set the start time, opening a session dated `today` if none is open.
    pub fn set_start_time_on(&mut self, time: &str, today: NaiveDate) -> Result<()> {
        let time = time.trim();
        if time.is_empty() {
            return Err(Error::Validation("start time cannot be empty".to_string()));
        }
        if self.session.current_date.is_none() {
            self.session.current_date = Some(today);
            info!(date = %today, "daily session opened");
        }
        self.session.start_time = Some(time.to_string());
        Ok(())
    }

    pub fn set_desired_end_time(&mut self, time: Option<String>) {
        self.session.desired_end_time = normalize(time);
    }

    pub fn set_actual_end_time(&mut self, time: Option<String>) {
        self.session.actual_end_time = normalize(time);
    }

    pub fn update_rule_of_three(&mut self, index: usize, text: &str) -> Result<()> {
        let slot = self.session.rule_of_three.get_mut(index).ok_or_else(|| {
            Error::Validation(format!("outcome index must be 1, 2, or 3 (got {})", index + 1))
        })?;
        *slot = text.trim().to_string();
        Ok(())
    }

    pub fn set_summary(&mut self, summary: Option<String>) {
        self.session.summary = normalize(summary);
    }

    /// Add a goal; returns false when a goal with the same id is already present.
    pub fn add_goal(&mut self, goal: DailyGoal) -> bool {
        if self.session.today_goals.iter().any(|g| g.id == goal.id) {
            debug!(goal_id = %goal.id, "goal already selected");
            return false;
        }
        self.session.today_goals.push(goal);
        true
    }

    pub fn remove_goal(&mut self, id: &str) -> Result<DailyGoal> {
        let index = self
            .session
            .today_goals
            .iter()
            .position(|goal| goal.id == id)
            .ok_or_else(|| Error::not_found("goal", id))?;
        Ok(self.session.today_goals.remove(index))
    }

    pub fn add_code_review(&mut self, title: &str, url: Option<&str>) -> Result<CodeReview> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::Validation(
                "code review title cannot be empty".to_string(),
            ));
        }
        let review = CodeReview {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            url: url.map(str::trim).unwrap_or_default().to_string(),
            completed: false,
        };
        self.session.code_reviews.push(review.clone());
        Ok(review)
    }

    pub fn toggle_code_review(&mut self, id: &str) -> Result<bool> {
        let review = self
            .session
            .code_reviews
            .iter_mut()
            .find(|review| review.id == id)
            .ok_or_else(|| Error::not_found("code review", id))?;
        review.completed = !review.completed;
        Ok(review.completed)
    }

    pub fn delete_code_review(&mut self, id: &str) -> Result<CodeReview> {
        let index = self
            .session
            .code_reviews
            .iter()
            .position(|review| review.id == id)
            .ok_or_else(|| Error::not_found("code review", id))?;
        Ok(self.session.code_reviews.remove(index))
    }

    pub fn record_focus_session(
        &mut self,
        task_id: &str,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> FocusSession {
        let session = FocusSession {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            start_time: started_at,
            end_time: ended_at.max(started_at),
        };
        debug!(task_id, "focus session recorded");
        self.session.pomodoro_sessions.push(session.clone());
        session
    }

    pub fn end_day(&mut self, tasks: &impl TaskLookup) -> Option<DailyReport> {
        self.end_day_at(tasks, Local::now())
    }

    /// Archive the open session as of `now` and reset for the next day.
    ///
    /// Returns `None` when no session was open; the reset still happens.
    pub fn end_day_at(
        &mut self,
        tasks: &impl TaskLookup,
        now: DateTime<Local>,
    ) -> Option<DailyReport> {
        let report = self
            .session
            .is_open()
            .then(|| build_report(&self.session, tasks, now));

        let carried: Vec<CodeReview> = self
            .session
            .code_reviews
            .drain(..)
            .filter(|review| !review.completed)
            .collect();
        self.session = DailySession {
            code_reviews: carried,
            ..DailySession::default()
        };

        if let Some(report) = &report {
            info!(
                date = %report.date,
                goals = report.goals.len(),
                focus_sessions = report.pomodoro_sessions.len(),
                "day archived"
            );
            self.history.insert(0, report.clone());
        } else {
            debug!("no open session to archive");
        }
        report
    }

    /// Same transition as [`end_day`](Self::end_day), used on date rollover.
    pub fn start_day(&mut self, tasks: &impl TaskLookup) -> Option<DailyReport> {
        self.end_day(tasks)
    }

    /// The report `end_day_at` would produce right now, without archiving.
    pub fn preview_report_at(
        &self,
        tasks: &impl TaskLookup,
        now: DateTime<Local>,
    ) -> Option<DailyReport> {
        self.session
            .is_open()
            .then(|| build_report(&self.session, tasks, now))
    }
}

impl FocusSessionSink for Mutex<DailyManager> {
    fn record_focus_session(
        &self,
        task_id: &str,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut manager = self
            .lock()
            .map_err(|_| Error::OperationFailed("daily manager lock poisoned".to_string()))?;
        manager.record_focus_session(task_id, started_at, ended_at);
        Ok(())
    }
}

fn build_report(
    session: &DailySession,
    tasks: &impl TaskLookup,
    now: DateTime<Local>,
) -> DailyReport {
    DailyReport {
        id: Uuid::new_v4().to_string(),
        date: session.current_date.unwrap_or_else(|| now.date_naive()),
        start_time: session.start_time.clone(),
        end_time: Some(
            session
                .actual_end_time
                .clone()
                .unwrap_or_else(|| now.format("%H:%M").to_string()),
        ),
        desired_end_time: session.desired_end_time.clone(),
        goals: session
            .today_goals
            .iter()
            .map(|goal| resolve_goal(goal, tasks))
            .collect(),
        code_reviews: session
            .code_reviews
            .iter()
            .filter(|review| review.completed)
            .cloned()
            .collect(),
        pomodoro_sessions: session.pomodoro_sessions.clone(),
        rule_of_three: session
            .rule_of_three
            .iter()
            .filter(|item| !item.trim().is_empty())
            .cloned()
            .collect(),
        summary: session.summary.clone(),
    }
}

fn resolve_goal(goal: &DailyGoal, tasks: &impl TaskLookup) -> GoalSnapshot {
    let task = tasks.find_task(&goal.task_id);
    let resolved = match goal.kind {
        GoalKind::Task => task.map(|task| (task.title.clone(), task.status == TaskStatus::Done)),
        GoalKind::Subtask => task.and_then(|task| {
            task.subtask(&goal.id).map(|sub| {
                (
                    format!("{} (via {})", sub.title, task.title),
                    sub.completed,
                )
            })
        }),
    };
    let (title, completed) =
        resolved.unwrap_or_else(|| (UNKNOWN_TASK_TITLE.to_string(), false));

    GoalSnapshot {
        id: goal.id.clone(),
        task_id: goal.task_id.clone(),
        kind: goal.kind,
        title,
        completed,
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{NewTask, TaskPatch, TaskRegistry};
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .earliest()
            .expect("local time")
    }

    #[test]
    fn set_start_time_opens_session_once() {
        let mut daily = DailyManager::new();
        daily.set_start_time_on("09:00", day(2024, 3, 4)).expect("start");
        assert_eq!(daily.session().current_date, Some(day(2024, 3, 4)));

        daily.set_start_time_on("09:30", day(2024, 3, 5)).expect("update");
        assert_eq!(daily.session().current_date, Some(day(2024, 3, 4)));
        assert_eq!(daily.session().start_time.as_deref(), Some("09:30"));

        assert!(matches!(
            daily.set_start_time_on(" ", day(2024, 3, 5)),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn goals_have_set_semantics() {
        let mut daily = DailyManager::new();
        let before = daily.session().today_goals.clone();

        assert!(daily.add_goal(DailyGoal::task("t1")));
        assert!(!daily.add_goal(DailyGoal::task("t1")));
        assert_eq!(daily.session().today_goals.len(), 1);

        daily.remove_goal("t1").expect("remove");
        assert_eq!(daily.session().today_goals, before);
        assert!(matches!(
            daily.remove_goal("t1"),
            Err(Error::NotFound { kind: "goal", .. })
        ));
    }

    #[test]
    fn end_day_resolves_goals_at_archival_time() {
        let mut tasks = TaskRegistry::new();
        let done = tasks
            .create_task(NewTask::new("FE-1", "Fix bug", TaskStatus::Todo))
            .expect("task");
        let open = tasks
            .create_task(NewTask::new("FE-2", "Refactor", TaskStatus::InProgress))
            .expect("task");
        let sub = tasks.add_subtask(&open.id, "extract module").expect("sub");
        tasks.toggle_subtask(&open.id, &sub.id).expect("toggle");

        let mut daily = DailyManager::new();
        daily.set_start_time_on("09:00", day(2024, 3, 4)).expect("start");
        daily.add_goal(DailyGoal::task(&done.id));
        daily.add_goal(DailyGoal::subtask(&open.id, &sub.id));
        daily.add_goal(DailyGoal::task("gone"));

        tasks
            .update_task(&done.id, TaskPatch::status(TaskStatus::Done))
            .expect("done");

        let report = daily
            .end_day_at(&tasks, local(2024, 3, 4, 17, 45))
            .expect("report");

        assert_eq!(report.date, day(2024, 3, 4));
        assert_eq!(report.end_time.as_deref(), Some("17:45"));
        assert_eq!(report.goals[0].title, "Fix bug");
        assert!(report.goals[0].completed);
        assert_eq!(report.goals[1].title, "extract module (via Refactor)");
        assert!(report.goals[1].completed);
        assert_eq!(report.goals[2].title, UNKNOWN_TASK_TITLE);
        assert!(!report.goals[2].completed);

        tasks.delete_task(&done.id).expect("delete");
        assert_eq!(daily.reports()[0].goals[0].title, "Fix bug");
    }

    #[test]
    fn end_day_twice_archives_once() {
        let tasks = TaskRegistry::new();
        let mut daily = DailyManager::new();
        daily.set_start_time_on("08:00", day(2024, 3, 4)).expect("start");

        assert!(daily.end_day(&tasks).is_some());
        assert!(daily.end_day(&tasks).is_none());
        assert_eq!(daily.reports().len(), 1);
        assert!(!daily.session().is_open());
    }

    #[test]
    fn completed_reviews_archive_and_pending_carry_over() {
        let tasks = TaskRegistry::new();
        let mut daily = DailyManager::new();
        daily.set_start_time_on("09:00", day(2024, 3, 4)).expect("start");
        let done = daily.add_code_review("PR #1", Some("")).expect("review");
        daily.add_code_review("PR #2", None).expect("review");
        daily.toggle_code_review(&done.id).expect("toggle");

        let report = daily.end_day(&tasks).expect("report");
        assert_eq!(report.code_reviews.len(), 1);
        assert_eq!(report.code_reviews[0].title, "PR #1");
        assert!(report.code_reviews[0].completed);

        let live = &daily.session().code_reviews;
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].title, "PR #2");
        assert!(!live[0].completed);
    }

    #[test]
    fn end_day_resets_session_scoped_fields() {
        let tasks = TaskRegistry::new();
        let mut daily = DailyManager::new();
        daily.set_start_time_on("09:00", day(2024, 3, 4)).expect("start");
        daily.set_desired_end_time(Some("17:00".to_string()));
        daily.set_actual_end_time(Some("18:10".to_string()));
        daily.update_rule_of_three(0, "ship FE-1").expect("outcome");
        daily.set_summary(Some("good day".to_string()));
        let now = Utc::now();
        daily.record_focus_session("t1", now - chrono::Duration::minutes(25), now);

        let report = daily.end_day(&tasks).expect("report");
        assert_eq!(report.end_time.as_deref(), Some("18:10"));
        assert_eq!(report.desired_end_time.as_deref(), Some("17:00"));
        assert_eq!(report.rule_of_three, vec!["ship FE-1".to_string()]);
        assert_eq!(report.summary.as_deref(), Some("good day"));
        assert_eq!(report.focus_secs(), 25 * 60);

        assert_eq!(daily.session(), &DailySession::default());
    }

    #[test]
    fn rule_of_three_rejects_out_of_range_index() {
        let mut daily = DailyManager::new();
        assert!(matches!(
            daily.update_rule_of_three(3, "nope"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn review_operations_report_missing_ids() {
        let mut daily = DailyManager::new();
        assert!(daily.add_code_review("  ", None).is_err());
        assert!(matches!(
            daily.toggle_code_review("missing"),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            daily.delete_code_review("missing"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn rollover_predicate() {
        assert!(!needs_rollover(None, day(2024, 3, 4)));
        assert!(!needs_rollover(Some(day(2024, 3, 4)), day(2024, 3, 4)));
        assert!(needs_rollover(Some(day(2024, 3, 3)), day(2024, 3, 4)));
    }

    #[test]
    fn report_queries_filter_by_date() {
        let tasks = TaskRegistry::new();
        let mut daily = DailyManager::new();
        for d in 1..=3 {
            daily.set_start_time_on("09:00", day(2024, 3, d)).expect("start");
            daily.end_day(&tasks).expect("report");
        }

        assert_eq!(daily.reports()[0].date, day(2024, 3, 3));
        assert!(daily.report_for(day(2024, 3, 2)).is_some());
        assert!(daily.report_for(day(2024, 3, 9)).is_none());
        let range = daily.reports_between(day(2024, 3, 2), day(2024, 3, 3));
        assert_eq!(range.len(), 2);
    }

    #[test]
    fn preview_does_not_archive() {
        let tasks = TaskRegistry::new();
        let mut daily = DailyManager::new();
        assert!(daily.preview_report_at(&tasks, Local::now()).is_none());

        daily.set_start_time_on("09:00", day(2024, 3, 4)).expect("start");
        let preview = daily
            .preview_report_at(&tasks, local(2024, 3, 4, 12, 0))
            .expect("preview");
        assert_eq!(preview.end_time.as_deref(), Some("12:00"));
        assert!(daily.reports().is_empty());
        assert!(daily.session().is_open());
    }
}
