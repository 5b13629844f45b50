//! Derived alerts over the task list.
//!
//! Nothing here is stored: notifications are recomputed from current task
//! state every time they are asked for.

use std::fmt;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;

use crate::config::NotificationConfig;
use crate::task::{Task, TaskStatus};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum CompletionStatus {
    #[serde(rename = "On-Track")]
    OnTrack,
    #[serde(rename = "At-Risk")]
    AtRisk,
    Overdue,
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompletionStatus::OnTrack => "On-Track",
            CompletionStatus::AtRisk => "At-Risk",
            CompletionStatus::Overdue => "Overdue",
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum NotificationType {
    Staleness,
    RefinementDebt,
    Deadline,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppNotification {
    pub id: String,
    pub task_id: String,
    pub task_code: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub message: String,
    pub severity: Severity,
}

impl AppNotification {
    fn new(
        task: &Task,
        suffix: &str,
        kind: NotificationType,
        message: String,
        severity: Severity,
    ) -> Self {
        Self {
            id: format!("{}-{}", task.id, suffix),
            task_id: task.id.clone(),
            task_code: task.code.clone(),
            kind,
            message,
            severity,
        }
    }
}

/// Deadline standing of `task` relative to the calendar day `today`.
pub fn completion_status(task: &Task, today: NaiveDate, at_risk_days: i64) -> CompletionStatus {
    if task.status == TaskStatus::Done {
        return CompletionStatus::OnTrack;
    }
    let Some(due) = task.dates.due_date else {
        return CompletionStatus::OnTrack;
    };

    let diff_days = (due.date_naive() - today).num_days();
    if diff_days < 0 {
        CompletionStatus::Overdue
    } else if diff_days <= at_risk_days {
        CompletionStatus::AtRisk
    } else {
        CompletionStatus::OnTrack
    }
}

pub fn get_completion_status(task: &Task) -> CompletionStatus {
    completion_status(
        task,
        Local::now().date_naive(),
        NotificationConfig::default().at_risk_days,
    )
}

pub fn refresh_notifications(
    tasks: &[Task],
    now: DateTime<Utc>,
    today: NaiveDate,
    config: &NotificationConfig,
) -> Vec<AppNotification> {
    let mut notifications = Vec::new();

    for task in tasks {
        if task.status != TaskStatus::Done
            && (now - task.dates.last_updated).num_seconds() > config.stale_after_days * 86_400
        {
            notifications.push(AppNotification::new(
                task,
                "stale",
                NotificationType::Staleness,
                format!("No updates in {}+ days", config.stale_after_days),
                Severity::Warning,
            ));
        }

        if task.status == TaskStatus::InProgress && !task.refinement.is_complete() {
            notifications.push(AppNotification::new(
                task,
                "refinement",
                NotificationType::RefinementDebt,
                "In-Progress but unrefined".to_string(),
                Severity::Critical,
            ));
        }

        match completion_status(task, today, config.at_risk_days) {
            CompletionStatus::Overdue => notifications.push(AppNotification::new(
                task,
                "overdue",
                NotificationType::Deadline,
                "Overdue".to_string(),
                Severity::Critical,
            )),
            CompletionStatus::AtRisk => notifications.push(AppNotification::new(
                task,
                "atrisk",
                NotificationType::Deadline,
                "Due soon".to_string(),
                Severity::Warning,
            )),
            CompletionStatus::OnTrack => {}
        }
    }

    notifications
}

pub fn refresh_notifications_now(tasks: &[Task]) -> Vec<AppNotification> {
    refresh_notifications(
        tasks,
        Utc::now(),
        Local::now().date_naive(),
        &NotificationConfig::default(),
    )
}
