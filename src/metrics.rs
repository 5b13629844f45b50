//! Throughput and health numbers over the task list.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::task::{Task, TaskStatus};

const IN_PROGRESS_ACTION: &str = "Status changed to In-Progress";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsRange {
    Days(u32),
    All,
}

impl MetricsRange {
    pub fn start(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            MetricsRange::Days(days) => Some(now - Duration::days(i64::from(days))),
            MetricsRange::All => None,
        }
    }
}

impl Default for MetricsRange {
    fn default() -> Self {
        MetricsRange::Days(30)
    }
}

impl fmt::Display for MetricsRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricsRange::Days(days) => write!(f, "last {days} days"),
            MetricsRange::All => f.write_str("all time"),
        }
    }
}

impl FromStr for MetricsRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().to_ascii_lowercase();
        if trimmed == "all" {
            return Ok(MetricsRange::All);
        }
        let digits = trimmed.strip_suffix('d').unwrap_or(&trimmed);
        match digits.parse::<u32>() {
            Ok(days) if days > 0 => Ok(MetricsRange::Days(days)),
            _ => Err(Error::InvalidArgument(format!(
                "invalid range '{}' (expected a day count like 7, 30, 90, or 'all')",
                s.trim()
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub completed_count: usize,
    pub created_count: usize,
    /// Mean whole days from first In-Progress (or start date) to completion
    pub avg_cycle_days: Option<f64>,
    /// Percent of open tasks whose refinement is complete
    pub refinement_rate: u32,
    /// Actual over estimated pomodoros for completed tasks, in percent
    pub pomodoro_efficiency: u32,
    pub status_counts: BTreeMap<String, usize>,
    pub total_tasks: usize,
    pub focus_secs: u64,
}

pub fn compute_metrics(tasks: &[Task], range: MetricsRange, now: DateTime<Utc>) -> MetricsReport {
    let start = range.start(now);
    let in_range = |at: Option<DateTime<Utc>>| match (at, start) {
        (Some(at), Some(start)) => at > start,
        (Some(_), None) => true,
        (None, _) => false,
    };

    let completed: Vec<&Task> = tasks
        .iter()
        .filter(|task| task.status == TaskStatus::Done && in_range(task.dates.completed_date))
        .collect();

    let created_count = tasks
        .iter()
        .filter(|task| in_range(task.created_at().or(task.dates.start_date)))
        .count();

    let cycles: Vec<i64> = completed
        .iter()
        .filter_map(|task| {
            let done = task.dates.completed_date.unwrap_or(now);
            let began = task
                .history
                .iter()
                .rev()
                .find(|entry| entry.action.contains(IN_PROGRESS_ACTION))
                .map(|entry| entry.timestamp)
                .or(task.dates.start_date)?;
            Some((done - began).num_days().max(0))
        })
        .collect();
    let avg_cycle_days = (!cycles.is_empty())
        .then(|| cycles.iter().sum::<i64>() as f64 / cycles.len() as f64);

    let open: Vec<&Task> = tasks
        .iter()
        .filter(|task| task.status != TaskStatus::Done)
        .collect();
    let refined = open
        .iter()
        .filter(|task| task.refinement.is_complete())
        .count();
    let refinement_rate = if open.is_empty() {
        100
    } else {
        percent(refined as u64, open.len() as u64)
    };

    let (estimated, actual) = completed
        .iter()
        .filter(|task| task.pomodoro.estimated > 0)
        .fold((0u64, 0u64), |(est, act), task| {
            (
                est + u64::from(task.pomodoro.estimated),
                act + u64::from(task.pomodoro.actual),
            )
        });
    let pomodoro_efficiency = if estimated > 0 {
        percent(actual, estimated)
    } else {
        0
    };

    let status_counts = TaskStatus::ALL
        .iter()
        .map(|status| {
            (
                status.to_string(),
                tasks.iter().filter(|task| task.status == *status).count(),
            )
        })
        .collect();

    MetricsReport {
        completed_count: completed.len(),
        created_count,
        avg_cycle_days,
        refinement_rate,
        pomodoro_efficiency,
        status_counts,
        total_tasks: tasks.len(),
        focus_secs: tasks.iter().map(|task| task.pomodoro.time_spent).sum(),
    }
}

fn percent(part: u64, whole: u64) -> u32 {
    ((part as f64 / whole as f64) * 100.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{HistoryEntry, NewTask, PomodoroPatch, TaskPatch, TaskRegistry};

    #[test]
    fn range_parsing() {
        assert_eq!("7".parse::<MetricsRange>().unwrap(), MetricsRange::Days(7));
        assert_eq!("90d".parse::<MetricsRange>().unwrap(), MetricsRange::Days(90));
        assert_eq!("ALL".parse::<MetricsRange>().unwrap(), MetricsRange::All);
        assert!("0".parse::<MetricsRange>().is_err());
        assert!("soon".parse::<MetricsRange>().is_err());
    }

    #[test]
    fn empty_registry_defaults() {
        let report = compute_metrics(&[], MetricsRange::All, Utc::now());
        assert_eq!(report.total_tasks, 0);
        assert_eq!(report.refinement_rate, 100);
        assert_eq!(report.pomodoro_efficiency, 0);
        assert!(report.avg_cycle_days.is_none());
        assert_eq!(report.status_counts.len(), 5);
    }

    #[test]
    fn counts_completed_created_and_efficiency() {
        let mut registry = TaskRegistry::new();
        let a = registry
            .create_task(NewTask::new("A-1", "first", TaskStatus::Todo))
            .unwrap();
        registry
            .create_task(NewTask::new("A-2", "second", TaskStatus::Todo))
            .unwrap();

        registry
            .update_task(
                &a.id,
                TaskPatch {
                    pomodoro: Some(PomodoroPatch {
                        estimated: Some(4),
                        ..PomodoroPatch::default()
                    }),
                    ..TaskPatch::default()
                },
            )
            .unwrap();
        registry.increment_pomodoro(&a.id).unwrap();
        registry.increment_pomodoro(&a.id).unwrap();
        registry.add_time_spent(&a.id, 3000).unwrap();
        registry
            .update_task(&a.id, TaskPatch::status(TaskStatus::Done))
            .unwrap();

        let report = compute_metrics(registry.tasks(), MetricsRange::Days(7), Utc::now());
        assert_eq!(report.completed_count, 1);
        assert_eq!(report.created_count, 2);
        assert_eq!(report.pomodoro_efficiency, 50);
        assert_eq!(report.refinement_rate, 0);
        assert_eq!(report.status_counts["Done"], 1);
        assert_eq!(report.status_counts["Todo"], 1);
        assert_eq!(report.focus_secs, 3000);
    }

    #[test]
    fn cycle_time_uses_oldest_in_progress_entry() {
        let now = Utc::now();
        let mut registry = TaskRegistry::new();
        let mut task = registry
            .create_task(NewTask::new("C-1", "cycle", TaskStatus::Done))
            .unwrap();
        task.dates.completed_date = Some(now);
        task.history = vec![
            HistoryEntry {
                timestamp: now - Duration::days(1),
                action: IN_PROGRESS_ACTION.to_string(),
            },
            HistoryEntry {
                timestamp: now - Duration::days(4),
                action: IN_PROGRESS_ACTION.to_string(),
            },
            HistoryEntry {
                timestamp: now - Duration::days(5),
                action: crate::task::CREATED_ACTION.to_string(),
            },
        ];

        let report = compute_metrics(&[task], MetricsRange::Days(30), now);
        assert_eq!(report.avg_cycle_days, Some(4.0));
        assert_eq!(report.created_count, 1);
    }

    #[test]
    fn old_completions_fall_outside_range() {
        let now = Utc::now();
        let mut registry = TaskRegistry::new();
        let mut task = registry
            .create_task(NewTask::new("O-1", "old", TaskStatus::Done))
            .unwrap();
        task.dates.completed_date = Some(now - Duration::days(40));
        task.history[0].timestamp = now - Duration::days(50);

        let tasks = [task];
        assert_eq!(compute_metrics(&tasks, MetricsRange::Days(30), now).completed_count, 0);
        assert_eq!(compute_metrics(&tasks, MetricsRange::All, now).completed_count, 1);
        assert_eq!(compute_metrics(&tasks, MetricsRange::Days(30), now).created_count, 0);
    }
}
