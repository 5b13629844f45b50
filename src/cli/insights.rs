//! devday notifications and metrics commands

use chrono::Utc;
use serde::Serialize;

use crate::error::Result;
use crate::metrics::{compute_metrics, MetricsRange, MetricsReport};
use crate::notify::{refresh_notifications, AppNotification, Severity};
use crate::output::{format_duration, HumanOutput};

use super::{today, Context};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationList {
    notifications: Vec<AppNotification>,
    critical: usize,
    warning: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetricsOutput {
    range: String,
    #[serde(flatten)]
    metrics: MetricsReport,
}

pub(super) fn run_notifications(ctx: &Context) -> Result<()> {
    let ws = ctx.open()?;
    let notifications = {
        let registry = ws.tasks()?;
        refresh_notifications(
            registry.tasks(),
            Utc::now(),
            today(),
            &ws.config().notifications,
        )
    };

    let critical = notifications
        .iter()
        .filter(|n| n.severity == Severity::Critical)
        .count();
    let warning = notifications.len() - critical;

    let header = if notifications.is_empty() {
        "No notifications".to_string()
    } else {
        format!("Notifications: {critical} critical, {warning} warning")
    };
    let mut human = HumanOutput::new(header);
    for note in &notifications {
        let level = match note.severity {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
        };
        human.push_detail(format!("{level} {}: {}", note.task_code, note.message));
    }

    ctx.emit(
        "notifications",
        &NotificationList {
            notifications,
            critical,
            warning,
        },
        &human,
    )
}

pub(super) fn run_metrics(ctx: &Context, range: &str) -> Result<()> {
    let range = range.parse::<MetricsRange>()?;
    let ws = ctx.open()?;
    let metrics = compute_metrics(ws.tasks()?.tasks(), range, Utc::now());

    let mut human = HumanOutput::new(format!("Metrics ({range})"));
    human.push_summary("completed", metrics.completed_count.to_string());
    human.push_summary("created", metrics.created_count.to_string());
    human.push_summary(
        "avg cycle time",
        match metrics.avg_cycle_days {
            Some(days) => format!("{days:.1} days"),
            None => "n/a".to_string(),
        },
    );
    human.push_summary("refinement rate", format!("{}%", metrics.refinement_rate));
    human.push_summary(
        "pomodoro efficiency",
        format!("{}%", metrics.pomodoro_efficiency),
    );
    human.push_summary("focus time", format_duration(metrics.focus_secs));
    for (status, count) in &metrics.status_counts {
        human.push_detail(format!("{status}: {count}"));
    }

    ctx.emit(
        "metrics",
        &MetricsOutput {
            range: range.to_string(),
            metrics,
        },
        &human,
    )
}
