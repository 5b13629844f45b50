//! devday day command implementation
//!
//! Edits today's session and reads the archive of closed days.

use chrono::Local;
use serde::Serialize;

use crate::daily::{DailyGoal, DailyReport, DailySession, GoalKind};
use crate::error::{Error, Result};
use crate::output::{format_duration, HumanOutput};
use crate::workspace::Workspace;

use super::{parse_date, Context, DayCommands, GoalCommands, ReviewCommands};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DayStatus<'a> {
    session: &'a DailySession,
    /// What archiving right now would record
    preview: Option<DailyReport>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EndReport {
    archived: Option<DailyReport>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoalReport {
    goal: DailyGoal,
    added: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportList<'a> {
    reports: Vec<&'a DailyReport>,
    total: usize,
}

pub(super) fn run(ctx: &Context, cmd: DayCommands) -> Result<()> {
    match cmd {
        DayCommands::StartTime { time } => {
            edit_session(ctx, "day start-time", |daily| {
                daily.set_start_time(&time)?;
                Ok(format!("Day started at {}", time.trim()))
            })
        }
        DayCommands::DesiredEnd { time } => edit_session(ctx, "day desired-end", |daily| {
            daily.set_desired_end_time(time.clone());
            Ok(match &time {
                Some(time) => format!("Planned end: {}", time.trim()),
                None => "Planned end cleared".to_string(),
            })
        }),
        DayCommands::ActualEnd { time } => edit_session(ctx, "day actual-end", |daily| {
            daily.set_actual_end_time(time.clone());
            Ok(match &time {
                Some(time) => format!("Day ended at {}", time.trim()),
                None => "Actual end cleared".to_string(),
            })
        }),
        DayCommands::Outcome { slot, text } => edit_session(ctx, "day outcome", |daily| {
            daily.update_rule_of_three(usize::from(slot) - 1, &text)?;
            Ok(format!("Outcome {slot} set"))
        }),
        DayCommands::Summary { text } => edit_session(ctx, "day summary", |daily| {
            let cleared = text.is_none();
            daily.set_summary(text.clone());
            Ok(if cleared {
                "Summary cleared".to_string()
            } else {
                "Summary saved".to_string()
            })
        }),
        DayCommands::Status => run_status(ctx),
        DayCommands::End => run_end(ctx, "day end", |ws| ws.end_day()),
        DayCommands::Start => run_end(ctx, "day start", |ws| {
            let tasks = ws.tasks()?;
            let mut daily = ws.daily()?;
            Ok(daily.start_day(&*tasks))
        }),
        DayCommands::Reports { date, from, to } => run_reports(ctx, date, from, to),
        DayCommands::Goal(cmd) => run_goal(ctx, cmd),
        DayCommands::Review(cmd) => run_review(ctx, cmd),
    }
}

/// Apply one edit to the live session, then save and print it.
fn edit_session<F>(ctx: &Context, command: &str, edit: F) -> Result<()>
where
    F: FnOnce(&mut crate::daily::DailyManager) -> Result<String>,
{
    let ws = ctx.open()?;
    let (header, session) = {
        let mut daily = ws.daily()?;
        let header = edit(&mut *daily)?;
        (header, daily.session().clone())
    };

    let mut human = HumanOutput::new(header);
    push_session_summary(&mut human, &session);
    ctx.save(&ws, &mut human);
    ctx.emit(command, &session, &human)
}

fn run_status(ctx: &Context) -> Result<()> {
    let ws = ctx.open()?;
    let tasks = ws.tasks()?;
    let daily = ws.daily()?;
    let session = daily.session();
    let preview = daily.preview_report_at(&*tasks, Local::now());

    let header = match session.current_date {
        Some(date) => format!("Day {date}"),
        None if session.is_open() => "Day in progress".to_string(),
        None => "No day open".to_string(),
    };
    let mut human = HumanOutput::new(header);
    push_session_summary(&mut human, session);

    match &preview {
        Some(report) => {
            for goal in &report.goals {
                let mark = if goal.completed { "x" } else { " " };
                let kind = match goal.kind {
                    GoalKind::Task => "task",
                    GoalKind::Subtask => "subtask",
                };
                human.push_detail(format!("[{mark}] {kind}: {} ({})", goal.title, goal.id));
            }
            human.push_summary("focus", format_duration(report.focus_secs().max(0) as u64));
        }
        None => {
            for goal in &session.today_goals {
                human.push_detail(format!("goal {}", goal.id));
            }
            human.push_next_step("devday day start-time 09:00");
        }
    }
    for review in &session.code_reviews {
        let mark = if review.completed { "x" } else { " " };
        human.push_detail(format!("[{mark}] review: {} ({})", review.title, review.id));
    }

    ctx.emit("day status", &DayStatus { session, preview }, &human)
}

fn run_end<F>(ctx: &Context, command: &str, close: F) -> Result<()>
where
    F: FnOnce(&Workspace) -> Result<Option<DailyReport>>,
{
    let ws = ctx.open()?;
    let archived = close(&ws)?;

    let mut human = match &archived {
        Some(report) => {
            let mut human = HumanOutput::new(format!("Archived {}", report.date));
            human.push_summary(
                "goals",
                format!("{}/{}", report.completed_goals(), report.goals.len()),
            );
            human.push_summary("focus sessions", report.pomodoro_sessions.len().to_string());
            human.push_summary("focus", format_duration(report.focus_secs().max(0) as u64));
            human
        }
        None => HumanOutput::new("No open day to archive"),
    };
    let carried = ws.daily()?.session().code_reviews.len();
    if carried > 0 {
        human.push_summary("reviews carried over", carried.to_string());
    }
    ctx.save(&ws, &mut human);
    ctx.emit(command, &EndReport { archived }, &human)
}

fn run_reports(
    ctx: &Context,
    date: Option<String>,
    from: Option<String>,
    to: Option<String>,
) -> Result<()> {
    let date = date.as_deref().map(parse_date).transpose()?;
    let from = from.as_deref().map(parse_date).transpose()?;
    let to = to.as_deref().map(parse_date).transpose()?;

    let ws = ctx.open()?;
    let daily = ws.daily()?;
    let reports: Vec<&DailyReport> = match (date, from, to) {
        (Some(date), _, _) => daily.report_for(date).into_iter().collect(),
        (None, None, None) => daily.reports().iter().collect(),
        (None, from, to) => daily.reports_between(
            from.unwrap_or(chrono::NaiveDate::MIN),
            to.unwrap_or(chrono::NaiveDate::MAX),
        ),
    };

    let mut human = HumanOutput::new(format!("Reports: {}", reports.len()));
    for report in &reports {
        human.push_detail(format!(
            "{}: {}/{} goals, {} focus sessions, {}",
            report.date,
            report.completed_goals(),
            report.goals.len(),
            report.pomodoro_sessions.len(),
            format_duration(report.focus_secs().max(0) as u64)
        ));
    }

    let list = ReportList {
        total: reports.len(),
        reports,
    };
    ctx.emit("day reports", &list, &human)
}

fn run_goal(ctx: &Context, cmd: GoalCommands) -> Result<()> {
    let ws = ctx.open()?;

    match cmd {
        GoalCommands::Add { task, subtask } => {
            let (goal, title) = {
                let registry = ws.tasks()?;
                let task_id = registry.resolve(&task)?;
                match subtask {
                    Some(subtask_id) => {
                        let title = registry
                            .find_subtask(&task_id, &subtask_id)
                            .map(|sub| sub.title.clone())
                            .ok_or_else(|| Error::not_found("subtask", subtask_id.clone()))?;
                        (DailyGoal::subtask(task_id, subtask_id), title)
                    }
                    None => {
                        let title = registry
                            .get(&task_id)
                            .map(|t| t.title.clone())
                            .unwrap_or_default();
                        (DailyGoal::task(task_id), title)
                    }
                }
            };

            let added = ws.daily()?.add_goal(goal.clone());
            let mut human = HumanOutput::new(format!("Goal: {title}"));
            human.push_summary("id", goal.id.clone());
            if !added {
                human.push_warning("already one of today's goals");
            }
            ctx.save(&ws, &mut human);
            ctx.emit("day goal", &GoalReport { goal, added }, &human)
        }
        GoalCommands::Rm { id } => {
            let resolved = ws.tasks()?.resolve(&id).ok();
            let goal = {
                let mut daily = ws.daily()?;
                match daily.remove_goal(&id) {
                    Ok(goal) => goal,
                    Err(err @ Error::NotFound { .. }) => match resolved {
                        Some(task_id) => daily.remove_goal(&task_id)?,
                        None => return Err(err),
                    },
                    Err(err) => return Err(err),
                }
            };

            let mut human = HumanOutput::new("Goal removed");
            human.push_summary("id", goal.id.clone());
            ctx.save(&ws, &mut human);
            ctx.emit(
                "day goal",
                &GoalReport {
                    goal,
                    added: false,
                },
                &human,
            )
        }
    }
}

fn run_review(ctx: &Context, cmd: ReviewCommands) -> Result<()> {
    let ws = ctx.open()?;
    let mut daily = ws.daily()?;

    let (header, review) = match cmd {
        ReviewCommands::Add { title, url } => {
            let review = daily.add_code_review(&title, url.as_deref())?;
            (format!("Review added: {}", review.title), review)
        }
        ReviewCommands::Toggle { id } => {
            let completed = daily.toggle_code_review(&id)?;
            let review = daily
                .session()
                .code_reviews
                .iter()
                .find(|review| review.id == id)
                .cloned()
                .ok_or_else(|| Error::not_found("code review", id.clone()))?;
            let state = if completed { "done" } else { "open" };
            (format!("Review {state}: {}", review.title), review)
        }
        ReviewCommands::Rm { id } => {
            let review = daily.delete_code_review(&id)?;
            (format!("Review removed: {}", review.title), review)
        }
    };
    drop(daily);

    let mut human = HumanOutput::new(header);
    human.push_summary("id", review.id.clone());
    if !review.url.is_empty() {
        human.push_summary("url", review.url.clone());
    }
    ctx.save(&ws, &mut human);
    ctx.emit("day review", &review, &human)
}

fn push_session_summary(human: &mut HumanOutput, session: &DailySession) {
    if let Some(start) = &session.start_time {
        human.push_summary("start", start.clone());
    }
    if let Some(end) = &session.desired_end_time {
        human.push_summary("planned end", end.clone());
    }
    if let Some(end) = &session.actual_end_time {
        human.push_summary("ended", end.clone());
    }
    for (slot, outcome) in session.rule_of_three.iter().enumerate() {
        if !outcome.is_empty() {
            human.push_summary(format!("outcome {}", slot + 1), outcome.clone());
        }
    }
    human.push_summary("goals", session.today_goals.len().to_string());
    human.push_summary("focus sessions", session.pomodoro_sessions.len().to_string());
}
