//! devday timer command implementation
//!
//! `start`, `pause`, `reset` and `mode` edit the persisted timer and exit.
//! `run` attaches the background clock and counts down in the foreground.

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::output::{format_clock, HumanOutput};
use crate::timer::{StartTarget, TickOutcome, TimerMode, TimerState};
use crate::workspace::Workspace;

use super::{Context, TimerCommands};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TimerReport {
    timer: TimerState,
    active_task_code: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReport {
    completed: bool,
    timer: TimerState,
    active_task_code: Option<String>,
}

enum Step {
    Interrupted(std::io::Result<()>),
    Clock(Option<TickOutcome>),
}

/// How a foreground run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunEnd {
    Completed,
    Interrupted,
    /// Another devday command paused, reset, or switched the timer.
    StoppedElsewhere,
}

pub(super) fn run(ctx: &Context, cmd: TimerCommands) -> Result<()> {
    match cmd {
        TimerCommands::Status => {
            let ws = ctx.open()?;
            let human = timer_human(&ws, timer_header(ws.timer().engine().state()))?;
            ctx.emit("timer status", &timer_report(&ws)?, &human)
        }
        TimerCommands::Start { task, untracked } => {
            let mut ws = ctx.open()?;
            let target = start_target(&ws, task.as_deref(), untracked)?;
            let fresh = ws.timer_mut().start(target);

            let header = if fresh { "Timer started" } else { "Timer resumed" };
            let mut human = timer_human(&ws, header)?;
            human.push_next_step("devday timer run");
            ctx.save(&ws, &mut human);
            ctx.emit("timer start", &timer_report(&ws)?, &human)
        }
        TimerCommands::Pause => edit_timer(ctx, "timer pause", "Timer paused", |ws| {
            ws.timer_mut().pause();
            Ok(())
        }),
        TimerCommands::Reset => edit_timer(ctx, "timer reset", "Timer reset", |ws| {
            ws.timer_mut().reset();
            Ok(())
        }),
        TimerCommands::Mode { mode } => {
            let mode = mode.parse::<TimerMode>()?;
            edit_timer(ctx, "timer mode", &format!("Mode: {mode}"), |ws| {
                ws.timer_mut().set_mode(mode);
                Ok(())
            })
        }
        TimerCommands::Run { task, untracked } => run_foreground(ctx, task.as_deref(), untracked),
    }
}

fn edit_timer<F>(ctx: &Context, command: &str, header: &str, edit: F) -> Result<()>
where
    F: FnOnce(&mut Workspace) -> Result<()>,
{
    let mut ws = ctx.open()?;
    edit(&mut ws)?;
    let mut human = timer_human(&ws, header)?;
    ctx.save(&ws, &mut human);
    ctx.emit(command, &timer_report(&ws)?, &human)
}

fn run_foreground(ctx: &Context, task: Option<&str>, untracked: bool) -> Result<()> {
    let mut ws = ctx.open()?;
    let target = start_target(&ws, task, untracked)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let (end, failures) = runtime.block_on(drive(ctx, &mut ws, target))?;

    let header = match end {
        RunEnd::Completed => format!("{} session complete", ws.timer().engine().state().mode),
        RunEnd::Interrupted => "Timer paused".to_string(),
        RunEnd::StoppedElsewhere => "Timer stopped by another devday command".to_string(),
    };
    let mut human = timer_human(&ws, header)?;
    human.extend_warnings(failures);

    let report = timer_report(&ws)?;
    ctx.emit(
        "timer run",
        &RunReport {
            completed: end == RunEnd::Completed,
            timer: report.timer,
            active_task_code: report.active_task_code,
        },
        &human,
    )
}

/// Count down until the segment completes, Ctrl-C pauses it, or another
/// command takes the timer over. Returns how it ended and any save failures.
///
/// The data directory lock is released once the run has started. Progress is
/// written back with [`Workspace::sync`], so edits made by other commands in
/// the meantime survive.
async fn drive(
    ctx: &Context,
    ws: &mut Workspace,
    target: StartTarget,
) -> Result<(RunEnd, Vec<String>)> {
    if !ws.attach_clock() {
        return Err(Error::OperationFailed(
            "could not start the timer clock".to_string(),
        ));
    }
    ws.timer_mut().start(target);
    let mut failures = ws.save();
    ws.release_lock();

    let options = ctx.output();
    let show_progress = !options.json && !options.quiet;
    let checkpoint = ws.config().clock.checkpoint_interval();
    let mut last_checkpoint = Instant::now();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ctrl_c_live = true;

    let end = loop {
        let step = tokio::select! {
            result = &mut ctrl_c, if ctrl_c_live => Step::Interrupted(result),
            outcome = ws.timer_mut().next_event() => Step::Clock(outcome),
        };

        match step {
            Step::Interrupted(Ok(())) => {
                ws.timer_mut().pause();
                break RunEnd::Interrupted;
            }
            Step::Interrupted(Err(err)) => {
                warn!(error = %err, "cannot listen for Ctrl-C");
                ctrl_c_live = false;
            }
            Step::Clock(Some(TickOutcome::Completed { .. })) => break RunEnd::Completed,
            Step::Clock(Some(TickOutcome::Running { time_left, .. })) => {
                if show_progress {
                    eprint!("\r{} ", format_clock(time_left));
                }
                if last_checkpoint.elapsed() < checkpoint {
                    continue;
                }
                match ws.try_sync() {
                    Ok(Some(report)) => {
                        last_checkpoint = Instant::now();
                        failures.extend(report.warnings);
                        let still_running = ws.timer().engine().state().is_active;
                        if report.timer_changed_elsewhere && !still_running {
                            break RunEnd::StoppedElsewhere;
                        }
                    }
                    Ok(None) => debug!("data directory busy, checkpoint deferred"),
                    Err(err) => {
                        warn!(error = %err, "checkpoint failed");
                        last_checkpoint = Instant::now();
                        failures.push(format!("checkpoint: {err}"));
                    }
                }
            }
            Step::Clock(Some(TickOutcome::Ignored)) => {}
            Step::Clock(None) => {
                ws.timer_mut().pause();
                if let Err(err) = ws.sync() {
                    warn!(error = %err, "could not save the paused timer");
                }
                return Err(Error::OperationFailed(
                    "timer clock stopped unexpectedly".to_string(),
                ));
            }
        }
    };

    if show_progress {
        eprintln!();
    }
    ws.timer_mut().shutdown();
    match ws.sync() {
        Ok(report) => failures.extend(report.warnings),
        Err(err) => failures.push(format!("final save: {err}")),
    }
    Ok((end, failures))
}

fn start_target(ws: &Workspace, task: Option<&str>, untracked: bool) -> Result<StartTarget> {
    if untracked {
        return Ok(StartTarget::Untracked);
    }
    match task {
        Some(input) => Ok(StartTarget::Task(ws.tasks()?.resolve(input)?)),
        None => Ok(StartTarget::Resume),
    }
}

fn timer_header(state: &TimerState) -> &'static str {
    if state.is_active {
        "Timer running"
    } else if state.is_fresh() {
        "Timer idle"
    } else if state.time_left == 0 {
        "Timer finished"
    } else {
        "Timer paused"
    }
}

fn timer_report(ws: &Workspace) -> Result<TimerReport> {
    let timer = ws.timer().engine().state().clone();
    let active_task_code = active_task_code(ws, &timer)?;
    Ok(TimerReport {
        timer,
        active_task_code,
    })
}

fn active_task_code(ws: &Workspace, state: &TimerState) -> Result<Option<String>> {
    let Some(id) = state.active_task_id.as_deref() else {
        return Ok(None);
    };
    Ok(ws.tasks()?.get(id).map(|task| task.code.clone()))
}

fn timer_human(ws: &Workspace, header: impl Into<String>) -> Result<HumanOutput> {
    let state = ws.timer().engine().state();
    let mut human = HumanOutput::new(header);
    human.push_summary("mode", state.mode.to_string());
    human.push_summary("time left", format_clock(state.time_left));
    match (&state.active_task_id, active_task_code(ws, state)?) {
        (Some(_), Some(code)) => human.push_summary("task", code),
        (Some(id), None) => {
            human.push_summary("task", id.clone());
            human.push_warning("active task no longer exists; time is not being tracked");
        }
        (None, _) => human.push_summary("task", "untracked"),
    }
    human.push_summary("pomodoros", state.pomodoro_count.to_string());
    Ok(human)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use super::*;
    use crate::output::OutputOptions;
    use crate::task::{NewTask, TaskStatus};

    fn quiet_context(dir: &Path) -> Context {
        std::fs::write(
            dir.join(crate::config::CONFIG_FILE),
            "[clock]\nwake_interval_ms = 1000\ncheckpoint_secs = 60",
        )
        .unwrap();
        Context {
            data_dir: Some(dir.to_path_buf()),
            output: OutputOptions {
                json: true,
                quiet: true,
            },
        }
    }

    fn seed_task(dir: &Path) -> String {
        let ws = Workspace::open(dir).unwrap();
        let id = ws
            .tasks()
            .unwrap()
            .create_task(NewTask::new("FE-1", "Fix bug", TaskStatus::InProgress))
            .unwrap()
            .id;
        assert!(ws.save().is_empty());
        id
    }

    #[tokio::test(start_paused = true)]
    async fn run_keeps_edits_made_by_other_commands() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = quiet_context(dir.path());
        let id = seed_task(dir.path());

        let mut ws = ctx.open().unwrap();
        let editor = async {
            tokio::time::sleep(Duration::from_secs(90)).await;
            let other = Workspace::open_locked(dir.path()).unwrap();
            other.tasks().unwrap().add_note(&id, "written mid-run").unwrap();
            other
                .daily()
                .unwrap()
                .add_code_review("PR 9", None)
                .unwrap();
            assert!(other.save().is_empty());
        };
        let (result, ()) = tokio::join!(
            drive(&ctx, &mut ws, StartTarget::Task(id.clone())),
            editor
        );
        let (end, failures) = result.unwrap();
        assert_eq!(end, RunEnd::Completed);
        assert!(failures.is_empty(), "{failures:?}");
        drop(ws);

        let reopened = Workspace::open(dir.path()).unwrap();
        let tasks = reopened.tasks().unwrap();
        let task = tasks.get(&id).unwrap();
        assert_eq!(task.notes.len(), 1);
        assert_eq!(task.pomodoro.time_spent, 1500);
        assert_eq!(task.pomodoro.actual, 1);
        drop(tasks);

        let daily = reopened.daily().unwrap();
        assert_eq!(daily.session().code_reviews.len(), 1);
        assert_eq!(daily.session().pomodoro_sessions.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_from_another_command_stops_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = quiet_context(dir.path());
        let id = seed_task(dir.path());

        let mut ws = ctx.open().unwrap();
        let pauser = async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            let mut other = Workspace::open_locked(dir.path()).unwrap();
            assert!(other.timer().engine().state().is_active);
            other.timer_mut().pause();
            assert!(other.save().is_empty());
        };
        let (result, ()) = tokio::join!(
            drive(&ctx, &mut ws, StartTarget::Task(id.clone())),
            pauser
        );
        let (end, _) = result.unwrap();
        assert_eq!(end, RunEnd::StoppedElsewhere);
        assert!(!ws.timer().engine().state().is_active);
        drop(ws);

        let reopened = Workspace::open(dir.path()).unwrap();
        assert!(!reopened.timer().engine().state().is_active);
        let spent = reopened.tasks().unwrap().get(&id).unwrap().pomodoro.time_spent;
        assert!(spent > 0 && spent < 1500, "booked {spent}s");
    }

    #[test]
    fn header_reflects_timer_phase() {
        let mut state = TimerState::default();
        assert_eq!(timer_header(&state), "Timer idle");

        state.time_left = 1200;
        assert_eq!(timer_header(&state), "Timer paused");

        state.is_active = true;
        assert_eq!(timer_header(&state), "Timer running");

        state.is_active = false;
        state.time_left = 0;
        assert_eq!(timer_header(&state), "Timer finished");
    }

    #[test]
    fn untracked_wins_over_resume() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        assert_eq!(start_target(&ws, None, true).unwrap(), StartTarget::Untracked);
        assert_eq!(start_target(&ws, None, false).unwrap(), StartTarget::Resume);
        assert!(start_target(&ws, Some("nope"), false).is_err());
    }
}
