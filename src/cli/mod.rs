//! Command-line interface for devday
//!
//! This module defines the CLI structure using clap derive macros.
//! Each command group is implemented in its own submodule.

use std::path::PathBuf;

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::storage::Storage;
use crate::workspace::Workspace;

mod day;
mod insights;
mod task;
mod timer;

/// devday - tasks, focus timer, and daily planning
///
/// Tracks engineering tasks with refinement and history, runs a pomodoro
/// timer that books focus time against tasks, and archives each working day.
#[derive(Parser, Debug)]
#[command(name = "devday")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory holding tasks.json, daily.json, timer.json and devday.toml
    #[arg(long, global = true, env = "DEVDAY_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Task registry
    #[command(subcommand)]
    Task(TaskCommands),

    /// Today's session: hours, goals, code reviews, archive
    #[command(subcommand)]
    Day(DayCommands),

    /// Pomodoro timer
    #[command(subcommand)]
    Timer(TimerCommands),

    /// Staleness, refinement, and deadline alerts
    Notifications,

    /// Throughput and health metrics
    Metrics {
        /// Window in days (e.g. 7, 30, 90d) or "all"
        #[arg(long, default_value = "30")]
        range: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a task
    New {
        /// Short human code, e.g. FE-123
        code: String,

        /// Task title
        title: String,

        /// Initial status: todo, in-progress, blocked, waiting, done
        #[arg(long, default_value = "todo")]
        status: String,

        /// Start date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        start: Option<String>,

        /// Due date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        due: Option<String>,
    },

    /// List tasks, newest first
    List {
        /// Only tasks with this status
        #[arg(long)]
        status: Option<String>,
    },

    /// Show a task with subtasks, notes, and history
    Show {
        /// Task id, id prefix, or code
        task: String,
    },

    /// Update task fields
    Update {
        /// Task id, id prefix, or code
        task: String,

        #[arg(long)]
        code: Option<String>,

        #[arg(long)]
        title: Option<String>,

        /// New status: todo, in-progress, blocked, waiting, done
        #[arg(long)]
        status: Option<String>,

        /// Eisenhower quadrant: do, decide, delegate, delete, none
        #[arg(long)]
        quad: Option<String>,

        /// Start date, or "none" to clear
        #[arg(long)]
        start: Option<String>,

        /// Due date, or "none" to clear
        #[arg(long)]
        due: Option<String>,

        /// Refinement: what done looks like
        #[arg(long)]
        goal: Option<String>,

        /// Refinement: technical analysis
        #[arg(long)]
        analysis: Option<String>,

        /// Refinement: testing strategy
        #[arg(long)]
        testing: Option<String>,

        /// Estimated pomodoros
        #[arg(long)]
        estimate: Option<u32>,
    },

    /// Delete a task
    Delete {
        /// Task id, id prefix, or code
        task: String,
    },

    /// Append a note to a task
    Note {
        /// Task id, id prefix, or code
        task: String,

        /// Note text
        content: String,
    },

    /// Subtask management
    #[command(subcommand)]
    Subtask(SubtaskCommands),
}

#[derive(Subcommand, Debug)]
pub enum SubtaskCommands {
    /// Add a subtask
    Add {
        /// Task id, id prefix, or code
        task: String,

        /// Subtask title
        title: String,
    },

    /// Flip a subtask's completion
    Toggle {
        /// Task id, id prefix, or code
        task: String,

        /// Subtask id
        subtask: String,
    },

    /// Remove a subtask
    Rm {
        /// Task id, id prefix, or code
        task: String,

        /// Subtask id
        subtask: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum DayCommands {
    /// Set when the day started; opens today's session
    StartTime {
        /// Time of day, e.g. 09:00
        time: String,
    },

    /// Set (or clear) the planned end of the day
    DesiredEnd {
        /// Time of day; omit to clear
        time: Option<String>,
    },

    /// Set (or clear) when the day actually ended
    ActualEnd {
        /// Time of day; omit to clear
        time: Option<String>,
    },

    /// Set one of today's three outcomes
    Outcome {
        /// Slot 1, 2, or 3
        #[arg(value_parser = clap::value_parser!(u8).range(1..=3))]
        slot: u8,

        /// Outcome text; empty clears the slot
        text: String,
    },

    /// Set (or clear) the end-of-day summary
    Summary {
        /// Summary text; omit to clear
        text: Option<String>,
    },

    /// Show today's session
    Status,

    /// Archive today and reset for tomorrow
    End,

    /// Archive any open day and begin a fresh session
    Start,

    /// List archived days
    Reports {
        /// Only this date (YYYY-MM-DD)
        #[arg(long, conflicts_with_all = ["from", "to"])]
        date: Option<String>,

        /// Earliest date, inclusive
        #[arg(long)]
        from: Option<String>,

        /// Latest date, inclusive
        #[arg(long)]
        to: Option<String>,
    },

    /// Today's goals
    #[command(subcommand)]
    Goal(GoalCommands),

    /// Code reviews to get through
    #[command(subcommand)]
    Review(ReviewCommands),
}

#[derive(Subcommand, Debug)]
pub enum GoalCommands {
    /// Pick a task (or one of its subtasks) as a goal for today
    Add {
        /// Task id, id prefix, or code
        task: String,

        /// Subtask id; makes the goal a subtask goal
        #[arg(long)]
        subtask: Option<String>,
    },

    /// Drop a goal
    Rm {
        /// Goal id (task id or subtask id)
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ReviewCommands {
    /// Add a code review
    Add {
        /// Review title
        title: String,

        /// Link to the review
        #[arg(long)]
        url: Option<String>,
    },

    /// Flip a review's completion
    Toggle {
        /// Review id
        id: String,
    },

    /// Remove a review
    Rm {
        /// Review id
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum TimerCommands {
    /// Show the timer
    Status,

    /// Start or resume the countdown without driving it
    Start {
        /// Task to track time against (id, id prefix, or code)
        task: Option<String>,

        /// Detach from any task
        #[arg(long, conflicts_with = "task")]
        untracked: bool,
    },

    /// Pause the countdown
    Pause,

    /// Stop and rewind the current mode
    Reset,

    /// Switch mode: work, short-break, long-break
    Mode {
        mode: String,
    },

    /// Start or resume and count down in the foreground until done or Ctrl-C
    Run {
        /// Task to track time against (id, id prefix, or code)
        task: Option<String>,

        /// Detach from any task
        #[arg(long, conflicts_with = "task")]
        untracked: bool,
    },
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let ctx = Context {
            data_dir: self.data_dir,
            output: OutputOptions {
                json: self.json,
                quiet: self.quiet,
            },
        };

        match self.command {
            Commands::Task(cmd) => task::run(&ctx, cmd),
            Commands::Day(cmd) => day::run(&ctx, cmd),
            Commands::Timer(cmd) => timer::run(&ctx, cmd),
            Commands::Notifications => insights::run_notifications(&ctx),
            Commands::Metrics { range } => insights::run_metrics(&ctx, &range),
        }
    }
}

/// Global options shared by every command.
pub(crate) struct Context {
    data_dir: Option<PathBuf>,
    output: OutputOptions,
}

impl Context {
    /// Lock and open the workspace, then archive yesterday's session if the
    /// date moved on. The lock is held until the workspace is dropped.
    pub(crate) fn open(&self) -> Result<Workspace> {
        let data_dir = Storage::resolve_data_dir(self.data_dir.clone())?;
        let ws = Workspace::open_locked(data_dir)?;
        if let Some(report) = ws.roll_over_if_needed(today())? {
            info!(date = %report.date, "archived previous day on rollover");
            ws.save();
        }
        Ok(ws)
    }

    /// Persist the workspace, surfacing failures as warnings.
    pub(crate) fn save(&self, ws: &Workspace, human: &mut HumanOutput) {
        human.extend_warnings(ws.save());
    }

    pub(crate) fn emit<T: Serialize>(
        &self,
        command: &str,
        data: &T,
        human: &HumanOutput,
    ) -> Result<()> {
        emit_success(self.output, command, data, Some(human))
    }

    pub(crate) fn output(&self) -> OutputOptions {
        self.output
    }
}

pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Parse `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
pub(crate) fn parse_datetime(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    let date = parse_date(raw)?;
    date.and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| Error::InvalidArgument(format!("invalid date '{raw}'")))
}

/// Like [`parse_datetime`], with `none` meaning "clear".
pub(crate) fn parse_optional_datetime(raw: &str) -> Result<Option<DateTime<Utc>>> {
    if raw.trim().eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    parse_datetime(raw).map(Some)
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        Error::InvalidArgument(format!("invalid date '{}' (expected YYYY-MM-DD)", raw.trim()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn dates_parse_as_utc_midnight_or_rfc3339() {
        let day = parse_datetime("2024-05-10").unwrap();
        assert_eq!(day, Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap());

        let precise = parse_datetime("2024-05-10T12:30:00+02:00").unwrap();
        assert_eq!(precise, Utc.with_ymd_and_hms(2024, 5, 10, 10, 30, 0).unwrap());

        assert!(parse_datetime("10/05/2024").is_err());
        assert_eq!(parse_optional_datetime("None").unwrap(), None);
    }

    #[test]
    fn outcome_slot_is_range_checked() {
        assert!(Cli::try_parse_from(["devday", "day", "outcome", "4", "x"]).is_err());
        assert!(Cli::try_parse_from(["devday", "day", "outcome", "3", "x"]).is_ok());
    }
}
