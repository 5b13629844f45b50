use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const WORK_SECS: u64 = 25 * 60;
pub const SHORT_BREAK_SECS: u64 = 5 * 60;
pub const LONG_BREAK_SECS: u64 = 15 * 60;

/// Countdown profile. Switching is always user-directed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TimerMode {
    #[default]
    Work,
    ShortBreak,
    LongBreak,
}

impl TimerMode {
    pub fn duration_secs(self) -> u64 {
        match self {
            TimerMode::Work => WORK_SECS,
            TimerMode::ShortBreak => SHORT_BREAK_SECS,
            TimerMode::LongBreak => LONG_BREAK_SECS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimerMode::Work => "work",
            TimerMode::ShortBreak => "shortBreak",
            TimerMode::LongBreak => "longBreak",
        }
    }
}

impl fmt::Display for TimerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimerMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|ch| !matches!(ch, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "work" | "focus" => Ok(TimerMode::Work),
            "shortbreak" | "short" => Ok(TimerMode::ShortBreak),
            "longbreak" | "long" => Ok(TimerMode::LongBreak),
            _ => Err(Error::InvalidArgument(format!(
                "unknown timer mode '{}' (expected work, short-break, long-break)",
                s.trim()
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub time_left: u64,
    pub is_active: bool,
    pub mode: TimerMode,
    pub active_task_id: Option<String>,
    /// Completed work sessions
    pub pomodoro_count: u32,
    /// Seconds consumed in the current segment
    pub elapsed_time: u64,
}

impl Default for TimerState {
    fn default() -> Self {
        Self {
            time_left: TimerMode::Work.duration_secs(),
            is_active: false,
            mode: TimerMode::Work,
            active_task_id: None,
            pomodoro_count: 0,
            elapsed_time: 0,
        }
    }
}

impl TimerState {
    pub fn is_fresh(&self) -> bool {
        self.time_left == self.mode.duration_secs()
    }
}

/// The persisted part of [`TimerState`]. Segment telemetry is not kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    #[serde(default)]
    pub mode: TimerMode,
    pub time_left: u64,
    #[serde(default)]
    pub active_task_id: Option<String>,
    #[serde(default)]
    pub pomodoro_count: u32,
    #[serde(default)]
    pub is_active: bool,
}

impl Default for TimerSnapshot {
    fn default() -> Self {
        TimerSnapshot::from(&TimerState::default())
    }
}

impl From<&TimerState> for TimerSnapshot {
    fn from(state: &TimerState) -> Self {
        Self {
            mode: state.mode,
            time_left: state.time_left,
            active_task_id: state.active_task_id.clone(),
            pomodoro_count: state.pomodoro_count,
            is_active: state.is_active,
        }
    }
}

impl From<TimerSnapshot> for TimerState {
    fn from(snapshot: TimerSnapshot) -> Self {
        Self {
            time_left: snapshot.time_left.min(snapshot.mode.duration_secs()),
            is_active: snapshot.is_active,
            mode: snapshot.mode,
            active_task_id: snapshot.active_task_id,
            pomodoro_count: snapshot.pomodoro_count,
            elapsed_time: 0,
        }
    }
}
