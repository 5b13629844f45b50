//! Countdown state machine.
//!
//! The engine is the only writer of [`TimerState`]. It calls into the task
//! registry and the daily manager through narrow capability traits so it can
//! be built and tested without either of them.

use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::error::Result;

use super::state::{TimerMode, TimerSnapshot, TimerState};

/// Time tracking on tasks, called on every tick and on completion.
pub trait TaskTimeSink {
    fn add_time_spent(&self, task_id: &str, delta_seconds: u64) -> Result<()>;
    fn increment_pomodoro(&self, task_id: &str) -> Result<()>;
}

pub trait FocusSessionSink {
    fn record_focus_session(
        &self,
        task_id: &str,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Side effect fired once per completed countdown.
pub trait CompletionAlert {
    fn session_completed(&self, mode: TimerMode, task_id: Option<&str>);
}

/// Rings the terminal bell and logs the completion.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalChime;

impl CompletionAlert for TerminalChime {
    fn session_completed(&self, mode: TimerMode, task_id: Option<&str>) {
        info!(%mode, task_id = task_id.unwrap_or("-"), "session complete");
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
    }
}

/// Which task a start request applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartTarget {
    /// Keep whatever task (or none) is already attached
    Resume,
    Task(String),
    Untracked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Ignored,
    Running { consumed: u64, time_left: u64 },
    Completed { consumed: u64 },
}

pub struct TimerEngine {
    state: TimerState,
    current_session_start: Option<DateTime<Utc>>,
    tasks: Arc<dyn TaskTimeSink + Send + Sync>,
    sessions: Arc<dyn FocusSessionSink + Send + Sync>,
    alert: Box<dyn CompletionAlert + Send>,
}

impl TimerEngine {
    pub fn new(
        tasks: Arc<dyn TaskTimeSink + Send + Sync>,
        sessions: Arc<dyn FocusSessionSink + Send + Sync>,
    ) -> Self {
        Self {
            state: TimerState::default(),
            current_session_start: None,
            tasks,
            sessions,
            alert: Box::new(TerminalChime),
        }
    }

    pub fn with_alert(mut self, alert: Box<dyn CompletionAlert + Send>) -> Self {
        self.set_alert(alert);
        self
    }

    pub fn set_alert(&mut self, alert: Box<dyn CompletionAlert + Send>) {
        self.alert = alert;
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn current_session_start(&self) -> Option<DateTime<Utc>> {
        self.current_session_start
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot::from(&self.state)
    }

    /// Load a persisted snapshot. The in-progress segment start is unknown afterwards.
    pub fn restore(&mut self, snapshot: TimerSnapshot) {
        self.state = TimerState::from(snapshot);
        self.current_session_start = None;
    }

    /// Start or resume the countdown. Returns true when a fresh segment began.
    pub fn start_timer(&mut self, target: StartTarget) -> bool {
        let requested = match target {
            StartTarget::Resume => None,
            StartTarget::Task(id) => Some(Some(id)),
            StartTarget::Untracked => Some(None),
        };
        let switched = requested
            .as_ref()
            .is_some_and(|task| *task != self.state.active_task_id);
        if let Some(task) = requested {
            self.state.active_task_id = task;
        }

        let fresh = switched || self.state.is_fresh() || self.state.time_left == 0;
        if fresh {
            self.state.time_left = self.state.mode.duration_secs();
            self.state.elapsed_time = 0;
            self.current_session_start = Some(Utc::now());
        }
        self.state.is_active = true;

        debug!(
            mode = %self.state.mode,
            task_id = self.state.active_task_id.as_deref().unwrap_or("-"),
            time_left = self.state.time_left,
            fresh,
            "timer started"
        );
        fresh
    }

    pub fn pause_timer(&mut self) {
        self.state.is_active = false;
        debug!(time_left = self.state.time_left, "timer paused");
    }

    pub fn reset_timer(&mut self) {
        self.state.is_active = false;
        self.state.time_left = self.state.mode.duration_secs();
        self.state.elapsed_time = 0;
        self.current_session_start = None;
    }

    pub fn set_mode(&mut self, mode: TimerMode) {
        self.state.mode = mode;
        self.reset_timer();
        debug!(%mode, "timer mode set");
    }

    /// Apply `delta` elapsed whole seconds.
    pub fn tick(&mut self, delta: u64) -> TickOutcome {
        if delta == 0 || !self.state.is_active || self.state.time_left == 0 {
            return TickOutcome::Ignored;
        }

        let consumed = delta.min(self.state.time_left);
        self.state.time_left -= consumed;
        self.state.elapsed_time += consumed;

        if self.state.mode == TimerMode::Work {
            if let Some(task_id) = self.state.active_task_id.as_deref() {
                if let Err(err) = self.tasks.add_time_spent(task_id, consumed) {
                    warn!(task_id, error = %err, "could not record time spent");
                }
            }
        }

        if self.state.time_left == 0 {
            self.complete_session();
            TickOutcome::Completed { consumed }
        } else {
            TickOutcome::Running {
                consumed,
                time_left: self.state.time_left,
            }
        }
    }

    pub fn complete_session(&mut self) {
        let mode = self.state.mode;
        self.alert
            .session_completed(mode, self.state.active_task_id.as_deref());

        if mode == TimerMode::Work {
            self.state.pomodoro_count += 1;
            if let Some(task_id) = self.state.active_task_id.as_deref() {
                let ended_at = Utc::now();
                let started_at = self.current_session_start.unwrap_or_else(|| {
                    ended_at - Duration::seconds(mode.duration_secs() as i64)
                });
                if let Err(err) = self.tasks.increment_pomodoro(task_id) {
                    warn!(task_id, error = %err, "could not increment pomodoro count");
                }
                if let Err(err) = self
                    .sessions
                    .record_focus_session(task_id, started_at, ended_at)
                {
                    warn!(task_id, error = %err, "could not record focus session");
                }
            }
        }

        self.state.is_active = false;
        self.state.elapsed_time = 0;
        self.state.time_left = 0;
        self.current_session_start = None;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::error::Error;

    #[derive(Default)]
    pub struct RecordingSink {
        pub time: Mutex<Vec<(String, u64)>>,
        pub pomodoros: Mutex<Vec<String>>,
        pub sessions: Mutex<Vec<(String, DateTime<Utc>, DateTime<Utc>)>>,
        pub fail: bool,
    }

    impl RecordingSink {
        pub fn total_time(&self) -> u64 {
            self.time.lock().unwrap().iter().map(|(_, d)| d).sum()
        }
    }

    impl TaskTimeSink for RecordingSink {
        fn add_time_spent(&self, task_id: &str, delta_seconds: u64) -> Result<()> {
            if self.fail {
                return Err(Error::not_found("task", task_id));
            }
            self.time
                .lock()
                .unwrap()
                .push((task_id.to_string(), delta_seconds));
            Ok(())
        }

        fn increment_pomodoro(&self, task_id: &str) -> Result<()> {
            if self.fail {
                return Err(Error::not_found("task", task_id));
            }
            self.pomodoros.lock().unwrap().push(task_id.to_string());
            Ok(())
        }
    }

    impl FocusSessionSink for RecordingSink {
        fn record_focus_session(
            &self,
            task_id: &str,
            started_at: DateTime<Utc>,
            ended_at: DateTime<Utc>,
        ) -> Result<()> {
            self.sessions
                .lock()
                .unwrap()
                .push((task_id.to_string(), started_at, ended_at));
            Ok(())
        }
    }

    pub struct CountingAlert(pub Arc<AtomicUsize>);

    impl CompletionAlert for CountingAlert {
        fn session_completed(&self, _mode: TimerMode, _task_id: Option<&str>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn engine_with(sink: Arc<RecordingSink>) -> (TimerEngine, Arc<AtomicUsize>) {
        let alerts = Arc::new(AtomicUsize::new(0));
        let engine = TimerEngine::new(sink.clone(), sink)
            .with_alert(Box::new(CountingAlert(alerts.clone())));
        (engine, alerts)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::testing::*;
    use super::*;

    #[test]
    fn full_work_session_completes_once() {
        let sink = Arc::new(RecordingSink::default());
        let (mut engine, alerts) = engine_with(sink.clone());

        assert!(engine.start_timer(StartTarget::Task("task-1".to_string())));
        assert_eq!(engine.tick(1500), TickOutcome::Completed { consumed: 1500 });
        assert_eq!(engine.state().time_left, 0);
        assert!(!engine.state().is_active);
        assert_eq!(engine.state().pomodoro_count, 1);

        assert_eq!(engine.tick(5), TickOutcome::Ignored);
        assert_eq!(alerts.load(Ordering::SeqCst), 1);
        assert_eq!(*sink.pomodoros.lock().unwrap(), vec!["task-1".to_string()]);
        assert_eq!(sink.sessions.lock().unwrap().len(), 1);
        assert_eq!(sink.total_time(), 1500);
    }

    #[test]
    fn overshooting_tick_clamps_to_zero() {
        let sink = Arc::new(RecordingSink::default());
        let (mut engine, alerts) = engine_with(sink.clone());

        engine.start_timer(StartTarget::Task("t".to_string()));
        engine.tick(1000);
        assert_eq!(engine.tick(900), TickOutcome::Completed { consumed: 500 });
        assert_eq!(sink.total_time(), 1500);
        assert_eq!(alerts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_delta_and_paused_ticks_are_ignored() {
        let sink = Arc::new(RecordingSink::default());
        let (mut engine, _) = engine_with(sink.clone());

        assert_eq!(engine.tick(3), TickOutcome::Ignored);
        engine.start_timer(StartTarget::Resume);
        assert_eq!(engine.tick(0), TickOutcome::Ignored);
        engine.pause_timer();
        assert_eq!(engine.tick(10), TickOutcome::Ignored);
        assert_eq!(engine.state().time_left, 1500);
    }

    #[test]
    fn resume_keeps_time_and_switch_resets() {
        let sink = Arc::new(RecordingSink::default());
        let (mut engine, _) = engine_with(sink);

        engine.start_timer(StartTarget::Task("a".to_string()));
        engine.tick(100);
        engine.pause_timer();

        assert!(!engine.start_timer(StartTarget::Task("a".to_string())));
        assert_eq!(engine.state().time_left, 1400);

        engine.pause_timer();
        assert!(!engine.start_timer(StartTarget::Resume));
        assert_eq!(engine.state().active_task_id.as_deref(), Some("a"));
        assert_eq!(engine.state().time_left, 1400);

        assert!(engine.start_timer(StartTarget::Task("b".to_string())));
        assert_eq!(engine.state().time_left, 1500);
        assert_eq!(engine.state().elapsed_time, 0);
    }

    #[test]
    fn untracked_session_does_not_touch_tasks() {
        let sink = Arc::new(RecordingSink::default());
        let (mut engine, alerts) = engine_with(sink.clone());

        engine.start_timer(StartTarget::Untracked);
        engine.tick(1500);
        assert_eq!(engine.state().pomodoro_count, 1);
        assert_eq!(alerts.load(Ordering::SeqCst), 1);
        assert_eq!(sink.total_time(), 0);
        assert!(sink.sessions.lock().unwrap().is_empty());
    }

    #[test]
    fn set_mode_resets_and_pauses() {
        let sink = Arc::new(RecordingSink::default());
        let (mut engine, _) = engine_with(sink);

        engine.start_timer(StartTarget::Resume);
        engine.tick(42);
        engine.set_mode(TimerMode::ShortBreak);
        assert_eq!(engine.state().time_left, 300);
        assert!(!engine.state().is_active);
        assert_eq!(engine.state().elapsed_time, 0);

        engine.set_mode(TimerMode::LongBreak);
        assert_eq!(engine.state().time_left, 900);
        assert!(!engine.state().is_active);
    }

    #[test]
    fn break_completion_does_not_count_pomodoro() {
        let sink = Arc::new(RecordingSink::default());
        let (mut engine, alerts) = engine_with(sink.clone());

        engine.set_mode(TimerMode::ShortBreak);
        engine.start_timer(StartTarget::Task("t".to_string()));
        engine.tick(300);
        assert_eq!(engine.state().pomodoro_count, 0);
        assert_eq!(engine.state().mode, TimerMode::ShortBreak);
        assert_eq!(alerts.load(Ordering::SeqCst), 1);
        assert_eq!(sink.total_time(), 0);
        assert!(sink.pomodoros.lock().unwrap().is_empty());
    }

    #[test]
    fn start_after_completion_begins_fresh_segment() {
        let sink = Arc::new(RecordingSink::default());
        let (mut engine, _) = engine_with(sink);

        engine.start_timer(StartTarget::Untracked);
        engine.tick(1500);
        assert!(engine.start_timer(StartTarget::Resume));
        assert_eq!(engine.state().time_left, 1500);
        assert!(engine.current_session_start().is_some());
    }

    #[test]
    fn sink_failures_do_not_stop_countdown() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        });
        let (mut engine, alerts) = engine_with(sink);

        engine.start_timer(StartTarget::Task("deleted".to_string()));
        assert!(matches!(engine.tick(10), TickOutcome::Running { time_left: 1490, .. }));
        engine.tick(1490);
        assert_eq!(alerts.load(Ordering::SeqCst), 1);
        assert_eq!(engine.state().pomodoro_count, 1);
    }

    #[test]
    fn completion_after_restore_backdates_session_start() {
        let sink = Arc::new(RecordingSink::default());
        let (mut engine, _) = engine_with(sink.clone());

        engine.restore(TimerSnapshot {
            mode: TimerMode::Work,
            time_left: 60,
            active_task_id: Some("t".to_string()),
            pomodoro_count: 0,
            is_active: true,
        });
        assert!(engine.current_session_start().is_none());
        engine.tick(60);

        let sessions = sink.sessions.lock().unwrap();
        let (_, start, end) = &sessions[0];
        assert_eq!((*end - *start).num_seconds(), 1500);
    }
}
