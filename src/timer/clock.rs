//! Background clock source.
//!
//! The clock runs on its own tokio task and only talks to the rest of the
//! program through two channels: commands in, elapsed-time events out. Each
//! wake reconciles against the last emission instant instead of counting
//! wakes, so a late or skipped wake is folded into one larger delta.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockCommand {
    Start { time_left: u64 },
    Pause,
    UpdateTime { time_left: u64 },
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// Whole seconds elapsed since the previous emission
    Tick { delta: u64, time_left: u64 },
    /// The countdown reached zero after consuming `delta`
    Complete { delta: u64 },
}

impl ClockEvent {
    pub fn delta(&self) -> u64 {
        match *self {
            ClockEvent::Tick { delta, .. } | ClockEvent::Complete { delta } => delta,
        }
    }
}

/// Drift-correcting countdown core, independent of any scheduler.
#[derive(Debug, Clone, Default)]
pub struct DriftClock {
    time_left: u64,
    last_tick: Option<Instant>,
}

impl DriftClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn time_left(&self) -> u64 {
        self.time_left
    }

    pub fn is_running(&self) -> bool {
        self.last_tick.is_some()
    }

    pub fn start(&mut self, time_left: u64, now: Instant) {
        self.time_left = time_left;
        self.last_tick = Some(now);
    }

    pub fn pause(&mut self) {
        self.last_tick = None;
    }

    pub fn update_time(&mut self, time_left: u64) {
        self.time_left = time_left;
    }

    /// Reconcile at `now`; emits only once at least a whole second has passed.
    pub fn poll(&mut self, now: Instant) -> Option<ClockEvent> {
        let last_tick = self.last_tick?;
        if self.time_left == 0 {
            self.last_tick = None;
            return None;
        }

        let elapsed = now.saturating_duration_since(last_tick).as_secs();
        if elapsed < 1 {
            return None;
        }

        let delta = elapsed.min(self.time_left);
        self.time_left -= delta;
        self.last_tick = Some(now);

        if self.time_left == 0 {
            self.last_tick = None;
            Some(ClockEvent::Complete { delta })
        } else {
            Some(ClockEvent::Tick {
                delta,
                time_left: self.time_left,
            })
        }
    }
}

pub struct ClockSource;

impl ClockSource {
    /// Spawn the clock task on the current tokio runtime.
    pub fn spawn(wake_interval: Duration) -> Result<(ClockHandle, UnboundedReceiver<ClockEvent>)> {
        if wake_interval.is_zero() {
            return Err(Error::InvalidArgument(
                "clock wake interval must be greater than zero".to_string(),
            ));
        }
        let runtime = Handle::try_current().map_err(|err| {
            Error::OperationFailed(format!("clock source needs a tokio runtime: {err}"))
        })?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let task = runtime.spawn(run_clock(wake_interval, command_rx, event_tx));

        debug!(wake_ms = wake_interval.as_millis() as u64, "clock source spawned");
        Ok((
            ClockHandle {
                commands: command_tx,
                task,
            },
            event_rx,
        ))
    }
}

async fn run_clock(
    wake_interval: Duration,
    mut commands: UnboundedReceiver<ClockCommand>,
    events: UnboundedSender<ClockEvent>,
) {
    let mut clock = DriftClock::new();
    let mut ticker = time::interval(wake_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            command = commands.recv() => match command {
                Some(ClockCommand::Start { time_left }) => clock.start(time_left, Instant::now()),
                Some(ClockCommand::Pause) => clock.pause(),
                Some(ClockCommand::UpdateTime { time_left }) => clock.update_time(time_left),
                Some(ClockCommand::Shutdown) | None => break,
            },
            _ = ticker.tick() => {
                if let Some(event) = clock.poll(Instant::now()) {
                    trace!(?event, "clock event");
                    if events.send(event).is_err() {
                        break;
                    }
                }
            }
        }
    }
    debug!("clock source stopped");
}

/// Command side of a running clock task. Dropping it stops the task.
pub struct ClockHandle {
    commands: UnboundedSender<ClockCommand>,
    task: JoinHandle<()>,
}

impl ClockHandle {
    pub fn send(&self, command: ClockCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::OperationFailed("clock source is not running".to_string()))
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(ClockCommand::Shutdown)
    }
}

impl Drop for ClockHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
