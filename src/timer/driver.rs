use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::warn;

use super::clock::{ClockCommand, ClockEvent, ClockHandle, ClockSource};
use super::engine::{CompletionAlert, StartTarget, TickOutcome, TimerEngine};
use super::state::{TimerMode, TimerSnapshot};

/// Keeps a [`TimerEngine`] and its background clock in step.
///
/// Without a clock (no runtime, or the task died) the driver still accepts
/// every operation and can be advanced by calling [`tick`](Self::tick).
pub struct TimerDriver {
    engine: TimerEngine,
    clock: Option<(ClockHandle, UnboundedReceiver<ClockEvent>)>,
}

impl TimerDriver {
    /// A driver with no background clock.
    pub fn manual(engine: TimerEngine) -> Self {
        Self {
            engine,
            clock: None,
        }
    }

    pub fn spawn(engine: TimerEngine, wake_interval: Duration) -> Self {
        let mut driver = Self::manual(engine);
        driver.attach_clock(wake_interval);
        driver
    }

    /// Start a background clock, replacing any existing one. Returns false
    /// when the clock could not be spawned.
    pub fn attach_clock(&mut self, wake_interval: Duration) -> bool {
        self.shutdown();
        match ClockSource::spawn(wake_interval) {
            Ok(clock) => self.clock = Some(clock),
            Err(err) => {
                warn!(error = %err, "clock source unavailable, timer needs manual ticks");
                return false;
            }
        }
        if self.engine.state().is_active {
            let time_left = self.engine.state().time_left;
            self.command(ClockCommand::Start { time_left });
        }
        true
    }

    pub fn has_clock(&self) -> bool {
        self.clock.is_some()
    }

    pub fn engine(&self) -> &TimerEngine {
        &self.engine
    }

    pub fn set_alert(&mut self, alert: Box<dyn CompletionAlert + Send>) {
        self.engine.set_alert(alert);
    }

    pub fn start(&mut self, target: StartTarget) -> bool {
        let fresh = self.engine.start_timer(target);
        let time_left = self.engine.state().time_left;
        self.command(ClockCommand::Start { time_left });
        fresh
    }

    pub fn pause(&mut self) {
        self.engine.pause_timer();
        self.command(ClockCommand::Pause);
    }

    pub fn reset(&mut self) {
        self.engine.reset_timer();
        self.command(ClockCommand::Pause);
    }

    pub fn set_mode(&mut self, mode: TimerMode) {
        self.engine.set_mode(mode);
        self.command(ClockCommand::Pause);
    }

    /// Follow a timer state written elsewhere, restarting or stopping the clock to match.
    pub fn adopt(&mut self, snapshot: TimerSnapshot) {
        self.engine.restore(snapshot);
        let state = self.engine.state();
        let command = if state.is_active {
            ClockCommand::Start {
                time_left: state.time_left,
            }
        } else {
            ClockCommand::Pause
        };
        self.command(command);
    }

    pub fn tick(&mut self, delta: u64) -> TickOutcome {
        self.engine.tick(delta)
    }

    pub fn handle_event(&mut self, event: ClockEvent) -> TickOutcome {
        match event {
            ClockEvent::Tick { delta, time_left } => {
                let outcome = self.engine.tick(delta);
                let engine_left = self.engine.state().time_left;
                if self.engine.state().is_active && engine_left != time_left {
                    self.command(ClockCommand::UpdateTime {
                        time_left: engine_left,
                    });
                }
                outcome
            }
            ClockEvent::Complete { delta } => {
                let outcome = self.engine.tick(delta);
                if matches!(outcome, TickOutcome::Completed { .. }) || !self.engine.state().is_active
                {
                    return outcome;
                }
                let remaining = self.engine.state().time_left;
                self.engine.tick(remaining)
            }
        }
    }

    /// Wait for the next clock event and apply it. `None` once no clock is attached.
    pub async fn next_event(&mut self) -> Option<TickOutcome> {
        let event = match self.clock.as_mut() {
            Some((_, events)) => events.recv().await,
            None => return None,
        };
        match event {
            Some(event) => Some(self.handle_event(event)),
            None => {
                warn!("clock source stopped unexpectedly");
                self.clock = None;
                None
            }
        }
    }

    pub fn shutdown(&mut self) {
        if let Some((handle, _)) = self.clock.take() {
            let _ = handle.shutdown();
        }
    }

    fn command(&mut self, command: ClockCommand) {
        let failed = match &self.clock {
            Some((handle, _)) => handle.send(command).err(),
            None => None,
        };
        if let Some(err) = failed {
            warn!(error = %err, "dropping clock source");
            self.clock = None;
        }
    }
}
