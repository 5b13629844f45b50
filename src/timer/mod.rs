//! Focus timer: countdown engine, background clock, and the driver joining them.

pub mod clock;
pub mod driver;
pub mod engine;
pub mod state;

pub use clock::{ClockCommand, ClockEvent, ClockHandle, ClockSource, DriftClock};
pub use driver::TimerDriver;
pub use engine::{
    CompletionAlert, FocusSessionSink, StartTarget, TaskTimeSink, TerminalChime, TickOutcome,
    TimerEngine,
};
pub use state::{TimerMode, TimerSnapshot, TimerState};
