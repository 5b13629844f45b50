//! devday - personal productivity tracker core
//!
//! This library holds the task registry, the daily session manager, the
//! pomodoro timer with its drift-correcting clock, and the derived views
//! (notifications and metrics) behind the devday CLI.
//!
//! # Core Concepts
//!
//! - **Tasks**: coded work items with refinement, subtasks, notes, and history
//! - **Daily session**: today's hours, goals, code reviews, and focus sessions,
//!   archived into an immutable report at the end of the day
//! - **Timer**: work and break countdowns that book focus time against tasks
//!
//! # Module Organization
//!
//! - `cli`: Command-line interface using clap
//! - `config`: Configuration loading from `devday.toml`
//! - `error`: Error types and result aliases
//! - `task`: Task registry
//! - `daily`: Daily session manager and report archive
//! - `timer`: Countdown engine, background clock, and driver
//! - `notify`: Staleness, refinement, and deadline notifications
//! - `metrics`: Throughput and health metrics
//! - `storage`: JSON documents in the data directory
//! - `lock`: File locking and atomic writes
//! - `journal`: Timer bookings replayed onto reloaded documents
//! - `workspace`: Wiring of the services over one data directory

pub mod cli;
pub mod config;
pub mod daily;
pub mod error;
pub mod journal;
pub mod lock;
pub mod metrics;
pub mod notify;
pub mod output;
pub mod storage;
pub mod task;
pub mod timer;
pub mod workspace;

pub use error::{Error, Result};
