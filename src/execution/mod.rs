//! Task execution engine.
//!
//! This module provides the execution infrastructure for running tasks:
//! external commands and compose lifecycles, readiness gating, and the
//! registry that orchestrates a task with its upstream closure.

mod command;
mod compose;
mod executor;
mod process;
mod registry;

pub use command::{CommandTask, CommandTaskBuilder};
pub use compose::{ComposeTask, ComposeTaskBuilder, DEFAULT_COMPOSE_PROGRAM};
pub use executor::{TaskExecutor, TaskResult};
pub use process::{BackgroundProcess, CommandLine};
pub use registry::{Registry, RunError, RunOptions, RunReport, TaskStatus};
