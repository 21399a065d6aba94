//! kdemo - a task orchestrator for a multi-broker Redpanda demo.
//!
//! Tasks are registered by name with the upstreams they depend on. Running a
//! task first runs its upstream closure, each task exactly once, gating
//! dependents on readiness checks where a task declares them.

pub mod config;
pub mod core;
pub mod events;
pub mod execution;
pub mod readiness;
pub mod testing;

pub use config::{ConfigError, ProjectConfig, YamlLoader, load_registry};
pub use core::context::TaskContext;
pub use core::environment::{EnvBinding, EnvError, EnvSpec, Environment};
pub use core::graph::{GraphError, TaskGraph};
pub use core::input::{
    InputDeclaration, InputError, InputKind, InputValues, NoPrompt, Prompter, StdinPrompter,
};
pub use core::task::{Task, TaskError};
pub use core::types::{RunId, TaskId};
pub use events::{Event, EventBus, EventHandler};
pub use execution::{
    BackgroundProcess, CommandLine, CommandTask, CommandTaskBuilder, ComposeTask,
    ComposeTaskBuilder, Registry, RunError, RunOptions, RunReport, TaskExecutor, TaskResult,
    TaskStatus,
};
pub use readiness::{Probe, ReadinessCheck, ReadinessError};
