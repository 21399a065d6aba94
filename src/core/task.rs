//! Task trait and error types.
//!
//! The `Task` trait is the unit of work the registry schedules. A task names
//! its upstreams, declares the inputs and environment it needs, and executes
//! against a [`TaskContext`] once everything upstream is done or ready.

use async_trait::async_trait;
use thiserror::Error;

use super::context::TaskContext;
use super::environment::{EnvError, EnvSpec};
use super::input::InputDeclaration;
use super::types::TaskId;
use crate::readiness::{ReadinessCheck, ReadinessError};

/// Errors that can occur during task execution.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task could not be started (program not found, bad working directory).
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// External command exited with a non-zero code.
    #[error("command exited with code {code}")]
    CommandFailed { code: i32 },

    /// A readiness check did not pass in time.
    #[error(transparent)]
    Readiness(#[from] ReadinessError),

    /// Environment resolution failed at execution time.
    #[error(transparent)]
    Environment(#[from] EnvError),

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl TaskError {
    /// Exit code of the failed command, if the failure came from one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            TaskError::CommandFailed { code } => Some(*code),
            _ => None,
        }
    }
}

/// The core trait for defining executable tasks.
///
/// # Example
///
/// ```ignore
/// use kdemo::{Task, TaskContext, TaskError};
/// use async_trait::async_trait;
///
/// struct Announce;
///
/// #[async_trait]
/// impl Task for Announce {
///     fn name(&self) -> &str {
///         "announce"
///     }
///
///     async fn execute(&self, ctx: &mut TaskContext) -> Result<(), TaskError> {
///         tracing::info!(mode = ?ctx.env.get("APP_MODE"), "announcing");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + Sync {
    /// Returns the unique name of this task.
    fn name(&self) -> &str;

    /// Tasks that must complete, or become ready, before this one starts.
    fn upstreams(&self) -> &[TaskId] {
        &[]
    }

    /// Inputs this task accepts at invocation time.
    fn inputs(&self) -> &[InputDeclaration] {
        &[]
    }

    /// Environment this task declares. Resolved by the registry before any
    /// task in the run starts.
    fn env_spec(&self) -> Option<&EnvSpec> {
        None
    }

    /// Checks that must pass before dependents may start.
    fn checkers(&self) -> &[ReadinessCheck] {
        &[]
    }

    /// Verify that every `{{input.<name>}}` placeholder the task will render
    /// names one of its declared inputs.
    ///
    /// Called by the registry before any task in the run starts. The default
    /// covers the environment spec; tasks that render other templates at
    /// execution time should check those too.
    fn check_references(&self, id: &TaskId) -> Result<(), EnvError> {
        match self.env_spec() {
            Some(spec) => spec.check_references(id, self.inputs()),
            None => Ok(()),
        }
    }

    /// Execute the task.
    ///
    /// Returning `Ok(())` marks the task done. A task that leaves a process
    /// running hands it over through [`TaskContext::keep_running`].
    async fn execute(&self, ctx: &mut TaskContext) -> Result<(), TaskError>;

    /// Optional description for display/logging purposes.
    fn description(&self) -> Option<&str> {
        None
    }
}
