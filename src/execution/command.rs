//! External command task implementation.
//!
//! [`CommandTask`] runs a shell string or an argument list as a child process.
//! Its stdout and stderr are streamed into the log line by line, tagged with
//! the task name.
//!
//! # Quick Start
//!
//! ```rust
//! use kdemo::{CommandTask, ReadinessCheck};
//! use std::time::Duration;
//!
//! let consumer = CommandTask::shell("warehouse-consumer-0", "go run main.go")
//!     .cwd("deploy/go-client")
//!     .upstream("start-redpanda")
//!     .env("APP_MODE", "consumer")
//!     .env("APP_CONSUMER_GROUP", "warehouse")
//!     .env_file("deploy/go-client/template.env")
//!     .checker(ReadinessCheck::port(19092).timeout(Duration::from_secs(30)))
//!     .build();
//! ```
//!
//! # Completion and readiness
//!
//! A task without checkers is done when its process exits. Exit code 0 is
//! success, anything else is [`TaskError::CommandFailed`]. There is no
//! timeout and no retry.
//!
//! A task with checkers is done as soon as every checker passes while its
//! process is still alive. The process is then handed back to the registry
//! through [`TaskContext::keep_running`] and dependents may start. If the
//! process exits non-zero first, the task fails; if it exits 0 first, the
//! checkers still decide. A checker timeout kills the process.
//!
//! # Templates
//!
//! Environment defaults and the command itself may reference the task's
//! declared inputs as `{{input.<name>}}`:
//!
//! ```rust
//! use kdemo::{CommandTask, InputDeclaration};
//!
//! let produce = CommandTask::shell("produce", "go run main.go")
//!     .input(InputDeclaration::str("message").with_default("Cuan"))
//!     .env("APP_MESSAGE_VALUE", "{{input.message}}")
//!     .build();
//! ```

use async_trait::async_trait;
use futures::future::try_join_all;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use crate::core::context::TaskContext;
use crate::core::environment::{EnvError, EnvSpec, check_template, render_template};
use crate::core::input::InputDeclaration;
use crate::core::task::{Task, TaskError};
use crate::core::types::TaskId;
use crate::events::{Event, EventBus};
use crate::readiness::{ReadinessCheck, ReadinessError};

use super::process::{BackgroundProcess, CommandLine, drain, spawn_streaming};

/// A task that executes an external command.
#[derive(Debug, Clone)]
pub struct CommandTask {
    name: String,
    description: Option<String>,
    command: CommandLine,
    cwd: Option<PathBuf>,
    upstreams: Vec<TaskId>,
    checkers: Vec<ReadinessCheck>,
    env: EnvSpec,
    inputs: Vec<InputDeclaration>,
}

/// How the child process stood when the task finished waiting on it.
enum Settled {
    /// Exited with status 0 before or while checkers passed.
    Exited,
    /// Still running with every checker passed.
    Running,
}

impl CommandTask {
    /// Create a new builder for a command task.
    pub fn builder(name: impl Into<String>, command: CommandLine) -> CommandTaskBuilder {
        CommandTaskBuilder::new(name, command)
    }

    /// Shorthand for a builder running `script` through the shell.
    pub fn shell(name: impl Into<String>, script: impl Into<String>) -> CommandTaskBuilder {
        CommandTaskBuilder::new(name, CommandLine::shell(script))
    }

    pub fn command(&self) -> &CommandLine {
        &self.command
    }

    pub fn cwd(&self) -> Option<&PathBuf> {
        self.cwd.as_ref()
    }

    /// Render input placeholders in the command line.
    fn rendered_command(&self, ctx: &TaskContext) -> Result<CommandLine, TaskError> {
        Ok(self
            .command
            .try_map(|part| render_template(part, &ctx.task_id, &self.inputs, &ctx.inputs))?)
    }

    /// Wait for every checker concurrently, reporting each one that passes.
    async fn wait_for_checkers(
        &self,
        task_id: TaskId,
        event_bus: Option<Arc<EventBus>>,
    ) -> Result<(), ReadinessError> {
        try_join_all(self.checkers.iter().map(|check| {
            let task_id = task_id.clone();
            let event_bus = event_bus.clone();
            async move {
                check.wait().await?;
                if let Some(bus) = event_bus {
                    bus.emit(Event::check_passed(task_id, check.target())).await;
                }
                Ok::<(), ReadinessError>(())
            }
        }))
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl Task for CommandTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn upstreams(&self) -> &[TaskId] {
        &self.upstreams
    }

    fn inputs(&self) -> &[InputDeclaration] {
        &self.inputs
    }

    fn env_spec(&self) -> Option<&EnvSpec> {
        Some(&self.env)
    }

    fn checkers(&self) -> &[ReadinessCheck] {
        &self.checkers
    }

    fn check_references(&self, id: &TaskId) -> Result<(), EnvError> {
        self.env.check_references(id, &self.inputs)?;
        for part in self.command.parts() {
            check_template(part, id, &self.inputs)?;
        }
        Ok(())
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    async fn execute(&self, ctx: &mut TaskContext) -> Result<(), TaskError> {
        let command = self.rendered_command(ctx)?;
        let mut cmd = command.to_command();
        cmd.envs(ctx.env.iter());
        if let Some(ref dir) = self.cwd {
            cmd.current_dir(dir);
        }

        let (mut child, pumps) = spawn_streaming(&ctx.task_id, cmd)
            .map_err(|e| TaskError::ExecutionFailed(format!("failed to start `{}`: {}", command, e)))?;

        if self.checkers.is_empty() {
            let status = child
                .wait()
                .await
                .map_err(|e| TaskError::ExecutionFailed(e.to_string()))?;
            drain(pumps).await;
            return if status.success() {
                Ok(())
            } else {
                Err(TaskError::CommandFailed {
                    code: status.code().unwrap_or(-1),
                })
            };
        }

        let settled = {
            let checks = self.wait_for_checkers(ctx.task_id.clone(), ctx.event_bus());
            tokio::pin!(checks);
            let mut exited = false;

            loop {
                tokio::select! {
                    result = &mut checks => {
                        if let Err(e) = result {
                            if !exited {
                                if let Err(kill_err) = child.kill().await {
                                    warn!(
                                        task = %ctx.task_id,
                                        error = %kill_err,
                                        "failed to kill process after readiness failure"
                                    );
                                }
                            }
                            return Err(e.into());
                        }
                        break if exited { Settled::Exited } else { Settled::Running };
                    }
                    status = child.wait(), if !exited => {
                        let status = status.map_err(|e| TaskError::ExecutionFailed(e.to_string()))?;
                        if !status.success() {
                            return Err(TaskError::CommandFailed {
                                code: status.code().unwrap_or(-1),
                            });
                        }
                        exited = true;
                    }
                }
            }
        };

        match settled {
            Settled::Exited => drain(pumps).await,
            Settled::Running => {
                ctx.keep_running(BackgroundProcess::new(ctx.task_id.clone(), child, pumps));
            }
        }
        Ok(())
    }
}

/// Builder for creating `CommandTask` instances.
#[derive(Debug, Clone)]
pub struct CommandTaskBuilder {
    task: CommandTask,
}

impl CommandTaskBuilder {
    /// Create a new builder with the given name and command.
    pub fn new(name: impl Into<String>, command: CommandLine) -> Self {
        Self {
            task: CommandTask {
                name: name.into(),
                description: None,
                command,
                cwd: None,
                upstreams: Vec::new(),
                checkers: Vec::new(),
                env: EnvSpec::new(),
                inputs: Vec::new(),
            },
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.task.description = Some(description.into());
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.task.cwd = Some(dir.into());
        self
    }

    /// Add an upstream task by name.
    pub fn upstream(mut self, name: impl Into<TaskId>) -> Self {
        self.task.upstreams.push(name.into());
        self
    }

    /// Add several upstream tasks.
    pub fn upstreams<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        self.task.upstreams.extend(names.into_iter().map(Into::into));
        self
    }

    /// Add a readiness check.
    pub fn checker(mut self, check: ReadinessCheck) -> Self {
        self.task.checkers.push(check);
        self
    }

    /// Add several readiness checks.
    pub fn checkers(mut self, checks: impl IntoIterator<Item = ReadinessCheck>) -> Self {
        self.task.checkers.extend(checks);
        self
    }

    /// Declare an environment variable with a (possibly templated) default.
    pub fn env(mut self, key: impl Into<String>, default: impl Into<String>) -> Self {
        self.task.env = self.task.env.binding(key, default);
        self
    }

    /// Add an env file, merged below declared defaults.
    pub fn env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.task.env = self.task.env.file(path);
        self
    }

    /// Replace the whole environment declaration.
    pub fn env_spec(mut self, env: EnvSpec) -> Self {
        self.task.env = env;
        self
    }

    /// Declare an input.
    pub fn input(mut self, input: InputDeclaration) -> Self {
        self.task.inputs.push(input);
        self
    }

    /// Build the `CommandTask`.
    pub fn build(self) -> CommandTask {
        self.task
    }
}
