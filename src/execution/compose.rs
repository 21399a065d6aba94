//! Container compose lifecycle task.
//!
//! A [`ComposeTask`] runs one `docker compose` subcommand (`up`, `down`, ...)
//! against a compose file. It is a [`CommandTask`] with a fixed argument
//! layout, so it streams output, honours checkers and keeps a foreground
//! `up` running in the background exactly like any other command.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::core::context::TaskContext;
use crate::core::environment::{EnvError, EnvSpec};
use crate::core::input::InputDeclaration;
use crate::core::task::{Task, TaskError};
use crate::core::types::TaskId;
use crate::readiness::ReadinessCheck;

use super::command::{CommandTask, CommandTaskBuilder};
use super::process::CommandLine;

/// Program used when none is configured.
pub const DEFAULT_COMPOSE_PROGRAM: &str = "docker";

/// A task that drives a compose project.
#[derive(Debug, Clone)]
pub struct ComposeTask {
    subcommand: String,
    inner: CommandTask,
}

impl ComposeTask {
    pub fn builder(name: impl Into<String>, subcommand: impl Into<String>) -> ComposeTaskBuilder {
        ComposeTaskBuilder::new(name, subcommand)
    }

    /// The compose subcommand, e.g. `up`.
    pub fn subcommand(&self) -> &str {
        &self.subcommand
    }

    /// The full command line this task runs.
    pub fn command(&self) -> &CommandLine {
        self.inner.command()
    }

}

#[async_trait]
impl Task for ComposeTask {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn upstreams(&self) -> &[TaskId] {
        self.inner.upstreams()
    }

    fn inputs(&self) -> &[InputDeclaration] {
        self.inner.inputs()
    }

    fn env_spec(&self) -> Option<&EnvSpec> {
        self.inner.env_spec()
    }

    fn checkers(&self) -> &[ReadinessCheck] {
        self.inner.checkers()
    }

    fn check_references(&self, id: &TaskId) -> Result<(), EnvError> {
        self.inner.check_references(id)
    }

    fn description(&self) -> Option<&str> {
        self.inner.description()
    }

    async fn execute(&self, ctx: &mut TaskContext) -> Result<(), TaskError> {
        self.inner.execute(ctx).await
    }
}

/// Builder for [`ComposeTask`].
#[derive(Debug, Clone)]
pub struct ComposeTaskBuilder {
    name: String,
    subcommand: String,
    program: String,
    file: Option<PathBuf>,
    project: Option<String>,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    description: Option<String>,
    upstreams: Vec<TaskId>,
    checkers: Vec<ReadinessCheck>,
    env: EnvSpec,
}

impl ComposeTaskBuilder {
    pub fn new(name: impl Into<String>, subcommand: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subcommand: subcommand.into(),
            program: DEFAULT_COMPOSE_PROGRAM.to_string(),
            file: None,
            project: None,
            args: Vec::new(),
            cwd: None,
            description: None,
            upstreams: Vec::new(),
            checkers: Vec::new(),
            env: EnvSpec::new(),
        }
    }

    /// Use another container CLI (`podman`, `nerdctl`).
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Compose file, passed as `-f`.
    pub fn file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Project name, passed as `-p`.
    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Extra arguments appended after the subcommand.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn upstream(mut self, name: impl Into<TaskId>) -> Self {
        self.upstreams.push(name.into());
        self
    }

    pub fn checker(mut self, check: ReadinessCheck) -> Self {
        self.checkers.push(check);
        self
    }

    pub fn checkers(mut self, checks: impl IntoIterator<Item = ReadinessCheck>) -> Self {
        self.checkers.extend(checks);
        self
    }

    pub fn env_spec(mut self, env: EnvSpec) -> Self {
        self.env = env;
        self
    }

    fn command_line(&self) -> CommandLine {
        let mut argv = vec![self.program.clone(), "compose".to_string()];
        if let Some(ref file) = self.file {
            argv.push("-f".to_string());
            argv.push(file.display().to_string());
        }
        if let Some(ref project) = self.project {
            argv.push("-p".to_string());
            argv.push(project.clone());
        }
        argv.push(self.subcommand.clone());
        argv.extend(self.args.iter().cloned());
        CommandLine::Args(argv)
    }

    pub fn build(self) -> ComposeTask {
        let mut inner: CommandTaskBuilder = CommandTask::builder(self.name.clone(), self.command_line())
            .upstreams(self.upstreams.clone())
            .checkers(self.checkers.clone())
            .env_spec(self.env.clone());
        if let Some(ref cwd) = self.cwd {
            inner = inner.cwd(cwd);
        }
        if let Some(ref description) = self.description {
            inner = inner.description(description);
        }
        ComposeTask {
            subcommand: self.subcommand,
            inner: inner.build(),
        }
    }
}
