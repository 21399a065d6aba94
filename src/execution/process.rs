//! Child process plumbing shared by command tasks and probe commands.

use std::fmt;
use std::io;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::core::types::TaskId;

/// A command to run: either a shell string or an explicit argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// Run through the platform shell (`sh -c` / `cmd /C`).
    Shell(String),
    /// Run a program directly; the first element is the program.
    Args(Vec<String>),
}

impl CommandLine {
    pub fn shell(script: impl Into<String>) -> Self {
        CommandLine::Shell(script.into())
    }

    pub fn args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandLine::Args(args.into_iter().map(Into::into).collect())
    }

    /// Whether there is nothing to run.
    pub fn is_empty(&self) -> bool {
        match self {
            CommandLine::Shell(script) => script.trim().is_empty(),
            CommandLine::Args(args) => args.first().is_none_or(|p| p.trim().is_empty()),
        }
    }

    /// Every string of the command line, in order.
    pub fn parts(&self) -> &[String] {
        match self {
            CommandLine::Shell(script) => std::slice::from_ref(script),
            CommandLine::Args(args) => args,
        }
    }

    /// Rewrite every string of the command line.
    pub fn try_map<E>(&self, mut f: impl FnMut(&str) -> Result<String, E>) -> Result<Self, E> {
        Ok(match self {
            CommandLine::Shell(script) => CommandLine::Shell(f(script)?),
            CommandLine::Args(args) => CommandLine::Args(
                args.iter()
                    .map(|arg| f(arg))
                    .collect::<Result<Vec<_>, E>>()?,
            ),
        })
    }

    /// Build a tokio command for this command line.
    pub fn to_command(&self) -> Command {
        match self {
            CommandLine::Shell(script) => {
                let mut cmd = if cfg!(windows) {
                    let mut cmd = Command::new("cmd");
                    cmd.arg("/C");
                    cmd
                } else {
                    let mut cmd = Command::new("sh");
                    cmd.arg("-c");
                    cmd
                };
                cmd.arg(script);
                cmd
            }
            CommandLine::Args(args) => {
                let mut cmd = Command::new(args.first().map(String::as_str).unwrap_or_default());
                cmd.args(args.iter().skip(1));
                cmd
            }
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandLine::Shell(script) => write!(f, "{}", script),
            CommandLine::Args(args) => write!(f, "{}", args.join(" ")),
        }
    }
}

/// Spawn `cmd` and forward its stdout/stderr, line by line, to the log.
///
/// The child is killed if its handle is dropped.
pub(crate) fn spawn_streaming(
    task_id: &TaskId,
    mut cmd: Command,
) -> io::Result<(Child, Vec<JoinHandle<()>>)> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn()?;
    let mut pumps = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        pumps.push(pump_lines(task_id.clone(), stdout, false));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(pump_lines(task_id.clone(), stderr, true));
    }
    Ok((child, pumps))
}

fn pump_lines<R>(task_id: TaskId, reader: R, is_stderr: bool) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if is_stderr {
                warn!(task = %task_id, "{}", line);
            } else {
                info!(task = %task_id, "{}", line);
            }
        }
    })
}

/// Wait for the output pumps to drain after the child exited.
pub(crate) async fn drain(pumps: Vec<JoinHandle<()>>) {
    for pump in pumps {
        let _ = pump.await;
    }
}

/// A process left running by a task that became ready.
#[derive(Debug)]
pub struct BackgroundProcess {
    task_id: TaskId,
    child: Child,
    pumps: Vec<JoinHandle<()>>,
}

impl BackgroundProcess {
    pub(crate) fn new(task_id: TaskId, child: Child, pumps: Vec<JoinHandle<()>>) -> Self {
        Self {
            task_id,
            child,
            pumps,
        }
    }

    /// The task that started this process.
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// OS process id, while the process is alive.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Check whether the process has exited, without blocking.
    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Wait for the process to exit on its own.
    pub async fn wait(mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait().await?;
        drain(self.pumps).await;
        Ok(status)
    }

    /// Kill the process and reap it.
    ///
    /// Grandchildren of a shell may outlive it and keep the pipes open, so the
    /// output pumps are stopped rather than drained.
    pub async fn kill(mut self) -> io::Result<()> {
        for pump in &self.pumps {
            pump.abort();
        }
        self.child.kill().await
    }
}
