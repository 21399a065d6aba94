//! Task registry and run orchestration.
//!
//! The [`Registry`] owns every task for the lifetime of the process and runs a
//! named task together with its upstream closure:
//!
//! 1. **Plan**: resolve the closure in dependency order. Cycles and unknown
//!    upstreams are reported here.
//! 2. **Collect**: gather one value per input declared anywhere in the plan.
//! 3. **Resolve**: compute every task's environment.
//! 4. **Execute**: each task gets a memoized future that awaits all of its
//!    upstream futures concurrently and then runs the task.
//!
//! Steps 1 to 3 either succeed for the whole plan or fail with a [`RunError`]
//! before a single process is spawned. Failures during step 4 are recorded in
//! the [`RunReport`]; a failed task skips its dependent subtree only.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::core::context::TaskContext;
use crate::core::environment::{EnvError, Environment};
use crate::core::graph::{GraphError, TaskGraph};
use crate::core::input::{InputError, InputValues, NoPrompt, Prompter, collect_inputs};
use crate::core::task::Task;
use crate::core::types::{RunId, TaskId};
use crate::events::{Event, EventBus};

use super::executor::TaskExecutor;
use super::process::BackgroundProcess;

/// Errors that stop a run before anything is spawned.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Env(#[from] EnvError),
}

/// Final status of a task within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// The task ran to completion.
    Completed,
    /// All checks passed; the task's process keeps running.
    Ready,
    /// The task failed.
    Failed {
        error: String,
        exit_code: Option<i32>,
    },
    /// Not started because an upstream did not succeed.
    Skipped { upstream: TaskId },
}

impl TaskStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Ready)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Ready => write!(f, "ready"),
            TaskStatus::Failed { error, .. } => write!(f, "failed: {}", error),
            TaskStatus::Skipped { upstream } => {
                write!(f, "skipped (upstream '{}' did not succeed)", upstream)
            }
        }
    }
}

/// Invocation-time settings for a run.
#[derive(Clone)]
pub struct RunOptions {
    /// Input overrides, keyed by input name or shortcut.
    pub inputs: HashMap<String, String>,
    /// Environment overrides, applied to keys a task declares.
    pub env: HashMap<String, String>,
    /// Source of interactive answers for inputs without an override.
    pub prompter: Arc<dyn Prompter>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self {
            inputs: HashMap::new(),
            env: HashMap::new(),
            prompter: Arc::new(NoPrompt),
        }
    }

    /// Builder: override an input.
    pub fn input(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }

    /// Builder: override an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Builder: ask for input values interactively.
    pub fn prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: RunId,
    pub target: TaskId,
    /// Planned tasks in dependency order.
    pub order: Vec<TaskId>,
    /// Final status of each planned task.
    pub statuses: HashMap<TaskId, TaskStatus>,
    pub duration: Duration,
    background: Vec<BackgroundProcess>,
}

impl RunReport {
    /// Whether every planned task completed or became ready.
    pub fn success(&self) -> bool {
        self.statuses.values().all(TaskStatus::is_success)
    }

    pub fn status(&self, task_id: &TaskId) -> Option<&TaskStatus> {
        self.statuses.get(task_id)
    }

    fn with_status(&self, pred: impl Fn(&TaskStatus) -> bool) -> Vec<TaskId> {
        self.order
            .iter()
            .filter(|id| self.statuses.get(*id).is_some_and(&pred))
            .cloned()
            .collect()
    }

    /// Failed tasks, in plan order.
    pub fn failed_tasks(&self) -> Vec<TaskId> {
        self.with_status(|s| matches!(s, TaskStatus::Failed { .. }))
    }

    /// Skipped tasks, in plan order.
    pub fn skipped_tasks(&self) -> Vec<TaskId> {
        self.with_status(|s| matches!(s, TaskStatus::Skipped { .. }))
    }

    /// Processes still running after their tasks became ready.
    pub fn background(&self) -> &[BackgroundProcess] {
        &self.background
    }

    /// Wait until every background process exits on its own.
    pub async fn wait_background(&mut self) -> Vec<(TaskId, io::Result<ExitStatus>)> {
        let processes = std::mem::take(&mut self.background);
        join_all(processes.into_iter().map(|process| async move {
            let task_id = process.task_id().clone();
            (task_id, process.wait().await)
        }))
        .await
    }

    /// Kill every background process.
    pub async fn shutdown(&mut self) {
        for process in self.background.drain(..) {
            let task_id = process.task_id().clone();
            if let Err(e) = process.kill().await {
                warn!(task = %task_id, error = %e, "failed to stop background process");
            }
        }
    }
}

type TaskFuture = Shared<BoxFuture<'static, bool>>;

/// Shared bookkeeping for the futures of one run.
struct RunState {
    run_id: RunId,
    inputs: Arc<InputValues>,
    executor: TaskExecutor,
    event_bus: Option<Arc<EventBus>>,
    statuses: Mutex<HashMap<TaskId, TaskStatus>>,
    background: Mutex<Vec<BackgroundProcess>>,
}

impl RunState {
    async fn emit(&self, event: Event) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event).await;
        }
    }

    async fn record(&self, task_id: TaskId, status: TaskStatus) {
        self.statuses.lock().await.insert(task_id, status);
    }
}

/// Registry of named tasks.
#[derive(Default)]
pub struct Registry {
    graph: TaskGraph,
    event_bus: Option<Arc<EventBus>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("tasks", &self.graph.task_ids())
            .field("event_bus", &self.event_bus.is_some())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: emit lifecycle events on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Register a task under its name.
    pub fn register(&mut self, task: Arc<dyn Task>) -> Result<(), GraphError> {
        self.graph.add_task(task)
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Task>> {
        self.graph.get_task(&TaskId::new(name))
    }

    /// Registered task names, in registration order.
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.graph.task_ids().iter().map(|id| id.as_str())
    }

    /// Dependency-ordered closure of `name`, ending with `name`.
    pub fn plan(&self, name: &str) -> Result<Vec<TaskId>, GraphError> {
        self.graph.plan(&TaskId::new(name))
    }

    /// Check every registered task's closure.
    pub fn validate(&self) -> Result<(), GraphError> {
        self.graph.validate()
    }

    /// Run `name` and its upstream closure.
    pub async fn run(&self, name: &str, options: RunOptions) -> Result<RunReport, RunError> {
        let target = TaskId::new(name);
        let run_id = RunId::new();
        let start_time = Instant::now();

        let order = self.graph.plan(&target)?;
        let tasks: Vec<Arc<dyn Task>> = order
            .iter()
            .map(|id| {
                self.graph
                    .get_task(id)
                    .cloned()
                    .ok_or_else(|| GraphError::TaskNotFound(id.clone()))
            })
            .collect::<Result<_, _>>()?;

        let inputs = collect_inputs(
            tasks.iter().flat_map(|task| task.inputs()),
            &options.inputs,
            options.prompter.as_ref(),
        )?;

        for (id, task) in order.iter().zip(&tasks) {
            task.check_references(id)?;
        }
        let mut envs: HashMap<TaskId, Environment> = HashMap::with_capacity(tasks.len());
        for (id, task) in order.iter().zip(&tasks) {
            let env = match task.env_spec() {
                Some(spec) => spec.resolve(id, task.inputs(), &inputs, &options.env)?,
                None => Environment::new(),
            };
            envs.insert(id.clone(), env);
        }

        let span = info_span!("run", run = %run_id, target = %target, task_count = order.len());
        async move {
            info!("run started");
            let state = Arc::new(RunState {
                run_id,
                inputs: Arc::new(inputs),
                executor: match &self.event_bus {
                    Some(bus) => TaskExecutor::new().with_event_bus(bus.clone()),
                    None => TaskExecutor::new(),
                },
                event_bus: self.event_bus.clone(),
                statuses: Mutex::new(HashMap::new()),
                background: Mutex::new(Vec::new()),
            });
            state
                .emit(Event::run_started(run_id, target.clone(), order.len()))
                .await;

            let mut futures: HashMap<TaskId, TaskFuture> = HashMap::with_capacity(order.len());
            for (id, task) in order.iter().zip(tasks) {
                let upstreams = task
                    .upstreams()
                    .iter()
                    .map(|up| {
                        futures
                            .get(up)
                            .cloned()
                            .map(|fut| (up.clone(), fut))
                            .ok_or_else(|| GraphError::UnknownTask {
                                from: id.clone(),
                                to: up.clone(),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let env = envs.remove(id).unwrap_or_default();
                let fut = run_task(state.clone(), id.clone(), task, upstreams, env)
                    .boxed()
                    .shared();
                futures.insert(id.clone(), fut);
            }

            if let Some(fut) = futures.get(&target) {
                fut.clone().await;
            }
            drop(futures);

            let statuses = std::mem::take(&mut *state.statuses.lock().await);
            let background = std::mem::take(&mut *state.background.lock().await);
            let report = RunReport {
                run_id,
                target,
                order,
                statuses,
                duration: start_time.elapsed(),
                background,
            };

            let success = report.success();
            info!(
                success = success,
                background = report.background.len(),
                elapsed_ms = %report.duration.as_millis(),
                "run completed"
            );
            state
                .emit(Event::run_completed(run_id, success, report.duration))
                .await;
            Ok::<RunReport, RunError>(report)
        }
        .instrument(span)
        .await
    }
}

/// Await upstreams, then execute one task and record its status.
async fn run_task(
    state: Arc<RunState>,
    id: TaskId,
    task: Arc<dyn Task>,
    upstreams: Vec<(TaskId, TaskFuture)>,
    env: Environment,
) -> bool {
    let results = join_all(upstreams.iter().map(|(_, fut)| fut.clone())).await;
    let failed = upstreams
        .iter()
        .zip(results)
        .find(|(_, ok)| !ok)
        .map(|((up, _), _)| up.clone());

    if let Some(upstream) = failed {
        debug!(task = %id, upstream = %upstream, "skipping task");
        state
            .emit(Event::task_skipped(id.clone(), upstream.clone()))
            .await;
        state.record(id, TaskStatus::Skipped { upstream }).await;
        return false;
    }

    let mut ctx = TaskContext::new(id.clone(), state.run_id, state.inputs.clone(), env)
        .with_event_bus(state.event_bus.clone());
    let result = state.executor.execute(task.as_ref(), &mut ctx).await;

    let status = if !result.success {
        TaskStatus::Failed {
            error: result.error.unwrap_or_default(),
            exit_code: result.exit_code,
        }
    } else if let Some(process) = result.background {
        state.background.lock().await.push(process);
        TaskStatus::Ready
    } else {
        TaskStatus::Completed
    };
    let success = status.is_success();
    state.record(id, status).await;
    success
}
