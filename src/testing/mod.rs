//! Testing utilities for users of the kdemo library.
//!
//! This module provides helpers for testing task graphs without spawning
//! processes:
//!
//! - [`RecordingTask`]: records every invocation, in order, with its environment
//! - [`FailingTask`]: fails every invocation with a chosen exit code
//! - [`TestHarness`]: a registry wired to an event recorder

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::core::context::TaskContext;
use crate::core::environment::{EnvSpec, Environment};
use crate::core::input::InputDeclaration;
use crate::core::task::{Task, TaskError};
use crate::core::types::TaskId;
use crate::events::{Event, EventBus, EventHandler};
use crate::execution::{Registry, RunError, RunOptions, RunReport};

/// One recorded task invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub task_id: TaskId,
    pub env: Environment,
}

/// A shared, ordered log of invocations.
#[derive(Debug, Clone, Default)]
pub struct InvocationLog {
    entries: Arc<Mutex<Vec<Invocation>>>,
}

impl InvocationLog {
    pub fn new() -> Self {
        Self::default()
    }

    async fn push(&self, invocation: Invocation) {
        self.entries.lock().await.push(invocation);
    }

    /// All invocations so far.
    pub async fn entries(&self) -> Vec<Invocation> {
        self.entries.lock().await.clone()
    }

    /// Task names in invocation order.
    pub async fn names(&self) -> Vec<String> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|i| i.task_id.as_str().to_string())
            .collect()
    }

    /// How often `name` was invoked.
    pub async fn count(&self, name: &str) -> usize {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|i| i.task_id.as_str() == name)
            .count()
    }
}

/// A task that records its invocations.
///
/// # Example
///
/// ```
/// use kdemo::testing::{InvocationLog, RecordingTask};
///
/// let log = InvocationLog::new();
/// let consumer = RecordingTask::new("warehouse-consumer-0", &log)
///     .upstream("start-redpanda")
///     .env("APP_MODE", "consumer");
/// ```
pub struct RecordingTask {
    name: String,
    upstreams: Vec<TaskId>,
    inputs: Vec<InputDeclaration>,
    env: EnvSpec,
    log: InvocationLog,
}

impl RecordingTask {
    pub fn new(name: impl Into<String>, log: &InvocationLog) -> Self {
        Self {
            name: name.into(),
            upstreams: Vec::new(),
            inputs: Vec::new(),
            env: EnvSpec::new(),
            log: log.clone(),
        }
    }

    pub fn upstream(mut self, name: impl Into<TaskId>) -> Self {
        self.upstreams.push(name.into());
        self
    }

    pub fn input(mut self, input: InputDeclaration) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn env(mut self, key: impl Into<String>, default: impl Into<String>) -> Self {
        self.env = self.env.binding(key, default);
        self
    }
}

#[async_trait]
impl Task for RecordingTask {
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

    async fn execute(&self, ctx: &mut TaskContext) -> Result<(), TaskError> {
        self.log
            .push(Invocation {
                task_id: ctx.task_id.clone(),
                env: ctx.env.clone(),
            })
            .await;
        Ok(())
    }
}

/// A task that fails on every invocation.
///
/// Failures are reported as a command exiting with `exit_code`.
///
/// # Example
///
/// ```
/// use kdemo::testing::FailingTask;
///
/// let task = FailingTask::always("produce").exit_code(2);
/// ```
pub struct FailingTask {
    name: String,
    upstreams: Vec<TaskId>,
    exit_code: i32,
}

impl FailingTask {
    pub fn always(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            upstreams: Vec::new(),
            exit_code: 1,
        }
    }

    pub fn upstream(mut self, name: impl Into<TaskId>) -> Self {
        self.upstreams.push(name.into());
        self
    }

    /// Exit code reported on failure.
    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }
}

#[async_trait]
impl Task for FailingTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn upstreams(&self) -> &[TaskId] {
        &self.upstreams
    }

    async fn execute(&self, _ctx: &mut TaskContext) -> Result<(), TaskError> {
        Err(TaskError::CommandFailed {
            code: self.exit_code,
        })
    }
}

/// Records every event it receives.
#[derive(Default)]
pub struct EventRecorder {
    events: Mutex<Vec<Event>>,
}

impl EventRecorder {
    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventHandler for EventRecorder {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}

/// A registry with an [`EventRecorder`] attached.
pub struct TestHarness {
    registry: Registry,
    recorder: Arc<EventRecorder>,
}

impl TestHarness {
    pub async fn new() -> Self {
        let bus = Arc::new(EventBus::new());
        let recorder = Arc::new(EventRecorder::default());
        bus.register(recorder.clone()).await;
        Self {
            registry: Registry::new().with_event_bus(bus),
            recorder,
        }
    }

    /// Register a task, panicking on a duplicate name.
    pub fn register(&mut self, task: impl Task + 'static) -> &mut Self {
        if let Err(e) = self.registry.register(Arc::new(task)) {
            panic!("failed to register task: {}", e);
        }
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub async fn run(&self, name: &str, options: RunOptions) -> Result<RunReport, RunError> {
        self.registry.run(name, options).await
    }

    pub async fn events(&self) -> Vec<Event> {
        self.recorder.events().await
    }
}
