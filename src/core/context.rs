//! Per-invocation task context.
//!
//! The registry builds one [`TaskContext`] per task just before the task runs.
//! It carries everything resolved during planning (collected inputs and the
//! task's final environment) and collects what the task leaves behind: a
//! process that keeps running after the task became ready.

use std::sync::Arc;

use crate::events::{Event, EventBus};
use crate::execution::BackgroundProcess;

use super::environment::Environment;
use super::input::InputValues;
use super::types::{RunId, TaskId};

/// Context handed to [`Task::execute`](super::task::Task::execute).
pub struct TaskContext {
    /// The task being executed.
    pub task_id: TaskId,

    /// The run this invocation belongs to.
    pub run_id: RunId,

    /// Input values collected for the whole run.
    pub inputs: Arc<InputValues>,

    /// The task's resolved environment.
    pub env: Environment,

    event_bus: Option<Arc<EventBus>>,
    background: Option<BackgroundProcess>,
}

impl TaskContext {
    /// Create a context for one task invocation.
    pub fn new(task_id: TaskId, run_id: RunId, inputs: Arc<InputValues>, env: Environment) -> Self {
        Self {
            task_id,
            run_id,
            inputs,
            env,
            event_bus: None,
            background: None,
        }
    }

    /// Create a context with no inputs and an empty environment.
    pub fn standalone(task_id: impl Into<TaskId>) -> Self {
        Self::new(
            task_id.into(),
            RunId::new(),
            Arc::new(InputValues::new()),
            Environment::new(),
        )
    }

    /// Builder: attach an event bus for progress events.
    pub fn with_event_bus(mut self, event_bus: Option<Arc<EventBus>>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// The attached event bus, if any.
    pub fn event_bus(&self) -> Option<Arc<EventBus>> {
        self.event_bus.clone()
    }

    /// Emit an event if an event bus is attached.
    pub async fn emit(&self, event: Event) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event).await;
        }
    }

    /// Hand over a process that keeps running after the task is ready.
    pub fn keep_running(&mut self, process: BackgroundProcess) {
        self.background = Some(process);
    }

    /// Whether the task left a process running.
    pub fn has_background(&self) -> bool {
        self.background.is_some()
    }

    /// Take the process left running by the task, if any.
    pub fn take_background(&mut self) -> Option<BackgroundProcess> {
        self.background.take()
    }
}
