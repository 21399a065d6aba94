//! Single-task execution.
//!
//! The `TaskExecutor` runs one task against its prepared context and turns the
//! outcome into a [`TaskResult`]. It emits the task-level lifecycle events and
//! takes over any process the task left running.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::core::context::TaskContext;
use crate::core::task::Task;
use crate::core::types::TaskId;
use crate::events::{Event, EventBus};

use super::process::BackgroundProcess;

/// Result of executing a task.
#[derive(Debug)]
pub struct TaskResult {
    /// The task that was executed.
    pub task_id: TaskId,
    /// Whether the task succeeded (completed or became ready).
    pub success: bool,
    /// Time from start to completion, readiness or failure.
    pub duration: Duration,
    /// Error if the task failed.
    pub error: Option<String>,
    /// Exit code if the task failed because its command exited non-zero.
    pub exit_code: Option<i32>,
    /// Process left running by a task that became ready.
    pub background: Option<BackgroundProcess>,
}

impl TaskResult {
    /// Create a successful result.
    pub fn success(task_id: TaskId, duration: Duration) -> Self {
        Self {
            task_id,
            success: true,
            duration,
            error: None,
            exit_code: None,
            background: None,
        }
    }

    /// Create a result for a task whose process keeps running.
    pub fn ready(task_id: TaskId, duration: Duration, process: BackgroundProcess) -> Self {
        Self {
            background: Some(process),
            ..Self::success(task_id, duration)
        }
    }

    /// Create a failed result.
    pub fn failure(
        task_id: TaskId,
        duration: Duration,
        error: String,
        exit_code: Option<i32>,
    ) -> Self {
        Self {
            task_id,
            success: false,
            duration,
            error: Some(error),
            exit_code,
            background: None,
        }
    }

    /// Whether the task left a process running.
    pub fn is_ready(&self) -> bool {
        self.background.is_some()
    }
}

/// Runs individual tasks and reports their lifecycle.
#[derive(Default, Clone)]
pub struct TaskExecutor {
    event_bus: Option<Arc<EventBus>>,
}

impl TaskExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: emit lifecycle events on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    async fn emit(&self, event: Event) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event).await;
        }
    }

    /// Execute a task once. No retries.
    pub async fn execute(&self, task: &dyn Task, ctx: &mut TaskContext) -> TaskResult {
        let task_id = TaskId::new(task.name());
        let start_time = Instant::now();

        self.emit(Event::task_started(task_id.clone(), ctx.run_id))
            .await;
        info!(task = %task_id, "task started");

        let outcome = task.execute(ctx).await;
        let duration = start_time.elapsed();

        match outcome {
            Ok(()) => match ctx.take_background() {
                Some(process) => {
                    let pid = process.pid();
                    info!(task = %task_id, pid = ?pid, elapsed_ms = %duration.as_millis(), "task ready");
                    self.emit(Event::task_ready(task_id.clone(), pid, duration))
                        .await;
                    TaskResult::ready(task_id, duration, process)
                }
                None => {
                    info!(task = %task_id, elapsed_ms = %duration.as_millis(), "task completed");
                    self.emit(Event::task_completed(task_id.clone(), duration))
                        .await;
                    TaskResult::success(task_id, duration)
                }
            },
            Err(err) => {
                let exit_code = err.exit_code();
                error!(task = %task_id, error = %err, "task failed");
                self.emit(Event::task_failed(task_id.clone(), err.to_string(), exit_code))
                    .await;
                TaskResult::failure(task_id, duration, err.to_string(), exit_code)
            }
        }
    }
}
