//! Lifecycle events and event handling.
//!
//! The registry emits an [`Event`] at every step of a run. Handlers registered
//! on the [`EventBus`] receive them in emission order.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::core::types::{RunId, TaskId};

/// Lifecycle events emitted during a run.
#[derive(Debug, Clone)]
pub enum Event {
    /// A run has been planned and is about to start.
    RunStarted {
        run_id: RunId,
        target: TaskId,
        task_count: usize,
        timestamp: Instant,
    },

    /// A task has started execution.
    TaskStarted {
        task_id: TaskId,
        run_id: RunId,
        timestamp: Instant,
    },

    /// One readiness check of a task passed.
    CheckPassed {
        task_id: TaskId,
        target: String,
        timestamp: Instant,
    },

    /// A task's process is up and all its checks passed; it keeps running.
    TaskReady {
        task_id: TaskId,
        pid: Option<u32>,
        duration: Duration,
        timestamp: Instant,
    },

    /// A task finished successfully.
    TaskCompleted {
        task_id: TaskId,
        duration: Duration,
        timestamp: Instant,
    },

    /// A task failed.
    TaskFailed {
        task_id: TaskId,
        error: String,
        exit_code: Option<i32>,
        timestamp: Instant,
    },

    /// A task was not started because an upstream failed.
    TaskSkipped {
        task_id: TaskId,
        upstream: TaskId,
        timestamp: Instant,
    },

    /// The run finished (successfully or not).
    RunCompleted {
        run_id: RunId,
        success: bool,
        duration: Duration,
        timestamp: Instant,
    },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::RunStarted { timestamp, .. } => *timestamp,
            Event::TaskStarted { timestamp, .. } => *timestamp,
            Event::CheckPassed { timestamp, .. } => *timestamp,
            Event::TaskReady { timestamp, .. } => *timestamp,
            Event::TaskCompleted { timestamp, .. } => *timestamp,
            Event::TaskFailed { timestamp, .. } => *timestamp,
            Event::TaskSkipped { timestamp, .. } => *timestamp,
            Event::RunCompleted { timestamp, .. } => *timestamp,
        }
    }

    /// The task this event is about, if any.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Event::TaskStarted { task_id, .. }
            | Event::CheckPassed { task_id, .. }
            | Event::TaskReady { task_id, .. }
            | Event::TaskCompleted { task_id, .. }
            | Event::TaskFailed { task_id, .. }
            | Event::TaskSkipped { task_id, .. } => Some(task_id),
            Event::RunStarted { .. } | Event::RunCompleted { .. } => None,
        }
    }

    pub fn run_started(run_id: RunId, target: TaskId, task_count: usize) -> Self {
        Event::RunStarted {
            run_id,
            target,
            task_count,
            timestamp: Instant::now(),
        }
    }

    pub fn task_started(task_id: TaskId, run_id: RunId) -> Self {
        Event::TaskStarted {
            task_id,
            run_id,
            timestamp: Instant::now(),
        }
    }

    pub fn check_passed(task_id: TaskId, target: impl Into<String>) -> Self {
        Event::CheckPassed {
            task_id,
            target: target.into(),
            timestamp: Instant::now(),
        }
    }

    pub fn task_ready(task_id: TaskId, pid: Option<u32>, duration: Duration) -> Self {
        Event::TaskReady {
            task_id,
            pid,
            duration,
            timestamp: Instant::now(),
        }
    }

    pub fn task_completed(task_id: TaskId, duration: Duration) -> Self {
        Event::TaskCompleted {
            task_id,
            duration,
            timestamp: Instant::now(),
        }
    }

    pub fn task_failed(task_id: TaskId, error: String, exit_code: Option<i32>) -> Self {
        Event::TaskFailed {
            task_id,
            error,
            exit_code,
            timestamp: Instant::now(),
        }
    }

    pub fn task_skipped(task_id: TaskId, upstream: TaskId) -> Self {
        Event::TaskSkipped {
            task_id,
            upstream,
            timestamp: Instant::now(),
        }
    }

    pub fn run_completed(run_id: RunId, success: bool, duration: Duration) -> Self {
        Event::RunCompleted {
            run_id,
            success,
            duration,
            timestamp: Instant::now(),
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
