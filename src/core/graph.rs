//! Task graph and execution planning.
//!
//! Tasks declare their upstreams by name. The graph stores the registered
//! tasks and those upstream edges, and computes, for a target task, the order
//! in which its upstream closure has to run.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::task::Task;
use super::types::TaskId;

/// Errors that can occur when working with the task graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The upstream closure of a task contains the task itself.
    #[error("cycle detected: {}", CyclePath(.path))]
    Cycle { path: Vec<TaskId> },

    /// An upstream reference does not resolve to a registered task.
    #[error("unknown task: '{from}' depends on unregistered task '{to}'")]
    UnknownTask { from: TaskId, to: TaskId },

    /// Attempted to register a second task under an existing name.
    #[error("duplicate task: {0}")]
    DuplicateTask(TaskId),

    /// The requested task is not registered.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
}

struct CyclePath<'a>(&'a [TaskId]);

impl fmt::Display for CyclePath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|id| id.as_str()).collect();
        write!(f, "{}", names.join(" -> "))
    }
}

/// Traversal marker used while planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// The set of registered tasks plus their upstream edges.
#[derive(Clone, Default)]
pub struct TaskGraph {
    /// Tasks indexed by ID.
    nodes: HashMap<TaskId, Arc<dyn Task>>,

    /// Edges: task_id -> tasks it depends on, in declaration order.
    upstreams: HashMap<TaskId, Vec<TaskId>>,

    /// Registration order, for stable listings.
    order: Vec<TaskId>,
}

impl TaskGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Add a task. Its upstream edges come from [`Task::upstreams`] and are
    /// only resolved when planning, so tasks may be added in any order.
    pub fn add_task(&mut self, task: Arc<dyn Task>) -> Result<(), GraphError> {
        let id = TaskId::new(task.name());
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateTask(id));
        }

        self.upstreams.insert(id.clone(), task.upstreams().to_vec());
        self.nodes.insert(id.clone(), task);
        self.order.push(id);
        Ok(())
    }

    /// Get a task by ID.
    pub fn get_task(&self, id: &TaskId) -> Option<&Arc<dyn Task>> {
        self.nodes.get(id)
    }

    /// Get the direct upstreams of a task.
    pub fn get_upstreams(&self, id: &TaskId) -> Option<&[TaskId]> {
        self.upstreams.get(id).map(|v| v.as_slice())
    }

    /// All task IDs in registration order.
    pub fn task_ids(&self) -> &[TaskId] {
        &self.order
    }

    /// Compute the execution order for `target`: every task in its upstream
    /// closure, each once, upstreams before dependents, `target` last.
    ///
    /// Depth-first traversal with a per-task marker. Reaching a task that is
    /// still in progress means the closure loops back on itself.
    pub fn plan(&self, target: &TaskId) -> Result<Vec<TaskId>, GraphError> {
        if !self.nodes.contains_key(target) {
            return Err(GraphError::TaskNotFound(target.clone()));
        }

        let mut marks: HashMap<TaskId, Mark> = HashMap::new();
        let mut path: Vec<TaskId> = Vec::new();
        let mut order: Vec<TaskId> = Vec::new();
        self.visit(target, &mut marks, &mut path, &mut order)?;
        Ok(order)
    }

    fn visit(
        &self,
        id: &TaskId,
        marks: &mut HashMap<TaskId, Mark>,
        path: &mut Vec<TaskId>,
        order: &mut Vec<TaskId>,
    ) -> Result<(), GraphError> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                let start = path.iter().position(|p| p == id).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(id.clone());
                return Err(GraphError::Cycle { path: cycle });
            }
            None => {}
        }

        marks.insert(id.clone(), Mark::InProgress);
        path.push(id.clone());

        for upstream in self.get_upstreams(id).unwrap_or(&[]) {
            if !self.nodes.contains_key(upstream) {
                return Err(GraphError::UnknownTask {
                    from: id.clone(),
                    to: upstream.clone(),
                });
            }
            self.visit(upstream, marks, path, order)?;
        }

        path.pop();
        marks.insert(id.clone(), Mark::Done);
        order.push(id.clone());
        Ok(())
    }

    /// Validate the whole graph: every upstream resolves and no task can
    /// reach itself.
    pub fn validate(&self) -> Result<(), GraphError> {
        for id in &self.order {
            self.plan(id)?;
        }
        Ok(())
    }
}
