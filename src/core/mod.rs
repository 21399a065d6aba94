//! Core types: tasks, their graph, inputs and environments.

pub mod context;
pub mod environment;
pub mod graph;
pub mod input;
pub mod task;
pub mod types;
