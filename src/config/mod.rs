//! Configuration loading and parsing.
//!
//! This module provides YAML-based configuration for a project's tasks,
//! including the built-in Redpanda demo preset.

mod builder;
pub mod demo;
mod error;
mod types;
mod yaml;

pub use builder::{ProjectBuilder, load_registry};
pub use error::ConfigError;
pub use types::{
    CheckerConfig, CommandConfig, DemoConfig, InputConfig, ProjectConfig, TaskConfig,
    TaskKindConfig,
};
pub use yaml::YamlLoader;
