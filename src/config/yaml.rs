//! YAML configuration parsing.
//!
//! Parses the project file and validates what can be checked without building
//! tasks. Graph-level problems (cycles, unknown upstreams) are reported when
//! the registry is built.

use std::collections::HashSet;
use std::path::Path;

use super::error::ConfigError;
use super::types::{CheckerConfig, InputConfig, ProjectConfig, TaskConfig, TaskKindConfig};

/// HTTP methods accepted by `http` checkers.
const HTTP_METHODS: &[&str] = &["GET", "HEAD", "POST", "PUT", "DELETE", "OPTIONS", "PATCH"];

/// YAML configuration loader.
pub struct YamlLoader;

impl YamlLoader {
    /// Load a project configuration from a file.
    pub fn load_project(path: impl AsRef<Path>) -> Result<ProjectConfig, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ProjectConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
                path: path.to_path_buf(),
                source,
            })?;
        Self::validate_project(&config)?;
        Ok(config)
    }

    /// Parse a project configuration from a YAML string.
    pub fn parse_project(yaml: &str) -> Result<ProjectConfig, ConfigError> {
        let config: ProjectConfig = serde_yaml::from_str(yaml)?;
        Self::validate_project(&config)?;
        Ok(config)
    }

    /// Validate a project configuration, demo preset included.
    pub fn validate_project(config: &ProjectConfig) -> Result<(), ConfigError> {
        if config.name.trim().is_empty() {
            return Err(ConfigError::MissingField("name".into()));
        }

        if let Some(demo) = &config.demo {
            if demo.producer_keys.is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "demo.producer_keys must not be empty".into(),
                ));
            }
            if demo.client_command.trim().is_empty() {
                return Err(ConfigError::MissingField("demo.client_command".into()));
            }
        }

        let tasks = config.all_tasks();

        let mut names: HashSet<&str> = HashSet::new();
        for task in &tasks {
            if task.name.trim().is_empty() {
                return Err(ConfigError::MissingField("tasks[].name".into()));
            }
            if !names.insert(&task.name) {
                return Err(ConfigError::InvalidConfig(format!(
                    "duplicate task name: {}",
                    task.name
                )));
            }
        }

        for task in &tasks {
            Self::validate_task(task)?;
        }

        Ok(())
    }

    fn validate_task(task: &TaskConfig) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for upstream in &task.upstreams {
            if upstream == &task.name {
                return Err(ConfigError::InvalidConfig(format!(
                    "task '{}' cannot depend on itself",
                    task.name
                )));
            }
            if !seen.insert(upstream) {
                return Err(ConfigError::InvalidConfig(format!(
                    "task '{}' has duplicate upstream '{}'",
                    task.name, upstream
                )));
            }
        }

        match &task.kind {
            TaskKindConfig::Command { cmd } if cmd.is_empty() => {
                return Err(ConfigError::InvalidConfig(format!(
                    "task '{}' has an empty command",
                    task.name
                )));
            }
            TaskKindConfig::Compose { compose_cmd, .. } if compose_cmd.trim().is_empty() => {
                return Err(ConfigError::InvalidConfig(format!(
                    "task '{}' has an empty compose_cmd",
                    task.name
                )));
            }
            _ => {}
        }

        for checker in &task.checkers {
            Self::validate_checker(&task.name, checker)?;
        }

        let mut input_names = HashSet::new();
        for input in &task.inputs {
            if !input_names.insert(crate::core::input::normalize_name(input.name())) {
                return Err(ConfigError::InvalidConfig(format!(
                    "task '{}' declares input '{}' twice",
                    task.name,
                    input.name()
                )));
            }
            Self::validate_input(&task.name, input)?;
        }

        Ok(())
    }

    fn validate_checker(task: &str, checker: &CheckerConfig) -> Result<(), ConfigError> {
        match checker {
            CheckerConfig::Port { port: 0, .. } | CheckerConfig::Http { port: 0, .. } => {
                Err(ConfigError::InvalidConfig(format!(
                    "task '{}' has a checker on port 0",
                    task
                )))
            }
            CheckerConfig::Http { method, .. }
                if !HTTP_METHODS.contains(&method.to_ascii_uppercase().as_str()) =>
            {
                Err(ConfigError::InvalidConfig(format!(
                    "task '{}' has an http checker with unknown method '{}'",
                    task, method
                )))
            }
            CheckerConfig::Command { cmd, .. } if cmd.is_empty() => Err(ConfigError::InvalidConfig(
                format!("task '{}' has a command checker with an empty command", task),
            )),
            _ => Ok(()),
        }
    }

    fn validate_input(task: &str, input: &InputConfig) -> Result<(), ConfigError> {
        if input.name().trim().is_empty() {
            return Err(ConfigError::MissingField(format!("{}.inputs[].name", task)));
        }
        if let InputConfig::Choice {
            name,
            choices,
            default,
            ..
        } = input
        {
            if choices.is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "choice input '{}' of task '{}' has no choices",
                    name, task
                )));
            }
            if let Some(default) = default {
                if !choices.contains(default) {
                    return Err(ConfigError::InvalidConfig(format!(
                        "default '{}' of input '{}' is not one of: {}",
                        default,
                        name,
                        choices.join(", ")
                    )));
                }
            }
        }
        Ok(())
    }
}
