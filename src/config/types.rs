//! Configuration type definitions.
//!
//! This module contains the type definitions for the YAML project file:
//! tasks, their commands, checkers and inputs, and the demo preset.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Project configuration (kdemo.yaml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name.
    pub name: String,
    /// Optional demo preset, expanded into tasks ahead of `tasks`.
    #[serde(default)]
    pub demo: Option<DemoConfig>,
    /// Free-form task definitions.
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

/// Task configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Task name (unique within the project).
    pub name: String,
    /// Optional description, shown by `list`.
    #[serde(default)]
    pub description: Option<String>,
    /// Task type and configuration.
    #[serde(flatten)]
    pub kind: TaskKindConfig,
    /// Working directory, relative to the config file.
    #[serde(default)]
    pub cwd: Option<String>,
    /// Tasks that must complete or become ready first.
    #[serde(default)]
    pub upstreams: Vec<String>,
    /// Declared environment variables and their (templated) defaults.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Dotenv files merged below `environment`.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Inputs collected at invocation time.
    #[serde(default)]
    pub inputs: Vec<InputConfig>,
    /// Readiness checks gating dependents.
    #[serde(default)]
    pub checkers: Vec<CheckerConfig>,
}

/// Task type configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TaskKindConfig {
    /// Shell string or argument list.
    #[serde(rename = "command")]
    Command {
        /// The command to run.
        cmd: CommandConfig,
    },
    /// Container compose subcommand.
    #[serde(rename = "compose")]
    Compose {
        /// Subcommand, e.g. `up` or `down`.
        compose_cmd: String,
        /// Compose file, relative to `cwd`.
        #[serde(default)]
        compose_file: Option<String>,
        /// Compose project name.
        #[serde(default)]
        project: Option<String>,
        /// Extra arguments after the subcommand.
        #[serde(default)]
        args: Vec<String>,
        /// Container CLI, `docker` when unset.
        #[serde(default)]
        program: Option<String>,
    },
}

/// A command as written in YAML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandConfig {
    /// Run through the shell.
    Shell(String),
    /// Run a program with arguments.
    Args(Vec<String>),
}

impl CommandConfig {
    pub fn is_empty(&self) -> bool {
        match self {
            CommandConfig::Shell(s) => s.trim().is_empty(),
            CommandConfig::Args(args) => args.first().is_none_or(|p| p.trim().is_empty()),
        }
    }
}

/// Readiness check configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckerConfig {
    /// TCP connect.
    Port {
        port: u16,
        #[serde(default)]
        host: Option<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
        #[serde(default)]
        interval_ms: Option<u64>,
    },
    /// HTTP request.
    Http {
        port: u16,
        #[serde(default)]
        host: Option<String>,
        #[serde(default = "default_method")]
        method: String,
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
        #[serde(default)]
        interval_ms: Option<u64>,
    },
    /// Probe command.
    Command {
        cmd: CommandConfig,
        #[serde(default)]
        cwd: Option<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
        #[serde(default)]
        interval_ms: Option<u64>,
    },
}

fn default_method() -> String {
    "GET".to_string()
}

/// Input configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputConfig {
    /// Free-form text.
    Str {
        name: String,
        #[serde(default)]
        shortcut: Option<String>,
        #[serde(default)]
        prompt: Option<String>,
        #[serde(default)]
        default: Option<String>,
    },
    /// Integer.
    Int {
        name: String,
        #[serde(default)]
        shortcut: Option<String>,
        #[serde(default)]
        prompt: Option<String>,
        #[serde(default)]
        default: Option<i64>,
    },
    /// One of a fixed set.
    Choice {
        name: String,
        choices: Vec<String>,
        #[serde(default)]
        shortcut: Option<String>,
        #[serde(default)]
        prompt: Option<String>,
        #[serde(default)]
        default: Option<String>,
    },
}

impl InputConfig {
    pub fn name(&self) -> &str {
        match self {
            InputConfig::Str { name, .. }
            | InputConfig::Int { name, .. }
            | InputConfig::Choice { name, .. } => name,
        }
    }
}

/// The demo preset: a three-broker cluster, grouped consumers and a producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Bootstrap brokers handed to the client.
    pub brokers: String,
    pub topic: String,
    pub topic_partition: u32,
    pub topic_replication: u32,
    pub consumer_groups: Vec<String>,
    pub consumers_per_group: u32,
    /// Allowed message keys; the first is the default.
    pub producer_keys: Vec<String>,
    /// Directory holding the compose file.
    pub compose_dir: String,
    /// Directory of the client program.
    pub client_dir: String,
    pub client_command: String,
    /// Env file inside `client_dir`.
    pub client_env_file: Option<String>,
    pub readiness_timeout_secs: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:19092".to_string(),
            topic: "payment".to_string(),
            topic_partition: 3,
            topic_replication: 1,
            consumer_groups: vec!["warehouse".to_string(), "finance".to_string()],
            consumers_per_group: 3,
            producer_keys: vec!["web".to_string(), "app".to_string()],
            compose_dir: "deploy/redpanda".to_string(),
            client_dir: "deploy/go-client".to_string(),
            client_command: "go run main.go".to_string(),
            client_env_file: Some("template.env".to_string()),
            readiness_timeout_secs: 60,
        }
    }
}
