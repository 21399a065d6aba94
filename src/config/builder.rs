//! Task builder from YAML configuration.
//!
//! This module converts [`TaskConfig`]s into runnable tasks and registers
//! them. Relative paths are resolved against the directory holding the
//! project file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;

use crate::core::environment::EnvSpec;
use crate::core::input::InputDeclaration;
use crate::core::task::Task;
use crate::core::types::TaskId;
use crate::execution::{CommandLine, CommandTask, ComposeTask, Registry};
use crate::readiness::ReadinessCheck;

use super::error::ConfigError;
use super::types::{
    CheckerConfig, CommandConfig, InputConfig, ProjectConfig, TaskConfig, TaskKindConfig,
};
use super::yaml::YamlLoader;

/// Builds tasks from configuration.
pub struct ProjectBuilder {
    base_dir: PathBuf,
}

impl ProjectBuilder {
    /// Create a builder resolving relative paths against `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Build a registry holding every task of the project.
    pub fn build(&self, config: &ProjectConfig) -> Result<Registry, ConfigError> {
        let mut registry = Registry::new();
        for task_config in config.all_tasks() {
            let task = self.build_task(&task_config)?;
            task.check_references(&TaskId::new(task.name()))?;
            registry.register(task)?;
        }
        registry.validate()?;
        Ok(registry)
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Build a Task from TaskConfig.
    pub fn build_task(&self, config: &TaskConfig) -> Result<Arc<dyn Task>, ConfigError> {
        let cwd = config
            .cwd
            .as_deref()
            .map(|dir| self.resolve(dir))
            .unwrap_or_else(|| self.base_dir.clone());

        let mut env = EnvSpec::new();
        for file in &config.env_files {
            env.push_file(self.resolve(file));
        }
        for (key, value) in &config.environment {
            env = env.binding(key, value);
        }

        let checkers = config
            .checkers
            .iter()
            .map(|checker| self.build_checker(checker))
            .collect::<Result<Vec<_>, _>>()?;

        match &config.kind {
            TaskKindConfig::Command { cmd } => {
                let mut builder = CommandTask::builder(&config.name, command_line(cmd))
                    .cwd(cwd)
                    .upstreams(config.upstreams.iter().map(String::as_str))
                    .checkers(checkers)
                    .env_spec(env);
                for input in &config.inputs {
                    builder = builder.input(build_input(input));
                }
                if let Some(description) = &config.description {
                    builder = builder.description(description);
                }
                Ok(Arc::new(builder.build()))
            }
            TaskKindConfig::Compose {
                compose_cmd,
                compose_file,
                project,
                args,
                program,
            } => {
                if !config.inputs.is_empty() {
                    return Err(ConfigError::InvalidConfig(format!(
                        "compose task '{}' cannot declare inputs",
                        config.name
                    )));
                }
                let mut builder = ComposeTask::builder(&config.name, compose_cmd)
                    .cwd(cwd)
                    .args(args.iter().cloned())
                    .checkers(checkers)
                    .env_spec(env);
                for upstream in &config.upstreams {
                    builder = builder.upstream(upstream.as_str());
                }
                if let Some(file) = compose_file {
                    builder = builder.file(file);
                }
                if let Some(project) = project {
                    builder = builder.project(project);
                }
                if let Some(program) = program {
                    builder = builder.program(program);
                }
                if let Some(description) = &config.description {
                    builder = builder.description(description);
                }
                Ok(Arc::new(builder.build()))
            }
        }
    }

    fn build_checker(&self, config: &CheckerConfig) -> Result<ReadinessCheck, ConfigError> {
        let (check, timeout_secs, interval_ms) = match config {
            CheckerConfig::Port {
                port,
                host,
                timeout_secs,
                interval_ms,
            } => {
                let mut check = ReadinessCheck::port(*port);
                if let Some(host) = host {
                    check = check.host(host);
                }
                (check, timeout_secs, interval_ms)
            }
            CheckerConfig::Http {
                port,
                host,
                method,
                path,
                timeout_secs,
                interval_ms,
            } => {
                let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                    .map_err(|e| ConfigError::InvalidConfig(format!("invalid HTTP method: {}", e)))?;
                let mut check = ReadinessCheck::http(*port, method);
                if let Some(host) = host {
                    check = check.host(host);
                }
                if let Some(path) = path {
                    check = check.path(path);
                }
                (check, timeout_secs, interval_ms)
            }
            CheckerConfig::Command {
                cmd,
                cwd,
                timeout_secs,
                interval_ms,
            } => {
                let check = ReadinessCheck::command(command_line(cmd))
                    .cwd(cwd.as_deref().map_or_else(|| self.base_dir.clone(), |d| self.resolve(d)));
                (check, timeout_secs, interval_ms)
            }
        };

        let mut check = check;
        if let Some(secs) = timeout_secs {
            check = check.timeout(Duration::from_secs(*secs));
        }
        if let Some(ms) = interval_ms {
            check = check.interval(Duration::from_millis(*ms));
        }
        Ok(check)
    }
}

fn command_line(config: &CommandConfig) -> CommandLine {
    match config {
        CommandConfig::Shell(script) => CommandLine::shell(script),
        CommandConfig::Args(args) => CommandLine::args(args.iter().cloned()),
    }
}

fn build_input(config: &InputConfig) -> InputDeclaration {
    let (decl, shortcut, prompt) = match config {
        InputConfig::Str {
            name,
            shortcut,
            prompt,
            default,
        } => {
            let mut decl = InputDeclaration::str(name);
            if let Some(default) = default {
                decl = decl.with_default(default);
            }
            (decl, shortcut, prompt)
        }
        InputConfig::Int {
            name,
            shortcut,
            prompt,
            default,
        } => {
            let mut decl = InputDeclaration::int(name);
            if let Some(default) = default {
                decl = decl.with_default(default.to_string());
            }
            (decl, shortcut, prompt)
        }
        InputConfig::Choice {
            name,
            choices,
            shortcut,
            prompt,
            default,
        } => {
            let mut decl = InputDeclaration::choice(name, choices.iter().cloned());
            if let Some(default) = default {
                decl = decl.with_default(default);
            }
            (decl, shortcut, prompt)
        }
    };

    let mut decl = decl;
    if let Some(shortcut) = shortcut {
        decl = decl.shortcut(shortcut);
    }
    if let Some(prompt) = prompt {
        decl = decl.prompt(prompt);
    }
    decl
}

/// Load a project file and build its registry.
pub fn load_registry(path: impl AsRef<Path>) -> Result<Registry, ConfigError> {
    let path = path.as_ref();
    let config = YamlLoader::load_project(path)?;
    let base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    ProjectBuilder::new(base_dir).build(&config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::environment::EnvError;
    use crate::core::graph::GraphError;
    use crate::readiness::Probe;

    fn build(yaml: &str) -> Result<Registry, ConfigError> {
        let config = YamlLoader::parse_project(yaml)?;
        ProjectBuilder::new("/srv/demo").build(&config)
    }

    #[test]
    fn test_build_demo_preset_registry() {
        let registry = build("name: demo\ndemo: {}\n").unwrap();

        assert_eq!(registry.task_names().count(), 10);
        let plan = registry.plan("start-demo").unwrap();
        assert_eq!(plan.first(), Some(&TaskId::new("stop-redpanda")));
        assert_eq!(plan.last(), Some(&TaskId::new("start-demo")));
        assert_eq!(plan.len(), 9);

        let produce = registry.get("produce").unwrap();
        assert_eq!(produce.inputs().len(), 3);
        let env = produce.env_spec().unwrap();
        assert_eq!(
            env.files(),
            &[PathBuf::from("/srv/demo/deploy/go-client/template.env")]
        );
        assert_eq!(env.bindings().len(), 8);
    }

    #[test]
    fn test_relative_paths_resolve_against_base_dir() {
        let registry = build(
            r#"
name: paths
tasks:
  - name: hello
    type: command
    cmd: echo hello
    cwd: client
    env_files: [client.env, /etc/absolute.env]
"#,
        )
        .unwrap();

        let task = registry.get("hello").unwrap();
        assert_eq!(
            task.env_spec().unwrap().files(),
            &[
                PathBuf::from("/srv/demo/client.env"),
                PathBuf::from("/etc/absolute.env")
            ]
        );
    }

    #[test]
    fn test_checkers_are_built_with_timing() {
        let config = YamlLoader::parse_project(
            r#"
name: checks
tasks:
  - name: up
    type: command
    cmd: sleep 60
    checkers:
      - { type: port, port: 19092, timeout_secs: 5, interval_ms: 250 }
      - { type: http, port: 8080, method: head, path: ready }
      - { type: command, cmd: "true", cwd: probes }
"#,
        )
        .unwrap();
        let builder = ProjectBuilder::new("/srv/demo");
        let checks: Vec<ReadinessCheck> = config.tasks[0]
            .checkers
            .iter()
            .map(|c| builder.build_checker(c).unwrap())
            .collect();

        assert_eq!(checks[0].target(), "port 127.0.0.1:19092");
        assert_eq!(checks[0].timeout_duration(), Duration::from_secs(5));
        assert_eq!(checks[1].target(), "HEAD http://127.0.0.1:8080/ready");
        match checks[2].probe() {
            Probe::Command { cwd, .. } => {
                assert_eq!(cwd.as_deref(), Some(Path::new("/srv/demo/probes")))
            }
            other => panic!("Expected command probe, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_upstream_is_graph_error() {
        let err = build(
            r#"
name: dangling
tasks:
  - { name: a, type: command, cmd: "true", upstreams: [ghost] }
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Graph(GraphError::UnknownTask { .. })
        ));
    }

    #[test]
    fn test_cycle_is_graph_error() {
        let err = build(
            r#"
name: cyclic
tasks:
  - { name: a, type: command, cmd: "true", upstreams: [b] }
  - { name: b, type: command, cmd: "true", upstreams: [a] }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Graph(GraphError::Cycle { .. })));
    }

    #[test]
    fn test_undeclared_placeholder_is_rejected() {
        let err = build(
            r#"
name: typo
tasks:
  - name: produce
    type: command
    cmd: ["go", "run", "main.go", "--key={{input.mesage-key}}"]
    inputs:
      - { type: choice, name: message-key, choices: [web, app] }
"#,
        )
        .unwrap_err();
        match err {
            ConfigError::Env(EnvError::UnresolvedReference { task, placeholder }) => {
                assert_eq!(task, TaskId::new("produce"));
                assert_eq!(placeholder, "input.mesage-key");
            }
            other => panic!("Expected unresolved reference, got {:?}", other),
        }

        let err = build(
            r#"
name: typo
tasks:
  - name: produce
    type: command
    cmd: go run main.go
    environment:
      APP_MESSAGE_VALUE: "{{input.message}}"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Env(_)));
    }

    #[test]
    fn test_load_registry_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kdemo.yaml");
        std::fs::write(
            &path,
            "name: file\ntasks:\n  - { name: hello, type: command, cmd: echo hi }\n",
        )
        .unwrap();

        let registry = load_registry(&path).unwrap();
        assert!(registry.get("hello").is_some());
    }
}
