//! Project files from YAML to a running registry.

use kdemo::config::demo::{BROKER_PORTS, START_CLUSTER, START_DEMO};
use kdemo::{ConfigError, RunOptions, TaskId, TaskStatus, load_registry};
use std::path::Path;

fn write_project(dir: &Path, yaml: &str) -> std::path::PathBuf {
    let path = dir.join("kdemo.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

#[tokio::test]
async fn test_yaml_project_runs_with_env_file_and_inputs() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("client")).unwrap();
    std::fs::write(
        dir.path().join("client/template.env"),
        "APP_KAFKA_TOPIC=payment\nAPP_MESSAGE_KEY=from-file\n",
    )
    .unwrap();
    let path = write_project(
        dir.path(),
        r#"
name: file-demo
tasks:
  - name: prepare
    type: command
    cmd: ["sh", "-c", "echo prepared > prepared.out"]
    cwd: client

  - name: produce
    type: command
    description: Write one message line
    cmd: echo "$APP_KAFKA_TOPIC $APP_MESSAGE_KEY $APP_MESSAGE_VALUE" > produce.out
    cwd: client
    upstreams: [prepare]
    env_files: [client/template.env]
    environment:
      APP_MESSAGE_KEY: "{{input.message_key}}"
      APP_MESSAGE_VALUE: "{{ input.message }}"
    inputs:
      - { type: str, name: message, shortcut: m, default: Cuan }
      - { type: choice, name: message-key, shortcut: k, choices: [web, app] }
"#,
    );

    let registry = load_registry(&path).unwrap();
    let report = registry
        .run("produce", RunOptions::new().input("k", "app"))
        .await
        .unwrap();

    assert!(report.success());
    assert_eq!(
        report.order,
        vec![TaskId::new("prepare"), TaskId::new("produce")]
    );
    let produced = std::fs::read_to_string(dir.path().join("client/produce.out")).unwrap();
    assert_eq!(produced.trim(), "payment app Cuan");
    assert!(dir.path().join("client/prepared.out").exists());
}

#[tokio::test]
async fn test_env_override_only_touches_declared_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        dir.path(),
        r#"
name: overrides
tasks:
  - name: consumer
    type: command
    cmd: echo "$APP_MODE:${UNDECLARED:-unset}" > env.out
    environment:
      APP_MODE: consumer
"#,
    );

    let registry = load_registry(&path).unwrap();
    let report = registry
        .run(
            "consumer",
            RunOptions::new()
                .env("APP_MODE", "producer")
                .env("UNDECLARED", "leak"),
        )
        .await
        .unwrap();

    assert!(report.success());
    let out = std::fs::read_to_string(dir.path().join("env.out")).unwrap();
    assert_eq!(out.trim(), "producer:unset");
}

#[tokio::test]
async fn test_failing_command_from_yaml_reports_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        dir.path(),
        r#"
name: failing
tasks:
  - { name: broken, type: command, cmd: "exit 5" }
  - { name: after, type: command, cmd: "touch after.out", upstreams: [broken] }
"#,
    );

    let registry = load_registry(&path).unwrap();
    let report = registry.run("after", RunOptions::new()).await.unwrap();

    assert!(!report.success());
    assert!(matches!(
        report.status(&TaskId::new("broken")),
        Some(TaskStatus::Failed {
            exit_code: Some(5),
            ..
        })
    ));
    assert!(!dir.path().join("after.out").exists());
}

#[test]
fn test_demo_preset_expands_from_project_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        dir.path(),
        r#"
name: redpanda-demo
demo:
  consumer_groups: [warehouse, finance]
  consumers_per_group: 3
  readiness_timeout_secs: 90
"#,
    );

    let registry = load_registry(&path).unwrap();

    assert_eq!(registry.task_names().count(), 10);
    let cluster = registry.get(START_CLUSTER).unwrap();
    assert_eq!(cluster.checkers().len(), BROKER_PORTS.len() + 1);
    assert!(
        cluster
            .checkers()
            .iter()
            .all(|c| c.timeout_duration().as_secs() == 90)
    );

    let demo = registry.get(START_DEMO).unwrap();
    assert_eq!(demo.upstreams().len(), 6);

    let plan = registry.plan(START_DEMO).unwrap();
    assert_eq!(plan.len(), 9);
    assert_eq!(plan[0], TaskId::new("stop-redpanda"));
    assert_eq!(plan[1], TaskId::new(START_CLUSTER));
}

#[test]
fn test_project_mixing_preset_and_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        dir.path(),
        r#"
name: extended
demo: {}
tasks:
  - name: topic-report
    type: command
    cmd: rpk topic describe payment
    upstreams: [start-redpanda]
"#,
    );

    let registry = load_registry(&path).unwrap();
    assert_eq!(registry.task_names().count(), 11);
    assert_eq!(registry.plan("topic-report").unwrap().len(), 3);
}

#[test]
fn test_task_name_clashing_with_preset_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        dir.path(),
        r#"
name: clash
demo: {}
tasks:
  - { name: produce, type: command, cmd: "true" }
"#,
    );

    let err = load_registry(&path).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidConfig(_)));
}

#[test]
fn test_missing_project_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_registry(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::FileReadError { .. }));
}
