//! Registry workflow integration tests.
//!
//! Tests that verify planning, ordering, skipping and input collection over
//! task graphs shaped like the demo.

use kdemo::testing::{FailingTask, InvocationLog, RecordingTask, TestHarness};
use kdemo::{
    Event, GraphError, InputDeclaration, InputError, Prompter, RunError, RunOptions, TaskId,
    TaskStatus,
};
use std::sync::Arc;

/// Answers every prompt with a fixed value.
struct FixedPrompter(&'static str);

impl Prompter for FixedPrompter {
    fn ask(&self, _decl: &InputDeclaration) -> Result<Option<String>, InputError> {
        Ok(Some(self.0.to_string()))
    }
}

/// stop -> start -> {warehouse, finance} consumers -> start-demo
async fn demo_shaped_harness(log: &InvocationLog) -> TestHarness {
    let mut harness = TestHarness::new().await;
    harness
        .register(RecordingTask::new("stop-redpanda", log))
        .register(RecordingTask::new("start-redpanda", log).upstream("stop-redpanda"));
    let mut demo = RecordingTask::new("start-demo", log);
    for group in ["warehouse", "finance"] {
        for i in 0..3 {
            let name = format!("{}-consumer-{}", group, i);
            harness.register(
                RecordingTask::new(name.as_str(), log)
                    .upstream("start-redpanda")
                    .env("APP_MODE", "consumer")
                    .env("APP_CONSUMER_GROUP", group),
            );
            demo = demo.upstream(name.as_str());
        }
    }
    harness.register(demo);
    harness
}

fn position(names: &[String], name: &str) -> usize {
    names
        .iter()
        .position(|n| n == name)
        .unwrap_or_else(|| panic!("{} was not invoked", name))
}

#[tokio::test]
async fn test_every_upstream_runs_exactly_once_before_dependents() {
    let log = InvocationLog::new();
    let harness = demo_shaped_harness(&log).await;

    let report = harness.run("start-demo", RunOptions::new()).await.unwrap();

    assert!(report.success());
    assert_eq!(report.order.len(), 9);

    let names = log.names().await;
    assert_eq!(names.len(), 9);
    assert_eq!(log.count("start-redpanda").await, 1);
    assert_eq!(log.count("stop-redpanda").await, 1);

    let start = position(&names, "start-redpanda");
    assert!(position(&names, "stop-redpanda") < start);
    for group in ["warehouse", "finance"] {
        for i in 0..3 {
            let consumer = position(&names, &format!("{}-consumer-{}", group, i));
            assert!(start < consumer);
            assert!(consumer < position(&names, "start-demo"));
        }
    }
}

#[tokio::test]
async fn test_consumers_receive_their_group() {
    let log = InvocationLog::new();
    let harness = demo_shaped_harness(&log).await;

    harness.run("start-demo", RunOptions::new()).await.unwrap();

    for entry in log.entries().await {
        if let Some(group) = entry
            .task_id
            .as_str()
            .strip_suffix("-consumer-0")
            .or_else(|| entry.task_id.as_str().strip_suffix("-consumer-1"))
            .or_else(|| entry.task_id.as_str().strip_suffix("-consumer-2"))
        {
            assert_eq!(entry.env.get("APP_MODE"), Some("consumer"));
            assert_eq!(entry.env.get("APP_CONSUMER_GROUP"), Some(group));
        }
    }
}

#[tokio::test]
async fn test_running_a_middle_task_only_runs_its_closure() {
    let log = InvocationLog::new();
    let harness = demo_shaped_harness(&log).await;

    let report = harness
        .run("finance-consumer-1", RunOptions::new())
        .await
        .unwrap();

    assert!(report.success());
    assert_eq!(
        log.names().await,
        vec![
            "stop-redpanda".to_string(),
            "start-redpanda".to_string(),
            "finance-consumer-1".to_string()
        ]
    );
}

#[tokio::test]
async fn test_failed_cluster_skips_every_consumer() {
    let log = InvocationLog::new();
    let mut harness = TestHarness::new().await;
    harness
        .register(FailingTask::always("start-redpanda").exit_code(125))
        .register(RecordingTask::new("warehouse-consumer-0", &log).upstream("start-redpanda"))
        .register(RecordingTask::new("finance-consumer-0", &log).upstream("start-redpanda"))
        .register(
            RecordingTask::new("start-demo", &log)
                .upstream("warehouse-consumer-0")
                .upstream("finance-consumer-0"),
        )
        .register(RecordingTask::new("produce", &log));

    let report = harness.run("start-demo", RunOptions::new()).await.unwrap();

    assert!(!report.success());
    assert!(log.names().await.is_empty());
    assert_eq!(report.failed_tasks(), vec![TaskId::new("start-redpanda")]);
    assert_eq!(report.skipped_tasks().len(), 3);
    assert!(matches!(
        report.status(&TaskId::new("start-redpanda")),
        Some(TaskStatus::Failed {
            exit_code: Some(125),
            ..
        })
    ));

    let skipped = harness
        .events()
        .await
        .into_iter()
        .filter(|e| matches!(e, Event::TaskSkipped { .. }))
        .count();
    assert_eq!(skipped, 3);
}

#[tokio::test]
async fn test_independent_branch_survives_failure() {
    let log = InvocationLog::new();
    let mut harness = TestHarness::new().await;
    harness
        .register(FailingTask::always("warehouse-consumer-0"))
        .register(RecordingTask::new("finance-consumer-0", &log))
        .register(
            RecordingTask::new("start-demo", &log)
                .upstream("warehouse-consumer-0")
                .upstream("finance-consumer-0"),
        );

    let report = harness.run("start-demo", RunOptions::new()).await.unwrap();

    assert_eq!(log.names().await, vec!["finance-consumer-0".to_string()]);
    assert_eq!(
        report.status(&TaskId::new("finance-consumer-0")),
        Some(&TaskStatus::Completed)
    );
    assert_eq!(
        report.status(&TaskId::new("start-demo")),
        Some(&TaskStatus::Skipped {
            upstream: TaskId::new("warehouse-consumer-0")
        })
    );
}

#[tokio::test]
async fn test_cycle_reports_path_and_runs_nothing() {
    let log = InvocationLog::new();
    let mut harness = TestHarness::new().await;
    harness
        .register(RecordingTask::new("a", &log).upstream("c"))
        .register(RecordingTask::new("b", &log).upstream("a"))
        .register(RecordingTask::new("c", &log).upstream("b"));

    let err = harness.run("a", RunOptions::new()).await.unwrap_err();

    match err {
        RunError::Graph(GraphError::Cycle { path }) => {
            assert_eq!(path.first(), path.last());
            assert_eq!(path.len(), 4);
        }
        other => panic!("Expected cycle, got {:?}", other),
    }
    assert!(log.names().await.is_empty());
    assert!(harness.events().await.is_empty());
}

#[tokio::test]
async fn test_inputs_are_rendered_into_environment() {
    let log = InvocationLog::new();
    let mut harness = TestHarness::new().await;
    harness.register(
        RecordingTask::new("produce", &log)
            .input(InputDeclaration::int("message-count").shortcut("c").with_default("1"))
            .input(InputDeclaration::str("message").shortcut("m").with_default("Cuan"))
            .input(InputDeclaration::choice("message-key", ["web", "app"]).shortcut("k"))
            .env("APP_MESSAGE_VALUE", "{{input.message}}")
            .env("APP_MESSAGE_KEY", "{{ input.message_key }}")
            .env("APP_MESSAGE_REPEAT", "{{input.message-count}}"),
    );

    harness
        .run(
            "produce",
            RunOptions::new().input("c", "5").input("message-key", "app"),
        )
        .await
        .unwrap();

    let entries = log.entries().await;
    let env = &entries[0].env;
    assert_eq!(env.get("APP_MESSAGE_VALUE"), Some("Cuan"));
    assert_eq!(env.get("APP_MESSAGE_KEY"), Some("app"));
    assert_eq!(env.get("APP_MESSAGE_REPEAT"), Some("5"));
}

#[tokio::test]
async fn test_prompter_answers_inputs_without_override() {
    let log = InvocationLog::new();
    let mut harness = TestHarness::new().await;
    harness.register(
        RecordingTask::new("produce", &log)
            .input(InputDeclaration::str("message").shortcut("m"))
            .input(InputDeclaration::str("note"))
            .env("APP_MESSAGE_VALUE", "{{input.message}}")
            .env("NOTE", "{{input.note}}"),
    );

    harness
        .run(
            "produce",
            RunOptions::new()
                .input("m", "explicit")
                .prompter(Arc::new(FixedPrompter("prompted"))),
        )
        .await
        .unwrap();

    let entries = log.entries().await;
    assert_eq!(entries[0].env.get("APP_MESSAGE_VALUE"), Some("explicit"));
    assert_eq!(entries[0].env.get("NOTE"), Some("prompted"));
}

#[tokio::test]
async fn test_unknown_input_override_is_rejected() {
    let log = InvocationLog::new();
    let mut harness = TestHarness::new().await;
    harness.register(RecordingTask::new("produce", &log));

    let err = harness
        .run("produce", RunOptions::new().input("colour", "red"))
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::Input(InputError::UnknownInput(ref k)) if k == "colour"));
    assert!(log.names().await.is_empty());
}
