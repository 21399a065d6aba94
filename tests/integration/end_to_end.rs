//! End-to-end runs with real processes.
//!
//! A long-running "cluster" command is gated on readiness checks; consumers
//! only start once every check has passed, and the cluster is left running
//! in the background until the report shuts it down.

use kdemo::testing::EventRecorder;
use kdemo::{
    CommandLine, CommandTask, Event, EventBus, ReadinessCheck, Registry, RunOptions, TaskId,
    TaskStatus,
};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{listener, wait_for_file};

async fn recording_bus() -> (Arc<EventBus>, Arc<EventRecorder>) {
    let bus = Arc::new(EventBus::new());
    let recorder = Arc::new(EventRecorder::default());
    bus.register(recorder.clone()).await;
    (bus, recorder)
}

#[tokio::test]
async fn test_cluster_ready_on_ports_then_consumer_runs_once() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("consumer.out");
    let (_broker, broker_port) = listener().await;
    let (_console, console_port) = listener().await;
    let (bus, recorder) = recording_bus().await;

    let mut registry = Registry::new().with_event_bus(bus);
    registry
        .register(Arc::new(
            CommandTask::shell("start-redpanda", "sleep 30")
                .checker(ReadinessCheck::port(broker_port).timeout(Duration::from_secs(5)))
                .checker(ReadinessCheck::port(console_port).timeout(Duration::from_secs(5)))
                .build(),
        ))
        .unwrap();
    registry
        .register(Arc::new(
            CommandTask::shell("warehouse-consumer-0", "echo \"$APP_MODE\" >> consumer.out")
                .cwd(dir.path())
                .upstream("start-redpanda")
                .env("APP_MODE", "consumer")
                .build(),
        ))
        .unwrap();

    let mut report = registry
        .run("warehouse-consumer-0", RunOptions::new())
        .await
        .unwrap();

    assert!(report.success());
    assert_eq!(
        report.status(&TaskId::new("start-redpanda")),
        Some(&TaskStatus::Ready)
    );
    assert_eq!(
        report.status(&TaskId::new("warehouse-consumer-0")),
        Some(&TaskStatus::Completed)
    );
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "consumer\n");

    assert_eq!(report.background().len(), 1);
    assert_eq!(
        report.background()[0].task_id(),
        &TaskId::new("start-redpanda")
    );
    assert!(report.background()[0].pid().is_some());

    let events = recorder.events().await;
    let checks = events
        .iter()
        .filter(|e| matches!(e, Event::CheckPassed { .. }))
        .count();
    assert_eq!(checks, 2);
    let ready_at = events
        .iter()
        .position(|e| matches!(e, Event::TaskReady { .. }))
        .unwrap();
    let consumer_started = events
        .iter()
        .position(|e| {
            matches!(e, Event::TaskStarted { task_id, .. } if task_id.as_str() == "warehouse-consumer-0")
        })
        .unwrap();
    assert!(ready_at < consumer_started);

    report.shutdown().await;
    assert!(report.background().is_empty());
}

#[tokio::test]
async fn test_consumer_waits_for_command_checker() {
    let dir = tempfile::tempdir().unwrap();
    let (bus, _recorder) = recording_bus().await;

    let mut registry = Registry::new().with_event_bus(bus);
    registry
        .register(Arc::new(
            CommandTask::shell("start-redpanda", "sleep 0.3 && touch ready && sleep 30")
                .cwd(dir.path())
                .checker(
                    ReadinessCheck::command(CommandLine::shell("test -f ready"))
                        .cwd(dir.path())
                        .timeout(Duration::from_secs(5))
                        .interval(Duration::from_millis(20)),
                )
                .build(),
        ))
        .unwrap();
    registry
        .register(Arc::new(
            CommandTask::shell("produce", "test -f ready && echo produced > produce.out")
                .cwd(dir.path())
                .upstream("start-redpanda")
                .build(),
        ))
        .unwrap();

    let mut report = registry.run("produce", RunOptions::new()).await.unwrap();

    assert!(report.success());
    let produced = wait_for_file(&dir.path().join("produce.out"), Duration::from_secs(2)).await;
    assert_eq!(produced.trim(), "produced");

    report.shutdown().await;
}

#[tokio::test]
async fn test_cluster_exiting_before_ready_skips_consumers() {
    let dir = tempfile::tempdir().unwrap();

    let mut registry = Registry::new();
    registry
        .register(Arc::new(
            CommandTask::shell("start-redpanda", "exit 3")
                .checker(
                    ReadinessCheck::command(CommandLine::shell("false"))
                        .timeout(Duration::from_secs(5)),
                )
                .build(),
        ))
        .unwrap();
    registry
        .register(Arc::new(
            CommandTask::shell("finance-consumer-0", "touch consumer.out")
                .cwd(dir.path())
                .upstream("start-redpanda")
                .build(),
        ))
        .unwrap();

    let mut report = registry
        .run("finance-consumer-0", RunOptions::new())
        .await
        .unwrap();

    assert!(!report.success());
    assert_eq!(
        report.status(&TaskId::new("start-redpanda")),
        Some(&TaskStatus::Failed {
            error: "command exited with code 3".to_string(),
            exit_code: Some(3),
        })
    );
    assert!(matches!(
        report.status(&TaskId::new("finance-consumer-0")),
        Some(TaskStatus::Skipped { .. })
    ));
    assert!(!dir.path().join("consumer.out").exists());
    assert!(report.background().is_empty());

    report.shutdown().await;
}
