//! The Redpanda demo preset.
//!
//! Expands a [`DemoConfig`] into the task set of the demo: a compose-managed
//! three-broker cluster, consumers grouped by consumer group, a `start-demo`
//! aggregate and an interactive producer.

use std::collections::BTreeMap;
use std::path::Path;

use super::types::{
    CheckerConfig, CommandConfig, DemoConfig, InputConfig, ProjectConfig, TaskConfig,
    TaskKindConfig,
};

pub const STOP_CLUSTER: &str = "stop-redpanda";
pub const START_CLUSTER: &str = "start-redpanda";
pub const START_DEMO: &str = "start-demo";
pub const PRODUCE: &str = "produce";

/// Host ports published by the three brokers: schema registry, pandaproxy,
/// kafka and admin API for each.
pub const BROKER_PORTS: [u16; 12] = [
    18081, 18082, 19092, 19644, // redpanda-0
    28081, 28082, 29092, 29644, // redpanda-1
    38081, 38082, 39092, 39644, // redpanda-2
];

/// Port of the Redpanda console.
pub const CONSOLE_PORT: u16 = 8080;

impl ProjectConfig {
    /// Every task of the project: the demo preset's first, then `tasks`.
    pub fn all_tasks(&self) -> Vec<TaskConfig> {
        let mut tasks = self.demo.as_ref().map(demo_tasks).unwrap_or_default();
        tasks.extend(self.tasks.iter().cloned());
        tasks
    }
}

/// Name of the `index`th consumer of `group`.
pub fn consumer_name(group: &str, index: u32) -> String {
    format!("{}-consumer-{}", group, index)
}

fn task(name: impl Into<String>, kind: TaskKindConfig) -> TaskConfig {
    TaskConfig {
        name: name.into(),
        description: None,
        kind,
        cwd: None,
        upstreams: Vec::new(),
        environment: BTreeMap::new(),
        env_files: Vec::new(),
        inputs: Vec::new(),
        checkers: Vec::new(),
    }
}

fn compose(cmd: &str) -> TaskKindConfig {
    TaskKindConfig::Compose {
        compose_cmd: cmd.to_string(),
        compose_file: None,
        project: None,
        args: Vec::new(),
        program: None,
    }
}

fn shell(cmd: &str) -> TaskKindConfig {
    TaskKindConfig::Command {
        cmd: CommandConfig::Shell(cmd.to_string()),
    }
}

/// Environment shared by producer and consumers.
fn client_environment(demo: &DemoConfig, mode: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("APP_MODE".to_string(), mode.to_string()),
        ("APP_KAFKA_BROKERS".to_string(), demo.brokers.clone()),
        ("APP_KAFKA_TOPIC".to_string(), demo.topic.clone()),
        (
            "APP_KAFKA_TOPIC_PARTITION".to_string(),
            demo.topic_partition.to_string(),
        ),
        (
            "APP_KAFKA_TOPIC_REPLICATION".to_string(),
            demo.topic_replication.to_string(),
        ),
    ])
}

fn client_task(demo: &DemoConfig, name: String, mode: &str) -> TaskConfig {
    let mut client = task(name, shell(&demo.client_command));
    client.cwd = Some(demo.client_dir.clone());
    client.environment = client_environment(demo, mode);
    if let Some(file) = &demo.client_env_file {
        client.env_files.push(
            Path::new(&demo.client_dir)
                .join(file)
                .to_string_lossy()
                .into_owned(),
        );
    }
    client
}

/// Build the demo's tasks.
pub fn demo_tasks(demo: &DemoConfig) -> Vec<TaskConfig> {
    let timeout_secs = Some(demo.readiness_timeout_secs);
    let mut tasks = Vec::new();

    let mut stop = task(STOP_CLUSTER, compose("down"));
    stop.description = Some("Tear down the Redpanda cluster".to_string());
    stop.cwd = Some(demo.compose_dir.clone());
    tasks.push(stop);

    let mut start = task(START_CLUSTER, compose("up"));
    start.description = Some("Start the Redpanda cluster and wait for every port".to_string());
    start.cwd = Some(demo.compose_dir.clone());
    start.upstreams.push(STOP_CLUSTER.to_string());
    start.checkers = BROKER_PORTS
        .iter()
        .map(|&port| CheckerConfig::Port {
            port,
            host: None,
            timeout_secs,
            interval_ms: None,
        })
        .collect();
    start.checkers.push(CheckerConfig::Http {
        port: CONSOLE_PORT,
        host: None,
        method: "GET".to_string(),
        path: None,
        timeout_secs,
        interval_ms: None,
    });
    tasks.push(start);

    let mut consumers = Vec::new();
    for group in &demo.consumer_groups {
        for index in 0..demo.consumers_per_group {
            let name = consumer_name(group, index);
            let mut consumer = client_task(demo, name.clone(), "consumer");
            consumer.upstreams.push(START_CLUSTER.to_string());
            consumer
                .environment
                .insert("APP_CONSUMER_GROUP".to_string(), group.clone());
            consumer.checkers.push(CheckerConfig::Command {
                cmd: CommandConfig::Shell("sleep 1".to_string()),
                cwd: None,
                timeout_secs,
                interval_ms: None,
            });
            tasks.push(consumer);
            consumers.push(name);
        }
    }

    let mut start_demo = task(START_DEMO, shell("echo Ok"));
    start_demo.description = Some("Start the cluster and every consumer".to_string());
    start_demo.upstreams = consumers;
    tasks.push(start_demo);

    let mut produce = client_task(demo, PRODUCE.to_string(), "producer");
    produce.description = Some("Publish messages to the topic".to_string());
    produce.inputs = vec![
        InputConfig::Int {
            name: "message-count".to_string(),
            shortcut: Some("c".to_string()),
            prompt: Some("How many messages?".to_string()),
            default: Some(1),
        },
        InputConfig::Str {
            name: "message".to_string(),
            shortcut: Some("m".to_string()),
            prompt: Some("The messages".to_string()),
            default: Some("Cuan".to_string()),
        },
        InputConfig::Choice {
            name: "message-key".to_string(),
            choices: demo.producer_keys.clone(),
            shortcut: Some("k".to_string()),
            prompt: Some(format!("Message key ({})?", demo.producer_keys.join("/"))),
            default: demo.producer_keys.first().cloned(),
        },
    ];
    produce.environment.extend([
        (
            "APP_MESSAGE_VALUE".to_string(),
            "{{input.message}}".to_string(),
        ),
        (
            "APP_MESSAGE_KEY".to_string(),
            "{{input.message_key}}".to_string(),
        ),
        (
            "APP_MESSAGE_REPEAT".to_string(),
            "{{input.message_count}}".to_string(),
        ),
    ]);
    tasks.push(produce);

    tasks
}
