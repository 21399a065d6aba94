//! kdemo - task runner for the multi-broker Redpanda demo.
//!
//! Usage:
//!   kdemo run <TASK>    Run a task and everything upstream of it
//!   kdemo list          List tasks with their upstreams, checkers and inputs
//!   kdemo validate      Validate the project file without running anything

use clap::{Parser, Subcommand};
use kdemo::{
    Event, EventBus, EventHandler, NoPrompt, Prompter, Registry, RunOptions, StdinPrompter,
    load_registry,
};
use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// kdemo - run demo tasks in dependency order
#[derive(Parser)]
#[command(name = "kdemo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project file
    #[arg(
        short = 'c',
        long = "config",
        global = true,
        env = "KDEMO_CONFIG",
        default_value = "kdemo.yaml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task after its upstream tasks
    Run {
        /// Task to run
        #[arg(value_name = "TASK")]
        task: String,

        /// Input value, by name or shortcut (repeatable)
        #[arg(short = 'i', long = "input", value_name = "NAME=VALUE", value_parser = parse_key_val)]
        inputs: Vec<(String, String)>,

        /// Environment override for declared variables (repeatable)
        #[arg(short = 'e', long = "env", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        env: Vec<(String, String)>,

        /// Use defaults instead of prompting for inputs
        #[arg(long)]
        no_prompt: bool,
    },

    /// List all tasks in the project
    List,

    /// Validate the project without running
    Validate,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Logs lifecycle events.
struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &Event) {
        match event {
            Event::RunStarted {
                target, task_count, ..
            } => {
                info!("Running '{}' ({} task(s))", target, task_count);
            }
            Event::TaskStarted { task_id, .. } => {
                info!("  Task '{}' started", task_id);
            }
            Event::CheckPassed {
                task_id, target, ..
            } => {
                info!("  Task '{}': {} is ready", task_id, target);
            }
            Event::TaskReady {
                task_id,
                pid,
                duration,
                ..
            } => {
                let pid_info = pid.map(|p| format!(" (pid: {})", p)).unwrap_or_default();
                info!("  Task '{}' ready after {:?}{}", task_id, duration, pid_info);
            }
            Event::TaskCompleted {
                task_id, duration, ..
            } => {
                info!("  Task '{}' completed in {:?}", task_id, duration);
            }
            Event::TaskFailed {
                task_id,
                error,
                exit_code,
                ..
            } => {
                let exit_info = exit_code
                    .map(|c| format!(" (exit: {})", c))
                    .unwrap_or_default();
                error!("  Task '{}' failed{}: {}", task_id, exit_info, error);
            }
            Event::TaskSkipped {
                task_id, upstream, ..
            } => {
                warn!("  Task '{}' skipped: upstream '{}' did not succeed", task_id, upstream);
            }
            Event::RunCompleted {
                success, duration, ..
            } => {
                if *success {
                    info!("Run completed successfully in {:?}", duration);
                } else {
                    error!("Run failed after {:?}", duration);
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            task,
            inputs,
            env,
            no_prompt,
        } => {
            run_task(&cli.config, task, inputs, env, no_prompt).await?;
        }
        Commands::List => {
            list_tasks(&cli.config)?;
        }
        Commands::Validate => {
            validate_project(&cli.config)?;
        }
    }

    Ok(())
}

/// Run a task, then keep its background processes alive until they exit or
/// Ctrl+C is pressed.
async fn run_task(
    config: &Path,
    task: String,
    inputs: Vec<(String, String)>,
    env: Vec<(String, String)>,
    no_prompt: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Loading project from: {}", config.display());

    let event_bus = Arc::new(EventBus::new());
    event_bus.register(Arc::new(LoggingHandler)).await;
    let registry = load_registry(config)?.with_event_bus(event_bus);

    let prompter: Arc<dyn Prompter> = if no_prompt || !std::io::stdin().is_terminal() {
        Arc::new(NoPrompt)
    } else {
        Arc::new(StdinPrompter)
    };
    let options = RunOptions {
        inputs: inputs.into_iter().collect::<HashMap<_, _>>(),
        env: env.into_iter().collect::<HashMap<_, _>>(),
        prompter,
    };

    let mut report = registry.run(&task, options).await?;

    if !report.success() {
        for id in &report.order {
            match report.status(id) {
                Some(status) if !status.is_success() => error!("  {}: {}", id, status),
                _ => {}
            }
        }
        report.shutdown().await;
        return Err(format!("task '{}' did not succeed", task).into());
    }

    if report.background().is_empty() {
        return Ok(());
    }

    info!(
        "{} process(es) running in the background",
        report.background().len()
    );
    info!("Press Ctrl+C to stop");

    tokio::select! {
        results = report.wait_background() => {
            for (task_id, result) in results {
                match result {
                    Ok(status) if status.success() => info!("  Task '{}' exited", task_id),
                    Ok(status) => warn!("  Task '{}' exited with {}", task_id, status),
                    Err(e) => error!("  Task '{}': {}", task_id, e),
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }

    report.shutdown().await;
    info!("Goodbye!");
    Ok(())
}

/// Validate the project without running.
fn validate_project(config: &Path) -> Result<(), Box<dyn std::error::Error>> {
    info!("Validating project: {}", config.display());

    match load_registry(config) {
        Ok(registry) => {
            info!("All {} task(s) are valid", registry.task_names().count());
            Ok(())
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            Err(e.into())
        }
    }
}

/// List all tasks in the project.
fn list_tasks(config: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let registry: Registry = load_registry(config)?;

    if registry.graph().is_empty() {
        println!("No tasks found in {}", config.display());
        return Ok(());
    }

    println!("Tasks in {}:", config.display());
    println!();

    for name in registry.task_names() {
        let Some(task) = registry.get(name) else {
            continue;
        };
        println!("{}", name);
        if let Some(description) = task.description() {
            println!("  {}", description);
        }
        if !task.upstreams().is_empty() {
            let upstreams: Vec<&str> = task.upstreams().iter().map(|u| u.as_str()).collect();
            println!("  Upstreams: {}", upstreams.join(", "));
        }
        for check in task.checkers() {
            println!("  Checker: {}", check.target());
        }
        for input in task.inputs() {
            let shortcut = input
                .shortcut_key()
                .map(|s| format!(" (-i {}=...)", s))
                .unwrap_or_default();
            println!(
                "  Input: {}{} [default: {}]",
                input.name(),
                shortcut,
                input.default_value()
            );
        }
        if let Some(env) = task.env_spec() {
            for binding in env.bindings() {
                println!("  Env: {}={}", binding.name, binding.default);
            }
        }
        println!();
    }

    Ok(())
}
