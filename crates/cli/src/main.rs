//! `workflow-engine` CLI entry-point.
//!
//! Available sub-commands:
//! - `run`: execute a workflow JSON file and print the result.
//! - `validate`: check a workflow JSON file without running it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::{DependencyGraph, ExecutionMode, ExecutorConfig, Workflow, WorkflowExecutor};
use nodes::NodeRegistry;

#[derive(Parser)]
#[command(
    name = "workflow-engine",
    about = "Run node-graph workflows from JSON definitions",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a workflow and print the run result as JSON.
    Run {
        /// Path to the workflow JSON file.
        path: PathBuf,

        /// Initial data: inline JSON, or `@path` to read it from a file.
        #[arg(long, short, env = "WORKFLOW_INPUT")]
        input: Option<String>,

        #[arg(long, value_enum, default_value_t = Mode::Sequential, env = "WORKFLOW_MODE")]
        mode: Mode,

        /// Shorthand for `--mode concurrent`.
        #[arg(long, conflicts_with = "mode")]
        concurrent: bool,

        /// Upper bound on parallel nodes in concurrent mode.
        #[arg(long, default_value_t = 8, env = "WORKFLOW_MAX_CONCURRENCY")]
        max_concurrency: usize,

        /// Per-node timeout in milliseconds (0 disables it).
        #[arg(long, default_value_t = 300_000, env = "WORKFLOW_NODE_TIMEOUT_MS")]
        node_timeout_ms: u64,

        /// Deadline for the whole run in milliseconds.
        #[arg(long, env = "WORKFLOW_RUN_DEADLINE_MS")]
        run_deadline_ms: Option<u64>,
    },
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Sequential,
    Eager,
    Concurrent,
}

impl From<Mode> for ExecutionMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Sequential => ExecutionMode::Sequential,
            Mode::Eager => ExecutionMode::Eager,
            Mode::Concurrent => ExecutionMode::Concurrent,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only the JSON result.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            path,
            input,
            mode,
            concurrent,
            max_concurrency,
            node_timeout_ms,
            run_deadline_ms,
        } => {
            let workflow = load_workflow(&path)?;
            let input = input.as_deref().map(parse_input).transpose()?;

            let config = ExecutorConfig {
                mode: if concurrent { ExecutionMode::Concurrent } else { mode.into() },
                max_concurrency,
                node_timeout: (node_timeout_ms > 0).then_some(Duration::from_millis(node_timeout_ms)),
                run_deadline: run_deadline_ms.map(Duration::from_millis),
            };
            info!(path = %path.display(), ?config, "running workflow");

            let executor = WorkflowExecutor::new(Arc::new(NodeRegistry::with_builtins()), config);
            let result = executor.run(&workflow, input).await;

            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.is_success() {
                std::process::exit(1);
            }
        }
        Command::Validate { path } => {
            let workflow = load_workflow(&path)?;
            let graph = DependencyGraph::build(&workflow.nodes, &workflow.edges);

            for edge in graph.dangling_edges() {
                println!("dropped edge {} -> {} (unknown target)", edge.source, edge.target);
            }
            for id in graph.missing_sources() {
                println!("edge source '{id}' is not a node; it will be recorded as an error");
            }

            if graph.entry_nodes().is_empty() {
                eprintln!("Validation failed: {}", engine::EngineError::NoEntryNodes);
                std::process::exit(1);
            }
            println!("Entry nodes: {:?}", graph.entry_nodes());

            match graph.topological_order() {
                Ok(order) => println!("Workflow is valid. Execution order: {order:?}"),
                Err(e) => {
                    eprintln!("Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn load_workflow(path: &Path) -> anyhow::Result<Workflow> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid workflow JSON in {}", path.display()))
}

/// Inline JSON, or `@file` holding JSON.
fn parse_input(raw: &str) -> anyhow::Result<Value> {
    let text = match raw.strip_prefix('@') {
        Some(file) => std::fs::read_to_string(file)
            .with_context(|| format!("cannot read input file {file}"))?,
        None => raw.to_owned(),
    };
    if text.trim().is_empty() {
        bail!("input is empty");
    }
    serde_json::from_str(&text).context("input is not valid JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn inline_input_is_parsed_as_json() {
        assert_eq!(parse_input(r#"{"a": [1, 2]}"#).unwrap(), json!({ "a": [1, 2] }));
        assert!(parse_input("not json").is_err());
        assert!(parse_input("  ").is_err());
    }

    #[test]
    fn concurrent_flag_conflicts_with_mode() {
        let parsed = Cli::try_parse_from(["workflow-engine", "run", "wf.json", "--concurrent"]);
        assert!(parsed.is_ok());
        let clash = Cli::try_parse_from([
            "workflow-engine",
            "run",
            "wf.json",
            "--concurrent",
            "--mode",
            "eager",
        ]);
        assert!(clash.is_err());
    }
}
