//! Workflow execution engine.
//!
//! `WorkflowExecutor` is the central orchestrator:
//! 1. Builds the dependency graph and finds the entry nodes.
//! 2. Walks the graph from each entry node (see [`ExecutionMode`]),
//!    dispatching every node through the [`NodeRegistry`].
//! 3. Hands each node the outputs of its already-executed upstreams.
//! 4. Records exactly one result per node; handler failures, panics and
//!    timeouts become `{"error": ..}` results instead of aborting the run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use nodes::{error_payload, ExecutableNode, ExecutionContext, NodeDefinition, NodeInput, NodeRegistry};

use crate::dag::DependencyGraph;
use crate::scheduler;
use crate::store::ResultStore;
use crate::{EngineError, Workflow};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How the graph is walked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Depth-first from each entry node, one handler at a time. A node is
    /// deferred until every reachable upstream has a result, so fan-in nodes
    /// run once with their full input.
    #[default]
    Sequential,
    /// Depth-first, running each node as soon as it is first reached with
    /// whatever upstream results exist at that moment.
    Eager,
    /// Ready-queue scheduling: independent nodes run in parallel tasks.
    Concurrent,
}

/// Tuning knobs for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub mode: ExecutionMode,
    /// Upper bound on in-flight handlers in [`ExecutionMode::Concurrent`].
    pub max_concurrency: usize,
    /// Time limit for a single handler invocation.
    pub node_timeout: Option<Duration>,
    /// Time limit for the whole run.
    pub run_deadline: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Sequential,
            max_concurrency: 8,
            node_timeout: Some(Duration::from_secs(300)),
            run_deadline: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Output of a run
// ---------------------------------------------------------------------------

/// Outcome of a run: `{"status": "success", "results": ..}` or
/// `{"status": "error", "message": .., "results": ..}`.
///
/// On error, `results` holds whatever was recorded before the structural
/// failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunResult {
    Success {
        results: Map<String, Value>,
    },
    Error {
        message: String,
        results: Map<String, Value>,
    },
}

impl RunResult {
    fn failed(err: &EngineError, store: ResultStore) -> Self {
        RunResult::Error {
            message: err.to_string(),
            results: store.into_results(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunResult::Success { .. })
    }

    pub fn results(&self) -> &Map<String, Value> {
        match self {
            RunResult::Success { results } | RunResult::Error { results, .. } => results,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            RunResult::Success { .. } => None,
            RunResult::Error { message, .. } => Some(message),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Stateless orchestrator; every call to [`WorkflowExecutor::run`] owns its
/// own result table, so one executor can serve many runs at once.
#[derive(Debug, Clone)]
pub struct WorkflowExecutor {
    registry: Arc<NodeRegistry>,
    config: ExecutorConfig,
}

impl WorkflowExecutor {
    pub fn new(registry: Arc<NodeRegistry>, config: ExecutorConfig) -> Self {
        Self { registry, config }
    }

    /// Executor over the built-in handlers with default settings.
    pub fn with_builtins() -> Self {
        Self::new(Arc::new(NodeRegistry::with_builtins()), ExecutorConfig::default())
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run the workflow to completion.
    ///
    /// Never panics on handler failure; structural problems (no entry
    /// nodes, cycles) come back as [`RunResult::Error`].
    pub async fn run(&self, workflow: &Workflow, workflow_input: Option<Value>) -> RunResult {
        let ctx = ExecutionContext::new(workflow_input);
        let span = info_span!(
            "workflow_run",
            execution_id = %ctx.execution_id,
            workflow = workflow.name.as_deref().unwrap_or("unnamed"),
            mode = ?self.config.mode,
        );
        self.run_in_span(workflow, ctx).instrument(span).await
    }

    async fn run_in_span(&self, workflow: &Workflow, ctx: ExecutionContext) -> RunResult {
        let started = Instant::now();
        let graph = DependencyGraph::build(&workflow.nodes, &workflow.edges);
        let mut store = ResultStore::new(ctx.workflow_input.clone());

        if graph.entry_nodes().is_empty() {
            let err = EngineError::NoEntryNodes;
            warn!(nodes = workflow.nodes.len(), "{err}");
            return RunResult::failed(&err, store);
        }
        info!(
            nodes = workflow.nodes.len(),
            edges = workflow.edges.len(),
            entries = ?graph.entry_nodes(),
            "workflow run started"
        );

        let run = Run {
            graph: &graph,
            registry: &self.registry,
            ctx: &ctx,
            reachable: graph.reachable(),
            node_timeout: self.config.node_timeout,
            deadline: self.config.run_deadline.map(|d| started + d),
        };

        let outcome = match self.config.mode {
            ExecutionMode::Sequential => run.walk_deferred(&mut store).await,
            ExecutionMode::Eager => run.walk_eager(&mut store).await,
            ExecutionMode::Concurrent => {
                scheduler::run_concurrent(&run, &mut store, self.config.max_concurrency).await
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => {
                info!(executed = store.len(), elapsed_ms, "workflow run finished");
                RunResult::Success {
                    results: store.into_results(),
                }
            }
            Err(err) => {
                error!(executed = store.len(), elapsed_ms, error = %err, "workflow run failed");
                RunResult::failed(&err, store)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-run state
// ---------------------------------------------------------------------------

/// Everything a walk needs for one run; borrowed from the workflow and the
/// executor, dropped when the run returns.
pub(crate) struct Run<'r, 'w> {
    pub(crate) graph: &'r DependencyGraph<'w>,
    registry: &'r Arc<NodeRegistry>,
    ctx: &'r ExecutionContext,
    pub(crate) reachable: Vec<&'w str>,
    node_timeout: Option<Duration>,
    deadline: Option<Instant>,
}

/// What to do for one node.
pub(crate) enum Dispatch {
    /// Result known without calling a handler (missing node, deadline).
    Ready(Value),
    Invoke(NodeTask),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeBudget {
    Unbounded,
    Limited(Duration),
    Exhausted,
}

/// Stack frame of the depth-first walks.
struct Frame<'w> {
    id: &'w str,
    entered: bool,
    next_child: usize,
}

impl<'w> Frame<'w> {
    fn new(id: &'w str) -> Self {
        Self {
            id,
            entered: false,
            next_child: 0,
        }
    }
}

impl<'r, 'w> Run<'r, 'w> {
    fn budget(&self) -> TimeBudget {
        let remaining = match self.deadline {
            None => None,
            Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                Some(left) if !left.is_zero() => Some(left),
                _ => return TimeBudget::Exhausted,
            },
        };
        match (self.node_timeout, remaining) {
            (None, None) => TimeBudget::Unbounded,
            (Some(limit), None) | (None, Some(limit)) => TimeBudget::Limited(limit),
            (Some(a), Some(b)) => TimeBudget::Limited(a.min(b)),
        }
    }

    /// Decide how `node_id` gets its result, assembling its input from
    /// whatever is in `store` right now.
    pub(crate) fn dispatch(&self, node_id: &str, store: &ResultStore) -> Dispatch {
        let Some(node) = self.graph.node(node_id) else {
            warn!(node_id, "edge references a node that does not exist");
            return Dispatch::Ready(error_payload(format!("node {node_id} does not exist")));
        };

        let budget = self.budget();
        if budget == TimeBudget::Exhausted {
            warn!(node_id, "run deadline exceeded; skipping handler");
            return Dispatch::Ready(error_payload("run deadline exceeded"));
        }

        Dispatch::Invoke(NodeTask {
            handler: self.registry.resolve(&node.kind),
            node: node.clone(),
            input: store.input_for(self.graph.upstream(node_id)),
            ctx: self.ctx.clone(),
            budget,
        })
    }

    async fn execute(&self, node_id: &str, store: &ResultStore) -> Value {
        match self.dispatch(node_id, store) {
            Dispatch::Ready(value) => value,
            Dispatch::Invoke(task) => task.run().await,
        }
    }

    /// Default walk: depth-first, but a node only runs once all of its
    /// reachable upstreams have results. Whichever upstream finishes last
    /// descends into it.
    async fn walk_deferred(&self, store: &mut ResultStore) -> Result<(), EngineError> {
        let mut pending = self.graph.pending_upstream_counts(&self.reachable);

        for &entry in self.graph.entry_nodes() {
            let mut stack = vec![Frame::new(entry)];
            while let Some(frame) = stack.last_mut() {
                if !frame.entered {
                    frame.entered = true;
                    let id = frame.id;
                    let waiting = pending.get(id).copied().unwrap_or(0);
                    if store.contains(id) || waiting > 0 {
                        stack.pop();
                        continue;
                    }
                    let output = self.execute(id, store).await;
                    store.record(id, output)?;
                    self.graph.release(id, &mut pending);
                    continue;
                }

                match self.graph.downstream(frame.id).get(frame.next_child) {
                    Some(&child) => {
                        frame.next_child += 1;
                        stack.push(Frame::new(child));
                    }
                    None => {
                        stack.pop();
                    }
                }
            }
        }

        self.ensure_finished(store)
    }

    /// Depth-first, first arrival wins: a node runs as soon as it is reached
    /// and later arrivals are cache hits. Reaching a node whose own subtree
    /// is still being walked is a cycle.
    async fn walk_eager(&self, store: &mut ResultStore) -> Result<(), EngineError> {
        let mut in_progress: HashSet<&'w str> = HashSet::new();

        for &entry in self.graph.entry_nodes() {
            let mut stack = vec![Frame::new(entry)];
            while let Some(frame) = stack.last_mut() {
                if !frame.entered {
                    frame.entered = true;
                    let id = frame.id;
                    if in_progress.contains(id) {
                        return Err(EngineError::CycleDetected {
                            node_id: id.to_owned(),
                        });
                    }
                    if store.contains(id) {
                        stack.pop();
                        continue;
                    }
                    let output = self.execute(id, store).await;
                    store.record(id, output)?;
                    in_progress.insert(id);
                    continue;
                }

                match self.graph.downstream(frame.id).get(frame.next_child) {
                    Some(&child) => {
                        frame.next_child += 1;
                        stack.push(Frame::new(child));
                    }
                    None => {
                        in_progress.remove(frame.id);
                        stack.pop();
                    }
                }
            }
        }

        Ok(())
    }

    /// Every reachable node must have a result once a walk ends; the ones
    /// that don't are stuck behind a cycle.
    pub(crate) fn ensure_finished(&self, store: &ResultStore) -> Result<(), EngineError> {
        let pending: Vec<String> = self
            .reachable
            .iter()
            .filter(|id| !store.contains(id))
            .map(|id| (*id).to_owned())
            .collect();
        if pending.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Stalled { pending })
        }
    }

    pub(crate) fn release(&self, node_id: &str, pending: &mut HashMap<&'w str, usize>) -> Vec<&'w str> {
        self.graph.release(node_id, pending)
    }
}

// ---------------------------------------------------------------------------
// Single handler invocation
// ---------------------------------------------------------------------------

/// One handler call with everything it owns, so it can move into a task.
pub(crate) struct NodeTask {
    handler: Arc<dyn ExecutableNode>,
    node: NodeDefinition,
    input: NodeInput,
    ctx: ExecutionContext,
    budget: TimeBudget,
}

impl NodeTask {
    /// Run the handler in its own task and turn every failure mode into an
    /// error payload.
    #[instrument(name = "node", skip_all, fields(node_id = %self.node.id, kind = %self.node.kind))]
    pub(crate) async fn run(self) -> Value {
        let NodeTask {
            handler,
            node,
            input,
            ctx,
            budget,
        } = self;
        let node_id = node.id.clone();
        let started = Instant::now();
        debug!(inputs = input.len(), "executing node");

        let mut handle = tokio::spawn(
            async move { handler.execute(&node, input, &ctx).await }.in_current_span(),
        );

        let joined = match budget {
            TimeBudget::Limited(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    let ms = limit.as_millis();
                    warn!(timeout_ms = ms as u64, "node timed out");
                    return error_payload(format!("node {node_id} timed out after {ms}ms"));
                }
            },
            TimeBudget::Unbounded | TimeBudget::Exhausted => handle.await,
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match joined {
            Ok(Ok(output)) => {
                debug!(elapsed_ms, "node succeeded");
                output
            }
            Ok(Err(err)) => {
                warn!(elapsed_ms, error = %err, "node failed");
                err.into_payload()
            }
            Err(join_err) if join_err.is_panic() => {
                error!(elapsed_ms, "node panicked");
                error_payload(format!("node {node_id} panicked"))
            }
            Err(_) => error_payload(format!("node {node_id} was cancelled")),
        }
    }
}
