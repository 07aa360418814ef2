//! Ready-queue scheduler for [`ExecutionMode::Concurrent`].
//!
//! A node becomes ready once every reachable upstream has a result; ready
//! nodes run as tokio tasks, at most `max_concurrency` at a time. Results
//! flow back to this loop, which is the only writer of the result store.
//!
//! [`ExecutionMode::Concurrent`]: crate::ExecutionMode::Concurrent

use std::collections::VecDeque;

use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, Instrument};

use crate::executor::{Dispatch, Run};
use crate::store::ResultStore;
use crate::EngineError;

pub(crate) async fn run_concurrent(
    run: &Run<'_, '_>,
    store: &mut ResultStore,
    max_concurrency: usize,
) -> Result<(), EngineError> {
    let limit = max_concurrency.max(1);
    let mut pending = run.graph.pending_upstream_counts(&run.reachable);
    let mut ready: VecDeque<&str> = run.graph.entry_nodes().iter().copied().collect();
    let mut tasks: JoinSet<(String, Value)> = JoinSet::new();

    loop {
        while tasks.len() < limit {
            let Some(node_id) = ready.pop_front() else {
                break;
            };
            match run.dispatch(node_id, store) {
                Dispatch::Ready(output) => {
                    store.record(node_id, output)?;
                    ready.extend(run.release(node_id, &mut pending));
                }
                Dispatch::Invoke(task) => {
                    debug!(node_id, in_flight = tasks.len() + 1, "spawning node");
                    let id = node_id.to_owned();
                    tasks.spawn(async move { (id, task.run().await) }.in_current_span());
                }
            }
        }

        let Some(joined) = tasks.join_next().await else {
            break;
        };
        let (node_id, output) = joined.map_err(|e| EngineError::Scheduler(e.to_string()))?;
        store.record(&node_id, output)?;
        ready.extend(run.release(&node_id, &mut pending));
    }

    run.ensure_finished(store)
}
