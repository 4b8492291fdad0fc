//! Workflow executor.
//!
//! Seeds the shared store from declared inputs, then drives the edge
//! follower and node lifecycle runtime one node at a time from
//! `__start__` until an edge resolves to `__end__` or to nothing at all,
//! finally rendering the workflow's declared `outputs` against the
//! finished store.

use crate::compiler::ExecutableGraph;
use crate::edge::{self, IterationGuard};
use crate::error::{NodeError, PflowError, UserError};
use crate::ir::{DEFAULT_ACTION, START_SENTINEL};
use crate::lifecycle::{self, ProgressCallback};
use crate::store::SharedStore;
use crate::template;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

const ERROR_ACTION: &str = "error";

pub struct WorkflowOutcome {
    pub store: SharedStore,
    pub outputs: Map<String, Value>,
}

/// Applies declared defaults and required-ness to the caller-supplied
/// inputs, producing the map the store is seeded with.
fn resolve_inputs(
    graph: &ExecutableGraph,
    supplied: Map<String, Value>,
) -> Result<Map<String, Value>, UserError> {
    let mut resolved = Map::new();
    for (name, spec) in &graph.ir.inputs {
        if let Some(v) = supplied.get(name) {
            resolved.insert(name.clone(), v.clone());
        } else if let Some(default) = &spec.default {
            resolved.insert(name.clone(), default.clone());
        } else if spec.required {
            return Err(UserError::MissingRequiredInput(name.clone()));
        }
    }
    Ok(resolved)
}

/// Runs `graph` to completion. `depth` is the nested-workflow recursion
/// depth (0 for a top-level run); `progress` is forwarded unchanged to
/// every node so a nested workflow's progress lines nest under its
/// caller's in the CLI's interactive output.
#[instrument(skip(graph, supplied_inputs, progress), fields(depth))]
pub async fn execute(
    graph: &ExecutableGraph,
    supplied_inputs: Map<String, Value>,
    depth: u32,
    progress: Option<&ProgressCallback>,
) -> Result<WorkflowOutcome, PflowError> {
    let inputs = resolve_inputs(graph, supplied_inputs)?;
    let mut store = SharedStore::new(inputs);
    store.write_reserved("__pflow_depth__", Value::from(depth));
    // A stable id for this run, independent of node ids, so trace output and
    // nested-workflow logs from the same invocation can be correlated.
    let run_id = uuid::Uuid::new_v4().to_string();
    store.write_reserved("__run_id__", Value::from(run_id.clone()));
    info!(run_id, depth, "workflow run starting");

    let mut guard = IterationGuard::new(graph.ir.iteration_cap);
    let mut current = START_SENTINEL.to_string();
    let mut current_action = DEFAULT_ACTION.to_string();
    let mut started = false;

    loop {
        let next = match graph.edges.next(&current, &current_action) {
            Some(n) => n.to_string(),
            None if !started => {
                // No explicit `__start__` edge: fall back to the first node
                // declared in the IR.
                match graph.ir.nodes.first() {
                    Some(n) => n.id.clone(),
                    None => break,
                }
            }
            None if current_action == ERROR_ACTION => {
                warn!(node_id = %current, "unhandled error action");
                return Err(NodeError::UnhandledErrorAction {
                    node_id: current.clone(),
                }
                .into());
            }
            None => break,
        };
        started = true;
        if edge::is_terminal(&next) {
            break;
        }
        guard.step(&current, &next)?;

        let node_ir = graph
            .ir
            .find_node(&next)
            .ok_or_else(|| UserError::DanglingEdge(next.clone()))?;
        let node = graph
            .nodes
            .get(&next)
            .ok_or_else(|| UserError::DanglingEdge(next.clone()))?;

        let outcome = lifecycle::run_node(&next, node.as_ref(), &node_ir.params, &mut store, depth, progress).await?;

        current_action = outcome.post.action;
        current = next;
    }

    let mut outputs = Map::new();
    for (name, spec) in &graph.ir.outputs {
        let rendered = template::resolve_template(&spec.source, &store)?;
        outputs.insert(name.clone(), rendered);
    }

    info!("workflow run completed");
    Ok(WorkflowOutcome { store, outputs })
}

/// Runs a workflow one recursion level deeper than `parent_depth`, for node
/// types (e.g. a "run this other workflow" connector) that embed pflow
/// inside pflow.
pub async fn execute_nested(
    graph: &ExecutableGraph,
    supplied_inputs: Map<String, Value>,
    parent_depth: u32,
    progress: Option<&ProgressCallback>,
) -> Result<WorkflowOutcome, PflowError> {
    execute(graph, supplied_inputs, parent_depth + 1, progress).await
}
