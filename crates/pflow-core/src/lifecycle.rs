//! Node lifecycle runtime.
//!
//! Drives one node through prep, exec (retry, backoff, timeout), fallback,
//! and post, wrapped outside-in by template resolution (resolve params
//! against the store), namespacing (write `post`'s fields under the node's
//! id), instrumentation (accumulate a [`TraceRecord`]), and progress
//! (notify the output controller).

use crate::error::{PflowError, RuntimeError, UserError};
use crate::ir::reserved_params;
use crate::registry::{Node, PostResult};
use crate::store::SharedStore;
use crate::template;
use crate::trace::TraceRecord;
use rand::Rng;
use serde_json::Value;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

const DEFAULT_MAX_RETRIES: u64 = 1;
const DEFAULT_WAIT_MS: u64 = 0;

/// `"start"` before a node's prep begins, `"complete"` after post returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Start,
    Complete,
}

/// Emitted around one node's lifecycle, for the CLI's interactive progress
/// line: `"{indent}{node_id}... done {duration}s"` on `Complete`. Callback
/// exceptions are never allowed to reach here; the callback type is
/// infallible, so a broken callback can never break execution.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub node_id: String,
    pub phase: ProgressPhase,
    pub depth: u32,
    pub duration_secs: f64,
    pub action: String,
    pub failed: bool,
}

pub type ProgressCallback = dyn Fn(&ProgressEvent) + Send + Sync;

pub struct LifecycleOutcome {
    pub post: PostResult,
    pub trace: TraceRecord,
}

fn read_reserved_u64(params: &Value, key: &str) -> Option<u64> {
    params.get(key).and_then(|v| v.as_u64())
}

async fn with_timeout<T, F>(
    timeout_ms: Option<u64>,
    node_id: &str,
    phase: &'static str,
    fut: F,
) -> Result<T, RuntimeError>
where
    F: Future<Output = T>,
{
    match timeout_ms {
        Some(ms) if ms > 0 => tokio::time::timeout(Duration::from_millis(ms), fut)
            .await
            .map_err(|_| RuntimeError::Timeout {
                node_id: node_id.to_string(),
                phase,
                timeout_ms: ms,
            }),
        _ => Ok(fut.await),
    }
}

/// Adds up to 20% random jitter on top of `wait_ms` so retries of the same
/// failing node across a run don't all land in lockstep.
fn jittered_wait_ms(wait_ms: u64) -> u64 {
    let spread = wait_ms / 5;
    if spread == 0 {
        return wait_ms;
    }
    wait_ms + rand::thread_rng().gen_range(0..=spread)
}

fn error_fields(err: &anyhow::Error) -> serde_json::Map<String, Value> {
    let mut fields = serde_json::Map::new();
    fields.insert("error".to_string(), Value::String(err.to_string()));
    fields
}

/// Runs one node to completion: resolves its params, executes its
/// lifecycle with retry/backoff/timeout, writes its outputs into `store`
/// under its own namespace, and returns the action that drives edge
/// selection.
#[instrument(skip(node, raw_params, store, progress), fields(node_id = %node_id, depth))]
pub async fn run_node(
    node_id: &str,
    node: &dyn Node,
    raw_params: &Value,
    store: &mut SharedStore,
    depth: u32,
    progress: Option<&ProgressCallback>,
) -> Result<LifecycleOutcome, PflowError> {
    let start = Instant::now();
    let start_ts = chrono::Utc::now();
    debug!("node starting");

    if let Some(cb) = progress {
        cb(&ProgressEvent {
            node_id: node_id.to_string(),
            phase: ProgressPhase::Start,
            depth,
            duration_secs: 0.0,
            action: String::new(),
            failed: false,
        });
    }

    // Template wrapper: resolve `${...}` before the node ever sees params.
    let resolved_params = template::resolve_nested(raw_params, store)?;
    if let Some(path) = template::find_unresolved(&resolved_params) {
        return Err(PflowError::from(UserError::UnresolvedVariable {
            path,
            suggestions: store.keys(),
        }));
    }

    let max_retries = read_reserved_u64(&resolved_params, reserved_params::MAX_RETRIES)
        .unwrap_or(DEFAULT_MAX_RETRIES)
        .max(1);
    let wait_ms = read_reserved_u64(&resolved_params, reserved_params::WAIT_MS).unwrap_or(DEFAULT_WAIT_MS);
    let timeout_ms = read_reserved_u64(&resolved_params, reserved_params::TIMEOUT_MS);

    let prep_result = match with_timeout(timeout_ms, node_id, "prep", node.prep(&resolved_params)).await? {
        Ok(v) => v,
        Err(e) => {
            return finish(
                node_id,
                store,
                depth,
                progress,
                start,
                start_ts,
                0,
                PostResult {
                    fields: {
                        let mut f = serde_json::Map::new();
                        f.insert("error".to_string(), Value::String(e.to_string()));
                        f
                    },
                    action: "error".to_string(),
                },
                Some("node-error"),
            );
        }
    };

    // A timed-out attempt is one more retry consumed, not a hard abort: the
    // executor must return promptly without ever joining an abandoned
    // attempt, but it must still give `max_retries` a fair chance before
    // giving up.
    let mut attempt: u32 = 0;
    let exec_result: Result<Value, anyhow::Error> = loop {
        attempt += 1;
        let outcome = match timeout_ms {
            Some(ms) if ms > 0 => tokio::time::timeout(Duration::from_millis(ms), node.exec(&prep_result))
                .await
                .unwrap_or_else(|_| {
                    Err(anyhow::Error::new(RuntimeError::Timeout {
                        node_id: node_id.to_string(),
                        phase: "exec",
                        timeout_ms: ms,
                    }))
                }),
            _ => node.exec(&prep_result).await,
        };
        match outcome {
            Ok(v) => break Ok(v),
            Err(e) if (attempt as u64) < max_retries => {
                warn!(attempt, max_retries, error = %e, "node attempt failed, retrying");
                if wait_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(jittered_wait_ms(wait_ms))).await;
                }
                continue;
            }
            Err(e) => break Err(e),
        }
    };

    let (post, error_kind) = match exec_result {
        Ok(v) => (node.post(v).await, None),
        Err(e) => match node.exec_fallback(&prep_result, e).await {
            Ok(v) => (node.post(v).await, None),
            Err(e) => {
                (
                    PostResult {
                        fields: error_fields(&e),
                        action: "error".to_string(),
                    },
                    Some("node-error"),
                )
            }
        },
    };

    finish(node_id, store, depth, progress, start, start_ts, attempt.saturating_sub(1), post, error_kind)
}

fn finish(
    node_id: &str,
    store: &mut SharedStore,
    depth: u32,
    progress: Option<&ProgressCallback>,
    start: Instant,
    start_ts: chrono::DateTime<chrono::Utc>,
    retries: u32,
    post: PostResult,
    error_kind: Option<&str>,
) -> Result<LifecycleOutcome, PflowError> {
    let duration = start.elapsed();
    let failed = post.action == "error";

    if failed {
        warn!(node_id, retries, duration_ms = duration.as_millis() as u64, "node failed");
    } else {
        tracing::info!(node_id, retries, action = %post.action, duration_ms = duration.as_millis() as u64, "node completed");
    }

    let trace = match error_kind {
        Some(kind) => TraceRecord::failed(node_id, start_ts, duration, retries, kind),
        None => TraceRecord::success(node_id, start_ts, duration, retries, post.action.clone()),
    };
    crate::trace::append(store, trace.clone());

    store.write_namespace(node_id, post.fields.clone());

    if let Some(cb) = progress {
        cb(&ProgressEvent {
            node_id: node_id.to_string(),
            phase: ProgressPhase::Complete,
            depth,
            duration_secs: duration.as_secs_f64(),
            action: post.action.clone(),
            failed,
        });
    }

    Ok(LifecycleOutcome { post, trace })
}
