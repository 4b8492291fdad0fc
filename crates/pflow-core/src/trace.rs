//! Execution trace: one [`TraceRecord`] per node run, accumulated into the
//! reserved `__execution__` store key and surfaced via `pflow --trace`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub node_id: String,
    pub action: String,
    pub start_ts: DateTime<Utc>,
    pub duration_ms: u64,
    pub retries: u32,
    pub error_kind: Option<String>,
    /// Populated by node types that meter spend (e.g. an LLM call); `None`
    /// for everything else.
    pub cost_usd: Option<f64>,
    pub tokens: Option<u64>,
}

impl TraceRecord {
    pub fn success(node_id: &str, start_ts: DateTime<Utc>, duration: std::time::Duration, retries: u32, action: String) -> Self {
        Self {
            node_id: node_id.to_string(),
            action,
            start_ts,
            duration_ms: duration.as_millis() as u64,
            retries,
            error_kind: None,
            cost_usd: None,
            tokens: None,
        }
    }

    pub fn failed(
        node_id: &str,
        start_ts: DateTime<Utc>,
        duration: std::time::Duration,
        retries: u32,
        error_kind: &str,
    ) -> Self {
        Self {
            node_id: node_id.to_string(),
            action: "error".to_string(),
            start_ts,
            duration_ms: duration.as_millis() as u64,
            retries,
            error_kind: Some(error_kind.to_string()),
            cost_usd: None,
            tokens: None,
        }
    }
}

/// Appends `record` to the store's `__execution__` trace array, creating it
/// on first use.
pub fn append(store: &mut crate::store::SharedStore, record: TraceRecord) {
    let mut trace: Vec<TraceRecord> = store
        .read_reserved("__execution__")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    trace.push(record);
    store.write_reserved(
        "__execution__",
        serde_json::to_value(trace).unwrap_or_else(|_| serde_json::Value::Array(Vec::new())),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SharedStore;
    use serde_json::Map;

    #[test]
    fn trace_accumulates_across_appends() {
        let mut store = SharedStore::new(Map::new());
        append(
            &mut store,
            TraceRecord::success("A", Utc::now(), std::time::Duration::from_millis(10), 0, "default".into()),
        );
        append(
            &mut store,
            TraceRecord::success("B", Utc::now(), std::time::Duration::from_millis(20), 1, "default".into()),
        );
        let trace = store.read_reserved("__execution__").unwrap();
        assert_eq!(trace.as_array().unwrap().len(), 2);
    }
}
