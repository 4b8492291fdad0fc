//! The Workflow Intermediate Representation: the JSON document a workflow
//! author (or the upstream NL planner) hands to the compiler.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const START_SENTINEL: &str = "__start__";
pub const END_SENTINEL: &str = "__end__";
pub const DEFAULT_ACTION: &str = "default";

/// Top-level IR document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowIr {
    /// Reserved for schema evolution; unused today, tolerated so older and
    /// newer IR documents interoperate.
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub inputs: HashMap<String, InputSpec>,
    pub nodes: Vec<NodeIr>,
    pub edges: Vec<EdgeIr>,
    #[serde(default)]
    pub outputs: HashMap<String, OutputSpec>,
    /// Bound on cycles before the edge follower aborts with
    /// `IterationLimitExceeded`.
    #[serde(default = "default_iteration_cap")]
    pub iteration_cap: usize,
}

fn default_iteration_cap() -> usize {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSpec {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub stdin: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIr {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeIr {
    pub from: String,
    pub to: String,
    #[serde(default = "default_action")]
    pub action: String,
}

fn default_action() -> String {
    DEFAULT_ACTION.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSpec {
    pub source: String,
}

/// One reserved param key per lifecycle control the IR can declare on a
/// node without a dedicated schema field.
pub mod reserved_params {
    pub const TIMEOUT_MS: &str = "__timeout_ms";
    pub const MAX_RETRIES: &str = "__max_retries";
    pub const WAIT_MS: &str = "__wait_ms";
}

impl WorkflowIr {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn find_node(&self, id: &str) -> Option<&NodeIr> {
        self.nodes.iter().find(|n| n.id == id)
    }
}
