//! Node trait, per-type factories, and the string-keyed registry that maps
//! an IR node's `"type"` to a factory.

use crate::error::PflowError;
use crate::template::Shape;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// One input or output port a node type declares, for docs and for the
/// Template Validator's `UnknownOutput` checks.
#[derive(Clone, Debug)]
pub struct PortSpec {
    pub name: String,
    pub description: Option<String>,
}

/// Everything the compiler and validator need to know about a node type,
/// independent of any particular instance's params.
#[derive(Clone, Debug)]
pub struct NodeInterface {
    pub type_name: String,
    pub description: Option<String>,
    pub inputs: Vec<PortSpec>,
    pub outputs: Vec<PortSpec>,
    /// Declared shape of this node type's namespace, used by the template
    /// validator to check `${this_node.field}` references at compile time.
    /// `Shape::Any` for node types whose output shape depends on runtime
    /// params (e.g. a generic passthrough).
    pub structure: Shape,
}

impl NodeInterface {
    pub fn structure_as_object(outputs: &[(&str, Shape)]) -> Shape {
        let mut fields = BTreeMap::new();
        for (name, shape) in outputs {
            fields.insert(name.to_string(), shape.clone());
        }
        Shape::Object(fields)
    }
}

/// The outcome of one lifecycle phase: the resolved fields to merge into
/// this node's namespace, and the action string driving edge selection.
#[derive(Clone, Debug, Default)]
pub struct PostResult {
    pub fields: serde_json::Map<String, Value>,
    pub action: String,
}

/// A compiled, instantiated node. One instance is built per node id at
/// compile time and reused across every execution of that node (e.g.
/// inside a loop).
#[async_trait]
pub trait Node: Send + Sync {
    /// Gathers whatever this node needs from the shared store before
    /// `exec`, already template-resolved. Returning an `Err` here skips
    /// `exec`/`exec_fallback` entirely and goes straight to `post`.
    async fn prep(&self, params: &Value) -> Result<Value, PflowError>;

    /// The node's actual work. May be retried per its `__max_retries`/
    /// `__wait_ms` params; `exec_fallback` only runs once every retry here
    /// is exhausted.
    async fn exec(&self, prep_result: &Value) -> anyhow::Result<Value>;

    /// Runs once, after `exec` has failed on every retry. The default
    /// re-raises the last error, matching nodes with no fallback behavior.
    async fn exec_fallback(&self, prep_result: &Value, error: anyhow::Error) -> anyhow::Result<Value> {
        let _ = prep_result;
        Err(error)
    }

    /// Turns the exec (or fallback) outcome into namespace fields and an
    /// action string. The default writes the raw value under `result` and
    /// takes the `"default"` edge.
    async fn post(&self, exec_result: Value) -> PostResult {
        let mut fields = serde_json::Map::new();
        fields.insert("result".to_string(), exec_result);
        PostResult {
            fields,
            action: crate::ir::DEFAULT_ACTION.to_string(),
        }
    }
}

/// Builds a [`Node`] instance from an IR node's params.
pub trait NodeFactory: Send + Sync {
    fn build(&self, params: &Value) -> anyhow::Result<Box<dyn Node>>;
    fn interface(&self) -> NodeInterface;
}

/// String-keyed node type registry, backing `pflow --list`.
#[derive(Default)]
pub struct NodeRegistry {
    factories: HashMap<String, Box<dyn NodeFactory>>,
    /// MCP server names the registry scanner has discovered. The compiler
    /// checks membership here before it will accept a `mcp-<server>-<tool>`
    /// virtual node type.
    mcp_servers: std::collections::HashSet<String>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, node_type: &str, factory: Box<dyn NodeFactory>) {
        self.factories.insert(node_type.to_string(), factory);
    }

    pub fn register_mcp_server(&mut self, server: &str) {
        self.mcp_servers.insert(server.to_string());
    }

    pub fn is_mcp_server_registered(&self, server: &str) -> bool {
        self.mcp_servers.contains(server)
    }

    pub fn get(&self, node_type: &str) -> Option<&dyn NodeFactory> {
        self.factories.get(node_type).map(|b| b.as_ref())
    }

    /// `mcp-<server>-<tool>` node types are recognized structurally rather
    /// than pre-registered: any type matching this shape resolves to a
    /// generic MCP-invocation factory if one has been installed under the
    /// `"mcp"` key.
    pub fn resolve(&self, node_type: &str) -> Option<&dyn NodeFactory> {
        if let Some(f) = self.get(node_type) {
            return Some(f);
        }
        if node_type.starts_with("mcp-") {
            return self.get("mcp");
        }
        None
    }

    pub fn list_interfaces(&self) -> Vec<NodeInterface> {
        self.factories.values().map(|f| f.interface()).collect()
    }
}

/// Splits a `mcp-<server>-<tool>` virtual type name into its server and
/// tool parts. `<server>` and `<tool>` are each a single `-`-free segment,
/// so the split is unambiguous: everything before the first remaining `-`
/// is the server, everything after is the tool.
pub fn parse_mcp_virtual_type(node_type: &str) -> Option<(String, String)> {
    let rest = node_type.strip_prefix("mcp-")?;
    let (server, tool) = rest.split_once('-')?;
    if server.is_empty() || tool.is_empty() {
        return None;
    }
    Some((server.to_string(), tool.to_string()))
}

/// Reserved param keys the compiler injects into a `mcp-<server>-<tool>`
/// node's params before the node factory ever builds it.
pub mod mcp_reserved_params {
    pub const SERVER: &str = "__mcp_server__";
    pub const TOOL: &str = "__mcp_tool__";
}


#[cfg(test)]
mod tests {
    use super::*;

    struct EchoNode;

    #[async_trait]
    impl Node for EchoNode {
        async fn prep(&self, params: &Value) -> Result<Value, PflowError> {
            Ok(params.clone())
        }
        async fn exec(&self, prep_result: &Value) -> anyhow::Result<Value> {
            Ok(prep_result.clone())
        }
    }

    struct EchoFactory;

    impl NodeFactory for EchoFactory {
        fn build(&self, _params: &Value) -> anyhow::Result<Box<dyn Node>> {
            Ok(Box::new(EchoNode))
        }
        fn interface(&self) -> NodeInterface {
            NodeInterface {
                type_name: "echo".to_string(),
                description: None,
                inputs: vec![],
                outputs: vec![PortSpec {
                    name: "result".to_string(),
                    description: None,
                }],
                structure: NodeInterface::structure_as_object(&[("result", Shape::Any)]),
            }
        }
    }

    #[test]
    fn resolves_registered_and_mcp_virtual_types() {
        let mut registry = NodeRegistry::new();
        registry.register("echo", Box::new(EchoFactory));
        registry.register("mcp", Box::new(EchoFactory));
        assert!(registry.resolve("echo").is_some());
        assert!(registry.resolve("mcp-filesystem-read").is_some());
        assert!(registry.resolve("unknown").is_none());
    }
}
