//! Compiler.
//!
//! Turns a [`crate::ir::WorkflowIr`] document into an [`ExecutableGraph`]:
//! resolves every node's `"type"` against the [`NodeRegistry`], validates
//! every `${...}` template against the declared output shape of its root,
//! builds the edge table, and checks the graph for dangling edges before a
//! single node runs.

use crate::config::Settings;
use crate::edge::EdgeTable;
use crate::error::{PflowError, UserError};
use crate::ir::{WorkflowIr, END_SENTINEL, START_SENTINEL};
use crate::registry::{self, mcp_reserved_params, Node, NodeRegistry};
use crate::template::{Shape, StructureContext};
use petgraph::algo::has_path_connecting;
use petgraph::graphmap::DiGraphMap;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, instrument, warn};

/// A fully resolved, ready-to-run workflow: every node instantiated, every
/// template pre-validated, every edge indexed.
pub struct ExecutableGraph {
    pub ir: WorkflowIr,
    pub nodes: HashMap<String, Box<dyn Node>>,
    pub edges: EdgeTable,
}

/// For a `mcp-<server>-<tool>` node, checks the server is registered and
/// returns `params` with `__mcp_server__`/`__mcp_tool__` injected. Non-MCP
/// node types pass through unchanged.
fn inject_mcp_params(
    node_id: &str,
    node_type: &str,
    params: &serde_json::Value,
    registry: &NodeRegistry,
) -> Result<serde_json::Value, UserError> {
    let Some((server, tool)) = registry::parse_mcp_virtual_type(node_type) else {
        return Ok(params.clone());
    };
    if !registry.is_mcp_server_registered(&server) {
        return Err(UserError::UnknownMcpServer {
            node_id: node_id.to_string(),
            server,
        });
    }
    let mut merged = match params {
        serde_json::Value::Object(map) => map.clone(),
        serde_json::Value::Null => serde_json::Map::new(),
        _ => return Ok(params.clone()),
    };
    merged.insert(mcp_reserved_params::SERVER.to_string(), serde_json::Value::String(server));
    merged.insert(mcp_reserved_params::TOOL.to_string(), serde_json::Value::String(tool));
    Ok(serde_json::Value::Object(merged))
}

struct CompileContext<'a> {
    inputs: &'a HashMap<String, crate::ir::InputSpec>,
    node_shapes: BTreeMap<String, Shape>,
}

impl<'a> StructureContext for CompileContext<'a> {
    fn is_declared_input(&self, name: &str) -> bool {
        self.inputs.contains_key(name)
    }

    fn node_output_shape(&self, node_id: &str) -> Option<&Shape> {
        self.node_shapes.get(node_id)
    }

    fn is_reserved_root(&self, name: &str) -> bool {
        name.starts_with(crate::store::RESERVED_PREFIX)
    }

    fn available_roots(&self) -> Vec<String> {
        self.inputs
            .keys()
            .cloned()
            .chain(self.node_shapes.keys().cloned())
            .collect()
    }
}

/// Compiles `ir` against `registry`, or fails with a `UserError` describing
/// the first problem found: an unknown node type, a dangling edge, a
/// duplicate `(from, action)` pair, or an unresolvable template. Equivalent
/// to `compile_with_settings(ir, registry, None)`; no `settings.json`
/// allow/deny filter is applied.
pub fn compile(ir: WorkflowIr, registry: &NodeRegistry) -> Result<ExecutableGraph, PflowError> {
    compile_with_settings(ir, registry, None)
}

/// As [`compile`], but also rejects any node whose type fails `settings`'s
/// `registry.nodes` allow/deny filter, as part of the registry lookup
/// phase.
#[instrument(skip(ir, registry, settings))]
pub fn compile_with_settings(
    ir: WorkflowIr,
    registry: &NodeRegistry,
    settings: Option<&Settings>,
) -> Result<ExecutableGraph, PflowError> {
    info!(node_count = ir.nodes.len(), edge_count = ir.edges.len(), "compiling workflow");
    let mut ir = ir;
    let mut seen_ids = std::collections::HashSet::new();
    for node in &ir.nodes {
        if !seen_ids.insert(node.id.clone()) {
            warn!(node_id = %node.id, "duplicate node id");
            return Err(UserError::MalformedIr(format!("duplicate node id `{}`", node.id)).into());
        }
    }

    let mut nodes: HashMap<String, Box<dyn Node>> = HashMap::new();
    let mut node_shapes = BTreeMap::new();
    for node_ir in ir.nodes.iter_mut() {
        if let Some(settings) = settings {
            if !settings.node_type_allowed(&node_ir.node_type) {
                return Err(UserError::NodeTypeNotAllowed(node_ir.node_type.clone()).into());
            }
        }
        let factory = registry
            .resolve(&node_ir.node_type)
            .ok_or_else(|| UserError::UnknownNodeType(node_ir.node_type.clone()))?;
        // Injecting `__mcp_server__`/`__mcp_tool__` mutates the IR's stored
        // params in place so the executor later hands the node the same
        // resolved params the factory was built from.
        node_ir.params = inject_mcp_params(&node_ir.id, &node_ir.node_type, &node_ir.params, registry)?;
        let interface = factory.interface();
        node_shapes.insert(node_ir.id.clone(), interface.structure.clone());
        let instance = factory.build(&node_ir.params).map_err(PflowError::Internal)?;
        nodes.insert(node_ir.id.clone(), instance);
    }

    for edge in &ir.edges {
        if edge.from != START_SENTINEL && !seen_ids.contains(&edge.from) {
            return Err(UserError::DanglingEdge(edge.from.clone()).into());
        }
        if edge.to != END_SENTINEL && !seen_ids.contains(&edge.to) {
            return Err(UserError::DanglingEdge(edge.to.clone()).into());
        }
    }

    let ctx = CompileContext {
        inputs: &ir.inputs,
        node_shapes,
    };
    for node_ir in &ir.nodes {
        let (_, result) = crate::template::validate_params(&node_ir.params, &ctx);
        result?;
    }
    for output in ir.outputs.values() {
        crate::template::validate_path(&strip_template(&output.source), &ctx, &mut Vec::new())?;
    }

    check_reachability(&ir)?;

    let edges = EdgeTable::build(&ir.edges)?;

    info!("workflow compiled");
    Ok(ExecutableGraph { ir, nodes, edges })
}

/// Output `source` fields are bare `${path}` strings rather than full
/// interpolation templates; strip the wrapper so the validator sees a raw
/// path.
fn strip_template(source: &str) -> String {
    let t = source.trim();
    if t.starts_with("${") && t.ends_with('}') {
        t[2..t.len() - 1].to_string()
    } else {
        t.to_string()
    }
}

/// Rejects a node with no path from `__start__`, since an unreachable node
/// can never produce the output it was wired for. Cycles themselves are
/// legal, since the edge follower's iteration cap keeps those in check, so
/// this only rejects true islands.
fn check_reachability(ir: &WorkflowIr) -> Result<(), PflowError> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    graph.add_node(START_SENTINEL);
    graph.add_node(END_SENTINEL);
    for node in &ir.nodes {
        graph.add_node(node.id.as_str());
    }
    for edge in &ir.edges {
        graph.add_edge(edge.from.as_str(), edge.to.as_str(), ());
    }
    // A node with no incoming edges at all is only reachable if it's meant
    // to be an entry point, i.e. referenced as `to` from `__start__` or it
    // has zero inbound edges by design (single-node workflows). Only flag
    // nodes that have inbound edges from elsewhere but no path from start.
    for node in &ir.nodes {
        let has_inbound = ir.edges.iter().any(|e| e.to == node.id);
        if !has_inbound {
            continue;
        }
        if !has_path_connecting(&graph, START_SENTINEL, node.id.as_str(), None) {
            return Err(UserError::DanglingEdge(node.id.clone()).into());
        }
    }
    Ok(())
}
