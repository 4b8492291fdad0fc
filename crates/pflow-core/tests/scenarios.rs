//! End-to-end scenarios exercising a whole IR document through compile +
//! execute. Each test builds an `ExecutableGraph` from a `WorkflowIr`
//! literal and asserts on the rendered outputs or the error returned,
//! rather than poking individual modules in isolation.

use pflow_core::compiler::compile;
use pflow_core::error::{NodeError, PflowError, RuntimeError, UserError};
use pflow_core::executor::execute;
use pflow_core::ir::{EdgeIr, InputSpec, NodeIr, OutputSpec, WorkflowIr, END_SENTINEL, START_SENTINEL};
use pflow_core::nodes;
use pflow_core::registry::NodeRegistry;
use serde_json::{json, Map};
use std::collections::HashMap;

fn registry() -> NodeRegistry {
    let mut r = NodeRegistry::new();
    nodes::register_builtins(&mut r);
    r
}

fn input(required: bool, default: Option<serde_json::Value>) -> InputSpec {
    InputSpec {
        type_name: "string".to_string(),
        required,
        default,
        stdin: false,
        description: None,
    }
}

/// A `set` node templated from an input, rendered straight through to a
/// declared output, preserving the nested object's types.
#[tokio::test]
async fn inline_object_templating_preserves_nested_types() {
    let mut inputs = HashMap::new();
    inputs.insert("payload".to_string(), input(true, None));

    let mut outputs = HashMap::new();
    outputs.insert(
        "echoed".to_string(),
        OutputSpec {
            source: "${A.count}".to_string(),
        },
    );

    let ir = WorkflowIr {
        version: None,
        inputs,
        nodes: vec![NodeIr {
            id: "A".to_string(),
            node_type: "set".to_string(),
            params: json!({"count": "${payload.count}"}),
        }],
        edges: vec![
            EdgeIr { from: START_SENTINEL.to_string(), to: "A".to_string(), action: "default".to_string() },
            EdgeIr { from: "A".to_string(), to: END_SENTINEL.to_string(), action: "default".to_string() },
        ],
        outputs,
        iteration_cap: 100,
    };

    let graph = compile(ir, &registry()).unwrap();
    let mut supplied = Map::new();
    supplied.insert("payload".to_string(), json!({"count": 7}));
    let outcome = execute(&graph, supplied, 0, None).await.unwrap();

    // The integer survives the round trip as a JSON number, not "7".
    assert_eq!(outcome.outputs.get("echoed"), Some(&json!(7)));
}

/// A node's string output is itself a JSON document, and a downstream
/// node reads through it via auto-parse without any explicit parse step
/// in the IR.
#[tokio::test]
async fn nested_auto_parse_reaches_into_a_json_string_output() {
    let mut outputs = HashMap::new();
    outputs.insert(
        "code".to_string(),
        OutputSpec {
            source: "${A.stdout.exit_code}".to_string(),
        },
    );

    let ir = WorkflowIr {
        version: None,
        inputs: HashMap::new(),
        nodes: vec![NodeIr {
            id: "A".to_string(),
            node_type: "shell".to_string(),
            params: json!({"command": "sh", "args": ["-c", "echo '{\"exit_code\": 9}'"]}),
        }],
        edges: vec![
            EdgeIr { from: START_SENTINEL.to_string(), to: "A".to_string(), action: "default".to_string() },
            EdgeIr { from: "A".to_string(), to: END_SENTINEL.to_string(), action: "default".to_string() },
        ],
        outputs,
        iteration_cap: 100,
    };

    let graph = compile(ir, &registry()).unwrap();
    let outcome = execute(&graph, Map::new(), 0, None).await.unwrap();
    assert_eq!(outcome.outputs.get("code"), Some(&json!(9)));
}

/// A node whose command always exits nonzero takes its wired `"error"`
/// action rather than failing the whole workflow, and the downstream
/// recovery node's output is what gets rendered.
#[tokio::test]
async fn failing_command_falls_back_to_wired_error_edge() {
    let ir = WorkflowIr {
        version: None,
        inputs: HashMap::new(),
        nodes: vec![
            NodeIr {
                id: "A".to_string(),
                node_type: "shell".to_string(),
                params: json!({"command": "sh", "args": ["-c", "exit 1"]}),
            },
            NodeIr {
                id: "B".to_string(),
                node_type: "set".to_string(),
                params: json!({"recovered": true}),
            },
        ],
        edges: vec![
            EdgeIr { from: START_SENTINEL.to_string(), to: "A".to_string(), action: "default".to_string() },
            EdgeIr { from: "A".to_string(), to: "B".to_string(), action: "error".to_string() },
            EdgeIr { from: "B".to_string(), to: END_SENTINEL.to_string(), action: "default".to_string() },
        ],
        outputs: {
            let mut o = HashMap::new();
            o.insert("done".to_string(), OutputSpec { source: "${B.recovered}".to_string() });
            o
        },
        iteration_cap: 100,
    };

    let graph = compile(ir, &registry()).unwrap();
    let outcome = execute(&graph, Map::new(), 0, None).await.unwrap();
    assert_eq!(outcome.outputs.get("done"), Some(&json!(true)));
}

/// A cycle with no exit edge is aborted by the iteration cap rather than
/// looping forever, and the error names both nodes in the offending
/// transition.
#[tokio::test]
async fn iteration_cap_exceeded_names_both_nodes() {
    let ir = WorkflowIr {
        version: None,
        inputs: HashMap::new(),
        nodes: vec![
            NodeIr { id: "A".to_string(), node_type: "set".to_string(), params: json!({}) },
            NodeIr { id: "B".to_string(), node_type: "set".to_string(), params: json!({}) },
        ],
        edges: vec![
            EdgeIr { from: START_SENTINEL.to_string(), to: "A".to_string(), action: "default".to_string() },
            EdgeIr { from: "A".to_string(), to: "B".to_string(), action: "default".to_string() },
            EdgeIr { from: "B".to_string(), to: "A".to_string(), action: "default".to_string() },
        ],
        outputs: HashMap::new(),
        iteration_cap: 5,
    };

    let graph = compile(ir, &registry()).unwrap();
    let err = execute(&graph, Map::new(), 0, None).await.unwrap_err();
    match err {
        PflowError::Runtime(RuntimeError::IterationLimitExceeded { cap, from, to }) => {
            assert_eq!(cap, 5);
            assert!(from == "A" || from == "B");
            assert!(to == "A" || to == "B");
        }
        other => panic!("expected IterationLimitExceeded, got {other:?}"),
    }
}

/// A required input with no default and nothing supplied is rejected
/// before any node runs, not silently treated as null.
#[tokio::test]
async fn missing_required_input_is_rejected_before_execution() {
    let mut inputs = HashMap::new();
    inputs.insert("name".to_string(), input(true, None));

    let ir = WorkflowIr {
        version: None,
        inputs,
        nodes: vec![NodeIr {
            id: "A".to_string(),
            node_type: "set".to_string(),
            params: json!({"greeting": "${name}"}),
        }],
        edges: vec![
            EdgeIr { from: START_SENTINEL.to_string(), to: "A".to_string(), action: "default".to_string() },
            EdgeIr { from: "A".to_string(), to: END_SENTINEL.to_string(), action: "default".to_string() },
        ],
        outputs: HashMap::new(),
        iteration_cap: 100,
    };

    let graph = compile(ir, &registry()).unwrap();
    let err = execute(&graph, Map::new(), 0, None).await.unwrap_err();
    assert!(matches!(
        err,
        PflowError::User(UserError::MissingRequiredInput(ref n)) if n == "name"
    ));
}

/// A `switch` node routes on its boolean rule, and the workflow's chosen
/// branch determines which node's output ends up rendered.
#[tokio::test]
async fn switch_node_routes_to_the_matching_branch() {
    let ir = WorkflowIr {
        version: None,
        inputs: HashMap::new(),
        nodes: vec![
            NodeIr {
                id: "Check".to_string(),
                node_type: "switch".to_string(),
                params: json!({
                    "value": 10,
                    "rules": [
                        {"when": "value > 5", "action": "big"},
                        {"when": "value <= 5", "action": "small"}
                    ]
                }),
            },
            NodeIr {
                id: "BigBranch".to_string(),
                node_type: "set".to_string(),
                params: json!({"label": "big"}),
            },
            NodeIr {
                id: "SmallBranch".to_string(),
                node_type: "set".to_string(),
                params: json!({"label": "small"}),
            },
        ],
        edges: vec![
            EdgeIr { from: START_SENTINEL.to_string(), to: "Check".to_string(), action: "default".to_string() },
            EdgeIr { from: "Check".to_string(), to: "BigBranch".to_string(), action: "big".to_string() },
            EdgeIr { from: "Check".to_string(), to: "SmallBranch".to_string(), action: "small".to_string() },
            EdgeIr { from: "BigBranch".to_string(), to: END_SENTINEL.to_string(), action: "default".to_string() },
            EdgeIr { from: "SmallBranch".to_string(), to: END_SENTINEL.to_string(), action: "default".to_string() },
        ],
        outputs: {
            let mut o = HashMap::new();
            o.insert("label".to_string(), OutputSpec { source: "${BigBranch.label}".to_string() });
            o
        },
        iteration_cap: 100,
    };

    let graph = compile(ir, &registry()).unwrap();
    let outcome = execute(&graph, Map::new(), 0, None).await.unwrap();
    assert_eq!(outcome.outputs.get("label"), Some(&json!("big")));
}

/// A node that fails with no wired `"error"` edge terminates the workflow
/// with `NodeError::UnhandledErrorAction` rather than rendering outputs as
/// if nothing had gone wrong.
#[tokio::test]
async fn unwired_failure_does_not_silently_succeed() {
    let ir = WorkflowIr {
        version: None,
        inputs: HashMap::new(),
        nodes: vec![NodeIr {
            id: "A".to_string(),
            node_type: "shell".to_string(),
            params: json!({"command": "sh", "args": ["-c", "exit 1"]}),
        }],
        edges: vec![EdgeIr { from: START_SENTINEL.to_string(), to: "A".to_string(), action: "default".to_string() }],
        outputs: {
            let mut o = HashMap::new();
            o.insert("never".to_string(), OutputSpec { source: "${A.stdout}".to_string() });
            o
        },
        iteration_cap: 100,
    };

    let graph = compile(ir, &registry()).unwrap();
    let err = execute(&graph, Map::new(), 0, None).await.unwrap_err();
    assert!(matches!(err, PflowError::Node(NodeError::UnhandledErrorAction { ref node_id }) if node_id == "A"));
}

/// A default-valued optional input is used when the caller supplies
/// nothing, and a caller-supplied value overrides the default.
#[tokio::test]
async fn default_input_value_is_used_unless_overridden() {
    let mut inputs = HashMap::new();
    inputs.insert("greeting".to_string(), input(false, Some(json!("hello"))));

    let mut outputs = HashMap::new();
    outputs.insert("out".to_string(), OutputSpec { source: "${A.value}".to_string() });

    let ir = WorkflowIr {
        version: None,
        inputs,
        nodes: vec![NodeIr {
            id: "A".to_string(),
            node_type: "set".to_string(),
            params: json!("${greeting}"),
        }],
        edges: vec![
            EdgeIr { from: START_SENTINEL.to_string(), to: "A".to_string(), action: "default".to_string() },
            EdgeIr { from: "A".to_string(), to: END_SENTINEL.to_string(), action: "default".to_string() },
        ],
        outputs,
        iteration_cap: 100,
    };

    let graph = compile(ir.clone(), &registry()).unwrap();
    let outcome = execute(&graph, Map::new(), 0, None).await.unwrap();
    assert_eq!(outcome.outputs.get("out"), Some(&json!("hello")));

    let graph = compile(ir, &registry()).unwrap();
    let mut supplied = Map::new();
    supplied.insert("greeting".to_string(), json!("overridden"));
    let outcome = execute(&graph, supplied, 0, None).await.unwrap();
    assert_eq!(outcome.outputs.get("out"), Some(&json!("overridden")));
}
