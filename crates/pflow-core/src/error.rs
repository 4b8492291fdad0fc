//! Error taxonomy: user errors, node errors, runtime errors, and
//! infrastructure errors, unified under [`PflowError`].

use thiserror::Error;

/// Malformed IR, unresolved templates, missing inputs, unknown node types.
/// Rendered to the user with a title, explanation, and remediation
/// suggestions; never a raw stack trace unless `--verbose`.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("template syntax error in `{template}`: {reason}")]
    TemplateSyntax { template: String, reason: String },

    #[error("unresolved variable `${{{path}}}`")]
    UnresolvedVariable {
        path: String,
        suggestions: Vec<String>,
    },

    #[error("unknown output `{segment}` on node `{node_id}`; available outputs: {available}")]
    UnknownOutput {
        node_id: String,
        segment: String,
        available: String,
    },

    #[error("invalid traversal through `{path}`: segment `{segment}` is not a dict/object")]
    InvalidTraversal { path: String, segment: String },

    #[error("unknown node type `{0}`")]
    UnknownNodeType(String),

    #[error("malformed workflow IR: {0}")]
    MalformedIr(String),

    #[error("duplicate edge (from=`{from}`, action=`{action}`)")]
    DuplicateEdge { from: String, action: String },

    #[error("edge references unknown node `{0}`")]
    DanglingEdge(String),

    #[error("at most one input may declare stdin=true, found: {0:?}")]
    MultipleStdinInputs(Vec<String>),

    #[error("stdin was piped but no input declares `\"stdin\": true`; add `\"stdin\": true` to one input")]
    NoStdinTarget,

    #[error("missing required input `{0}`")]
    MissingRequiredInput(String),

    #[error("node `{node_id}` references unregistered MCP server `{server}`")]
    UnknownMcpServer { node_id: String, server: String },

    #[error("node type `{0}` is not permitted by settings.json's registry.nodes filter")]
    NodeTypeNotAllowed(String),
}

/// A node returned action `"error"`, or raised after retries + fallback.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node `{node_id}` failed: {source}")]
    Failed {
        node_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("node `{node_id}` returned action `error` with no `error` edge wired")]
    UnhandledErrorAction { node_id: String },
}

/// Timeouts, iteration cap exceeded, cancellation.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("node `{node_id}` timed out after {timeout_ms}ms during {phase}")]
    Timeout {
        node_id: String,
        phase: &'static str,
        timeout_ms: u64,
    },

    #[error("iteration cap ({cap}) exceeded; cycle involves `{from}` -> `{to}`")]
    IterationLimitExceeded {
        cap: usize,
        from: String,
        to: String,
    },

    #[error("execution interrupted")]
    ExecutionInterrupted,
}

/// Registry load, filesystem, schema parse. Terminates before execution.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("failed to read workflow file `{path}`: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse IR: {0}")]
    ParseIr(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PflowError {
    #[error(transparent)]
    User(#[from] UserError),
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PflowError {
    /// Process exit code: 0 success, 1 workflow failure, 2
    /// validation/compilation failure, 64 usage error. Called only on the
    /// error path, so 0 never appears here.
    pub fn exit_code(&self) -> i32 {
        match self {
            PflowError::User(_) => 2,
            PflowError::Node(_) | PflowError::Runtime(_) => 1,
            PflowError::Infra(_) | PflowError::Internal(_) => 1,
        }
    }
}
