//! A shell command node: the IR-level connector for anything not worth a
//! dedicated node type. Spawns the command via `tokio::process::Command`
//! and captures stdout/stderr/exit_code.

use crate::error::PflowError;
use crate::registry::{Node, NodeFactory, NodeInterface, PortSpec};
use crate::template::Shape;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::process::Command;

#[derive(Debug, Clone, Deserialize)]
struct ShellParams {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    stdin: Option<String>,
}

pub struct ShellNode;

#[async_trait]
impl Node for ShellNode {
    async fn prep(&self, params: &Value) -> Result<Value, PflowError> {
        serde_json::from_value::<ShellParams>(params.clone())
            .map(|_| params.clone())
            .map_err(|e| PflowError::Internal(anyhow::anyhow!("invalid shell params: {e}")))
    }

    async fn exec(&self, prep_result: &Value) -> anyhow::Result<Value> {
        let params: ShellParams = serde_json::from_value(prep_result.clone())?;
        let mut cmd = Command::new(&params.command);
        cmd.args(&params.args)
            .envs(&params.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &params.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn()?;
        if let Some(input) = &params.stdin {
            use tokio::io::AsyncWriteExt;
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).await?;
            }
        } else {
            drop(child.stdin.take());
        }

        let output = child.wait_with_output().await?;
        Ok(json!({
            "stdout": String::from_utf8_lossy(&output.stdout).to_string(),
            "stderr": String::from_utf8_lossy(&output.stderr).to_string(),
            "exit_code": output.status.code().unwrap_or(-1),
        }))
    }

    async fn post(&self, exec_result: Value) -> crate::registry::PostResult {
        let exit_code = exec_result.get("exit_code").and_then(|v| v.as_i64()).unwrap_or(-1);
        let mut fields = serde_json::Map::new();
        if let Value::Object(map) = exec_result {
            fields = map;
        }
        let action = if exit_code == 0 { "default" } else { "error" };
        crate::registry::PostResult {
            fields,
            action: action.to_string(),
        }
    }
}

pub struct ShellFactory;

impl NodeFactory for ShellFactory {
    fn build(&self, _params: &Value) -> anyhow::Result<Box<dyn Node>> {
        Ok(Box::new(ShellNode))
    }

    fn interface(&self) -> NodeInterface {
        NodeInterface {
            type_name: "shell".to_string(),
            description: Some("Runs a command as a subprocess and captures stdout/stderr/exit_code.".to_string()),
            inputs: vec![
                PortSpec { name: "command".to_string(), description: None },
                PortSpec { name: "args".to_string(), description: None },
            ],
            outputs: vec![
                PortSpec { name: "stdout".to_string(), description: None },
                PortSpec { name: "stderr".to_string(), description: None },
                PortSpec { name: "exit_code".to_string(), description: None },
            ],
            structure: NodeInterface::structure_as_object(&[
                ("stdout", Shape::StringMaybeJson),
                ("stderr", Shape::Scalar),
                ("exit_code", Shape::Scalar),
            ]),
        }
    }
}
