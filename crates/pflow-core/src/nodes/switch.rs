//! A branching node: evaluates a small boolean expression per candidate
//! action and follows the first one that's true, falling back to a
//! declared default action. Uses `evalexpr` to evaluate each rule's
//! expression against the node's `value` param.

use crate::error::PflowError;
use crate::registry::{Node, NodeFactory, NodeInterface, PortSpec, PostResult};
use crate::template::Shape;
use async_trait::async_trait;
use evalexpr::{ContextWithMutableVariables, HashMapContext};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
struct Rule {
    when: String,
    action: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SwitchParams {
    value: Value,
    #[serde(default)]
    rules: Vec<Rule>,
    #[serde(default = "default_action")]
    default_action: String,
}

fn default_action() -> String {
    crate::ir::DEFAULT_ACTION.to_string()
}

fn json_to_evalexpr(v: &Value) -> evalexpr::Value {
    match v {
        Value::Null => evalexpr::Value::Empty,
        Value::Bool(b) => evalexpr::Value::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                evalexpr::Value::Int(i)
            } else {
                evalexpr::Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => evalexpr::Value::String(s.clone()),
        other => evalexpr::Value::String(other.to_string()),
    }
}

pub struct SwitchNode;

#[async_trait]
impl Node for SwitchNode {
    async fn prep(&self, params: &Value) -> Result<Value, PflowError> {
        serde_json::from_value::<SwitchParams>(params.clone())
            .map(|_| params.clone())
            .map_err(|e| PflowError::Internal(anyhow::anyhow!("invalid switch params: {e}")))
    }

    async fn exec(&self, prep_result: &Value) -> anyhow::Result<Value> {
        let params: SwitchParams = serde_json::from_value(prep_result.clone())?;
        let mut ctx = HashMapContext::new();
        ctx.set_value("value".to_string(), json_to_evalexpr(&params.value))?;

        for rule in &params.rules {
            if evalexpr::eval_boolean_with_context(&rule.when, &ctx)? {
                return Ok(Value::String(rule.action.clone()));
            }
        }
        Ok(Value::String(params.default_action))
    }

    async fn post(&self, exec_result: Value) -> PostResult {
        let action = exec_result.as_str().unwrap_or(crate::ir::DEFAULT_ACTION).to_string();
        let mut fields = serde_json::Map::new();
        fields.insert("action".to_string(), Value::String(action.clone()));
        PostResult { fields, action }
    }
}

pub struct SwitchFactory;

impl NodeFactory for SwitchFactory {
    fn build(&self, _params: &Value) -> anyhow::Result<Box<dyn Node>> {
        Ok(Box::new(SwitchNode))
    }

    fn interface(&self) -> NodeInterface {
        NodeInterface {
            type_name: "switch".to_string(),
            description: Some("Evaluates `rules` in order against `value`, following the first match's action.".to_string()),
            inputs: vec![
                PortSpec { name: "value".to_string(), description: None },
                PortSpec { name: "rules".to_string(), description: None },
            ],
            outputs: vec![PortSpec {
                name: "action".to_string(),
                description: None,
            }],
            structure: NodeInterface::structure_as_object(&[("action", Shape::Scalar)]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn first_matching_rule_wins() {
        let node = SwitchNode;
        let params = json!({
            "value": 15,
            "rules": [
                {"when": "value > 10", "action": "high"},
                {"when": "value > 0", "action": "low"},
            ],
            "default_action": "default",
        });
        let prepped = node.prep(&params).await.unwrap();
        let exec_result = node.exec(&prepped).await.unwrap();
        let post = node.post(exec_result).await;
        assert_eq!(post.action, "high");
    }

    #[tokio::test]
    async fn falls_back_to_default_action() {
        let node = SwitchNode;
        let params = json!({"value": -1, "rules": [{"when": "value > 0", "action": "positive"}]});
        let prepped = node.prep(&params).await.unwrap();
        let exec_result = node.exec(&prepped).await.unwrap();
        let post = node.post(exec_result).await;
        assert_eq!(post.action, "default");
    }
}
