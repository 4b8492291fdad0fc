//! A literal/passthrough node: writes its (already template-resolved)
//! params straight into its namespace. Used for constant values, test
//! scaffolding, and as the trivial case the Template/Namespacing wrappers
//! are exercised against.

use crate::error::PflowError;
use crate::registry::{Node, NodeFactory, NodeInterface, PortSpec, PostResult};
use crate::template::Shape;
use async_trait::async_trait;
use serde_json::Value;

pub struct SetNode;

#[async_trait]
impl Node for SetNode {
    async fn prep(&self, params: &Value) -> Result<Value, PflowError> {
        Ok(params.clone())
    }

    async fn exec(&self, prep_result: &Value) -> anyhow::Result<Value> {
        Ok(prep_result.clone())
    }

    async fn post(&self, exec_result: Value) -> PostResult {
        let fields = match exec_result {
            Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        PostResult {
            fields,
            action: crate::ir::DEFAULT_ACTION.to_string(),
        }
    }
}

pub struct SetFactory;

impl NodeFactory for SetFactory {
    fn build(&self, _params: &Value) -> anyhow::Result<Box<dyn Node>> {
        Ok(Box::new(SetNode))
    }

    fn interface(&self) -> NodeInterface {
        NodeInterface {
            type_name: "set".to_string(),
            description: Some("Writes its resolved params directly into its own namespace.".to_string()),
            inputs: vec![],
            outputs: vec![PortSpec {
                name: "value".to_string(),
                description: None,
            }],
            structure: Shape::Any,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn object_params_become_namespace_fields() {
        let node = SetNode;
        let params = json!({"a": 1, "b": "two"});
        let prepped = node.prep(&params).await.unwrap();
        let exec_result = node.exec(&prepped).await.unwrap();
        let post = node.post(exec_result).await;
        assert_eq!(post.fields.get("a"), Some(&json!(1)));
        assert_eq!(post.action, "default");
    }

    #[tokio::test]
    async fn scalar_params_land_under_value() {
        let node = SetNode;
        let params = json!("just a string");
        let prepped = node.prep(&params).await.unwrap();
        let exec_result = node.exec(&prepped).await.unwrap();
        let post = node.post(exec_result).await;
        assert_eq!(post.fields.get("value"), Some(&json!("just a string")));
    }
}
