//! Namespaced shared store.
//!
//! Node writes land under `node_id.key` so two nodes can each produce a
//! `result` key without clobbering each other. Reads compose three layers:
//! a node's own namespace, reserved runtime keys, and the workflow's
//! declared inputs, so a template author writes `${A.stdout}` or `${name}`
//! without caring which layer it came from.

use serde_json::{Map, Value};
use std::ops::Index;

/// Prefix marking a param/store key as process-owned rather than
/// node-namespaced.
pub const RESERVED_PREFIX: &str = "__";

/// The shared data store threaded through one workflow run.
///
/// Holds only JSON-representable state. The progress callback and
/// recursion depth counter are process-level concerns the
/// [`crate::executor`] carries alongside the store, not inside it.
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    node_outputs: Map<String, Value>,
    reserved: Map<String, Value>,
    inputs: Map<String, Value>,
}

impl SharedStore {
    pub fn new(inputs: Map<String, Value>) -> Self {
        Self {
            node_outputs: Map::new(),
            reserved: Map::new(),
            inputs,
        }
    }

    /// Writes `key` into `node_id`'s namespace, unless `key` is reserved
    /// (`__`-prefixed), in which case it's written process-wide instead.
    pub fn write(&mut self, node_id: &str, key: &str, value: Value) {
        if key.starts_with(RESERVED_PREFIX) {
            self.reserved.insert(key.to_string(), value);
            return;
        }
        self.node_outputs
            .entry(node_id.to_string())
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .expect("node namespace is always an object")
            .insert(key.to_string(), value);
    }

    /// Bulk-writes a node's entire output dict into its namespace in one
    /// shot, merging with whatever the node already wrote (e.g. during
    /// `prep`).
    pub fn write_namespace(&mut self, node_id: &str, fields: Map<String, Value>) {
        let entry = self
            .node_outputs
            .entry(node_id.to_string())
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .expect("node namespace is always an object");
        for (k, v) in fields {
            entry.insert(k, v);
        }
    }

    pub fn write_reserved(&mut self, key: &str, value: Value) {
        self.reserved.insert(key.to_string(), value);
    }

    pub fn read_reserved(&self, key: &str) -> Option<&Value> {
        self.reserved.get(key)
    }

    pub fn node_namespace(&self, node_id: &str) -> Option<&Value> {
        self.node_outputs.get(node_id)
    }

    pub fn declared_input(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name)
    }

    pub fn set_declared_input(&mut self, name: &str, value: Value) {
        self.inputs.insert(name.to_string(), value);
    }

    /// Composed root lookup, precedence order: a node's own namespace, then
    /// reserved keys, then declared inputs.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.node_outputs
            .get(key)
            .or_else(|| self.reserved.get(key))
            .or_else(|| self.inputs.get(key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Every root key currently visible, across all three layers, for
    /// `UnresolvedVariable` suggestions and mapping-protocol iteration.
    pub fn keys(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .node_outputs
            .keys()
            .chain(self.reserved.keys())
            .chain(self.inputs.keys())
            .cloned()
            .collect();
        out.sort();
        out.dedup();
        out
    }

    pub fn items(&self) -> Vec<(String, Value)> {
        self.keys()
            .into_iter()
            .filter_map(|k| self.get(&k).map(|v| (k, v.clone())))
            .collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.items().into_iter().map(|(_, v)| v).collect()
    }

    /// Renders the full composed view as a single JSON object. Used when
    /// rendering declared `outputs` and for `--trace` dumps.
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        for k in self.keys() {
            if let Some(v) = self.get(&k) {
                out.insert(k, v.clone());
            }
        }
        Value::Object(out)
    }
}

/// Full mapping-protocol compatibility: `Index` for `store["key"]` reads,
/// `IntoIterator` for `for (k, v) in &store`, alongside the
/// `get`/`contains_key`/`keys`/`items`/`values` above.
impl Index<&str> for SharedStore {
    type Output = Value;

    fn index(&self, key: &str) -> &Value {
        self.get(key)
            .unwrap_or_else(|| panic!("no such key in shared store: `{key}`"))
    }
}

impl<'a> IntoIterator for &'a SharedStore {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.items().into_iter()
    }
}

impl crate::template::TemplateContext for SharedStore {
    fn lookup_root(&self, key: &str) -> Option<Value> {
        self.get(key).cloned()
    }

    fn available_roots(&self) -> Vec<String> {
        self.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateContext;
    use serde_json::json;

    #[test]
    fn namespaced_write_does_not_clobber_other_nodes() {
        let mut store = SharedStore::new(Map::new());
        store.write("A", "result", json!(1));
        store.write("B", "result", json!(2));
        assert_eq!(store.get("A"), Some(&json!({"result": 1})));
        assert_eq!(store.get("B"), Some(&json!({"result": 2})));
    }

    #[test]
    fn reserved_keys_bypass_namespacing() {
        let mut store = SharedStore::new(Map::new());
        store.write("A", "__timeout_ms", json!(5000));
        assert_eq!(store.read_reserved("__timeout_ms"), Some(&json!(5000)));
        assert_eq!(store.node_namespace("A"), None);
    }

    #[test]
    fn read_precedence_node_then_reserved_then_inputs() {
        let mut inputs = Map::new();
        inputs.insert("name".to_string(), json!("input-value"));
        let mut store = SharedStore::new(inputs);
        assert_eq!(store.get("name"), Some(&json!("input-value")));
        store.write_reserved("name", json!("reserved-value"));
        assert_eq!(store.get("name"), Some(&json!("reserved-value")));
        store.write("name", "whatever", json!(1));
        assert_eq!(store.get("name"), Some(&json!({"whatever": 1})));
    }

    #[test]
    fn index_and_into_iter_match_get_and_items() {
        let mut store = SharedStore::new(Map::new());
        store.write("A", "result", json!(1));
        assert_eq!(&store["A"], &json!({"result": 1}));

        let collected: Map<String, Value> = (&store).into_iter().collect();
        assert_eq!(collected.get("A"), Some(&json!({"result": 1})));
    }

    #[test]
    #[should_panic(expected = "no such key")]
    fn index_panics_on_missing_key() {
        let store = SharedStore::new(Map::new());
        let _ = &store["missing"];
    }

    #[test]
    fn template_context_lookup_matches_get() {
        let mut store = SharedStore::new(Map::new());
        store.write("A", "stdout", json!("hi"));
        assert_eq!(
            TemplateContext::lookup_root(&store, "A"),
            Some(json!({"stdout": "hi"}))
        );
    }
}
