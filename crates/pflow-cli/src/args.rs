//! Command-line surface.

use clap::Parser;
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "pflow", about = "Compile and run pflow workflows")]
pub struct Cli {
    /// Workflow name (looked up under PFLOW_HOME/workflows) or a path to a
    /// `.json` IR file. Omit with `--list` to just list saved workflows.
    pub workflow: Option<String>,

    /// `key=value` pairs bound to the workflow's declared inputs. Values
    /// are type-inferred: `true`/`false` -> bool, a bare integer/float ->
    /// number, `null` -> null, anything starting with `{` or `[` -> parsed
    /// as JSON, everything else -> string.
    #[arg(trailing_var_arg = true)]
    pub params: Vec<String>,

    /// Compile and validate only; don't execute any node.
    #[arg(long)]
    pub validate_only: bool,

    /// Emit the full `__execution__` trace after the run.
    #[arg(long)]
    pub trace: bool,

    /// Include source locations and full error chains in failure output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Timeout in seconds. Overrides every node's `__timeout_ms` that
    /// doesn't set its own.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Print outputs even in an interactive terminal (suppresses progress
    /// lines, same as piping stdout).
    #[arg(short = 'p', long)]
    pub print: bool,

    /// `text` (default, human-readable) or `json` (machine-readable,
    /// always non-interactive).
    #[arg(long, default_value = "text")]
    pub output_format: String,

    /// List saved workflows under PFLOW_HOME and exit.
    #[arg(long)]
    pub list: bool,
}

/// Parses one `key=value` CLI argument into a typed JSON value.
pub fn parse_param(raw: &str) -> anyhow::Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("invalid param `{raw}`, expected key=value"))?;
    Ok((key.to_string(), infer_value(value)))
}

fn infer_value(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    if raw.starts_with('{') || raw.starts_with('[') {
        if let Ok(v) = serde_json::from_str(raw) {
            return v;
        }
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::from(f);
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_scalar_types() {
        assert_eq!(infer_value("true"), Value::Bool(true));
        assert_eq!(infer_value("42"), Value::from(42));
        assert_eq!(infer_value("3.14"), Value::from(3.14));
        assert_eq!(infer_value("null"), Value::Null);
        assert_eq!(infer_value("hello"), Value::String("hello".to_string()));
    }

    #[test]
    fn infers_json_containers() {
        assert_eq!(infer_value("{\"a\":1}"), serde_json::json!({"a": 1}));
        assert_eq!(infer_value("[1,2]"), serde_json::json!([1, 2]));
    }

    #[test]
    fn parse_param_splits_on_first_equals() {
        let (k, v) = parse_param("name=hello=world").unwrap();
        assert_eq!(k, "name");
        assert_eq!(v, Value::String("hello=world".to_string()));
    }
}
