//! Output controller.
//!
//! In an interactive terminal, each node prints a one-line progress
//! indicator to stderr as it finishes; piped or `--print`/`--output-format
//! json` runs suppress those lines so stdout stays exactly the rendered
//! outputs. Errors always go to stderr, regardless of mode.

use pflow_core::lifecycle::{ProgressEvent, ProgressPhase};
use serde_json::Value;
use std::io::IsTerminal;

pub fn is_interactive(print_flag: bool, output_format: &str) -> bool {
    std::io::stdin().is_terminal()
        && std::io::stdout().is_terminal()
        && !print_flag
        && output_format != "json"
}

/// Builds the `"{indent}{node_id}... {mark} {duration:.1}s"` progress line
/// and writes it to stderr, indented two spaces per nested-workflow depth.
/// The `start` half of the wrapper carries no duration yet, so only
/// `Complete` renders a line.
pub fn print_progress(event: &ProgressEvent) {
    if event.phase != ProgressPhase::Complete {
        return;
    }
    let indent = "  ".repeat(event.depth as usize);
    let mark = if event.failed { "\u{2717}" } else { "\u{2713}" };
    eprintln!(
        "{indent}{}... {mark} {:.1}s",
        event.node_id, event.duration_secs
    );
}

pub fn render_outputs(outputs: &serde_json::Map<String, Value>, output_format: &str) {
    match output_format {
        "json" => {
            println!("{}", serde_json::to_string(outputs).unwrap_or_default());
        }
        _ => {
            if outputs.len() == 1 {
                let (_, v) = outputs.iter().next().unwrap();
                println!("{}", render_scalar(v));
            } else {
                println!(
                    "{}",
                    serde_json::to_string_pretty(outputs).unwrap_or_default()
                );
            }
        }
    }
}

fn render_scalar(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}

pub fn print_trace(trace: Option<&Value>) {
    if let Some(trace) = trace {
        eprintln!("{}", serde_json::to_string_pretty(trace).unwrap_or_default());
    }
}
