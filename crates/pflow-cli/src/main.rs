//! `pflow`: compiles and runs a workflow IR document.

mod args;
mod output;
mod stdin;

use args::Cli;
use clap::{CommandFactory, Parser};
use pflow_core::compiler;
use pflow_core::error::{InfraError, PflowError};
use pflow_core::ir::WorkflowIr;
use pflow_core::{config, executor, lifecycle, nodes};
use serde_json::Map;
use std::path::Path;
use tracing::{info, instrument};

/// Usage errors (bad arguments, missing workflow name) exit 64, following
/// the BSD sysexits convention.
const EX_USAGE: i32 = 64;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            e.print().ok();
            std::process::exit(EX_USAGE);
        }
    };

    init_tracing(cli.verbose);

    let runtime = tokio::runtime::Runtime::new().expect("failed to start async runtime");
    let exit_code = runtime.block_on(run(cli));
    info!(exit_code, "pflow exiting");
    std::process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[instrument(skip(cli))]
async fn run(cli: Cli) -> i32 {
    if cli.list {
        return list_workflows();
    }

    let Some(workflow_arg) = cli.workflow.clone() else {
        Cli::command().print_help().ok();
        eprintln!();
        return EX_USAGE;
    };

    match execute_workflow(&cli, &workflow_arg).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err, cli.verbose);
            err.exit_code()
        }
    }
}

fn list_workflows() -> i32 {
    match config::list_workflows() {
        Ok(names) => {
            for name in names {
                println!("{name}");
            }
            0
        }
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}

fn report_error(err: &PflowError, verbose: bool) {
    if verbose {
        eprintln!("error: {err:?}");
    } else {
        eprintln!("error: {err}");
    }
}

fn load_ir(workflow_arg: &str) -> Result<WorkflowIr, PflowError> {
    let path = Path::new(workflow_arg);
    let text = if workflow_arg.ends_with(".json") && path.exists() {
        std::fs::read_to_string(path).map_err(|source| InfraError::ReadFile {
            path: workflow_arg.to_string(),
            source,
        })?
    } else {
        config::read_workflow(workflow_arg)?
    };
    Ok(WorkflowIr::from_json(&text).map_err(InfraError::from)?)
}

/// Applies `--timeout` (given in seconds) to every node that doesn't
/// already declare its own `__timeout_ms`.
fn apply_timeout_override(ir: &mut WorkflowIr, timeout_secs: u64) {
    let timeout_ms = timeout_secs.saturating_mul(1000);
    for node in &mut ir.nodes {
        if let Some(obj) = node.params.as_object_mut() {
            obj.entry(pflow_core::ir::reserved_params::TIMEOUT_MS.to_string())
                .or_insert_with(|| serde_json::Value::from(timeout_ms));
        }
    }
}

async fn execute_workflow(cli: &Cli, workflow_arg: &str) -> Result<i32, PflowError> {
    let mut ir = load_ir(workflow_arg)?;
    if let Some(timeout_secs) = cli.timeout {
        apply_timeout_override(&mut ir, timeout_secs);
    }

    let mut registry = pflow_core::registry::NodeRegistry::new();
    nodes::register_builtins(&mut registry);

    let settings = config::Settings::load(&config::settings_file())?;
    let graph = compiler::compile_with_settings(ir, &registry, Some(&settings))?;

    if cli.validate_only {
        eprintln!("workflow is valid");
        return Ok(0);
    }

    let mut supplied: Map<String, serde_json::Value> = Map::new();
    for raw in &cli.params {
        let (key, value) = args::parse_param(raw).map_err(PflowError::Internal)?;
        supplied.insert(key, value);
    }
    stdin::route(&graph.ir, &mut supplied)?;

    let interactive = output::is_interactive(cli.print, &cli.output_format);
    let progress: Option<&lifecycle::ProgressCallback> = if interactive {
        Some(&output::print_progress)
    } else {
        None
    };

    let outcome = executor::execute(&graph, supplied, 0, progress).await?;

    output::render_outputs(&outcome.outputs, &cli.output_format);
    if cli.trace {
        output::print_trace(outcome.store.read_reserved("__execution__"));
    }

    Ok(0)
}
