//! Stdin router.
//!
//! At most one declared input may set `"stdin": true`. If stdin is piped
//! (not a terminal) and that input wasn't also supplied as a CLI
//! `key=value`, its value is read from stdin; a CLI-supplied value always
//! wins over a piped one.
//!
//! A real FIFO pipe is safe to block-read since the writer end is known to
//! exist and will close, but a non-TTY stdin that's actually a socket (or
//! otherwise never closes) must not be blanket-blocked on, or embedded
//! callers would hang forever. We block unconditionally only on a
//! confirmed FIFO; anything else piped gets a bounded read so a
//! stuck/idle fd can't wedge the CLI.

use pflow_core::error::UserError;
use pflow_core::ir::WorkflowIr;
use serde_json::{Map, Value};
use std::io::{IsTerminal, Read};
use std::time::Duration;

/// How long a non-FIFO piped stdin (socket, or anything `/proc` can't
/// classify) gets to produce its first byte before routing gives up and
/// treats the input as absent.
const NONBLOCKING_READ_DEADLINE: Duration = Duration::from_millis(200);

#[cfg(target_os = "linux")]
fn stdin_is_fifo() -> bool {
    use std::os::unix::fs::FileTypeExt;
    std::fs::metadata("/proc/self/fd/0")
        .map(|m| m.file_type().is_fifo())
        .unwrap_or(false)
}

#[cfg(not(target_os = "linux"))]
fn stdin_is_fifo() -> bool {
    false
}

fn read_all_blocking() -> Option<String> {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf).ok().map(|_| buf)
}

/// Emulates a readiness check with a short deadline: std has no portable
/// `poll(fd, timeout=0)`, so a dedicated thread does the blocking read and
/// the caller only waits up to `deadline`. If nothing arrives in time, the
/// thread is abandoned rather than joined, following the same "never block
/// shutdown on a stuck read" discipline timeouts follow elsewhere in the
/// runtime.
fn read_all_with_deadline(deadline: Duration) -> Option<String> {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(read_all_blocking());
    });
    rx.recv_timeout(deadline).ok().flatten()
}

/// Finds the workflow's declared stdin target, if any, erroring on more
/// than one.
fn stdin_target(ir: &WorkflowIr) -> Result<Option<String>, UserError> {
    let targets: Vec<String> = ir
        .inputs
        .iter()
        .filter(|(_, spec)| spec.stdin)
        .map(|(name, _)| name.clone())
        .collect();
    match targets.len() {
        0 => Ok(None),
        1 => Ok(Some(targets.into_iter().next().unwrap())),
        _ => Err(UserError::MultipleStdinInputs(targets)),
    }
}

/// Routes piped stdin into `supplied` under the declared stdin input's
/// name, unless a CLI value already claimed that key or stdin isn't piped.
pub fn route(ir: &WorkflowIr, supplied: &mut Map<String, Value>) -> Result<(), UserError> {
    let Some(target) = stdin_target(ir)? else {
        return Ok(());
    };
    if supplied.contains_key(&target) {
        return Ok(());
    }
    if std::io::stdin().is_terminal() {
        return Ok(());
    }

    let content = if stdin_is_fifo() {
        read_all_blocking()
    } else {
        read_all_with_deadline(NONBLOCKING_READ_DEADLINE)
    };

    if let Some(buf) = content {
        let trimmed = buf.trim_end_matches('\n').to_string();
        supplied.insert(target, Value::String(trimmed));
    }
    Ok(())
}
