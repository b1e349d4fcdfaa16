//! Invocation of external tools.
//!
//! Every collaborator (`conda`, `anaconda`, `tar`) is driven through these two
//! helpers so failures come back as [`ProcessError`] with the command line
//! attached. Values following `-t`/`--token` are masked in that command line.

use std::process::{Command, Output, Stdio};

use crate::error::ProcessError;

/// Longest stderr excerpt kept in a [`ProcessError::Failed`].
const STDERR_TAIL: usize = 2000;

/// Run `cmd` capturing stdout/stderr. A non-zero exit is an error.
pub fn run_captured(cmd: &mut Command) -> Result<Output, ProcessError> {
    let command = describe(cmd);
    let program = program_name(cmd);
    tracing::debug!(command = %command, "running");
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|source| ProcessError::Spawn { program, source })?;
    if !output.status.success() {
        return Err(ProcessError::Failed {
            command,
            status: output.status.to_string(),
            stderr: tail(&String::from_utf8_lossy(&output.stderr)),
        });
    }
    Ok(output)
}

/// Run `cmd` capturing stdout/stderr, leaving the exit status to the caller.
/// Only a failure to launch is an error.
pub fn run_unchecked(cmd: &mut Command) -> Result<Output, ProcessError> {
    let program = program_name(cmd);
    tracing::debug!(command = %describe(cmd), "running");
    cmd.stdin(Stdio::null())
        .output()
        .map_err(|source| ProcessError::Spawn { program, source })
}

/// Run `cmd` with stdout/stderr inherited, for long-running tools whose
/// progress the user should see.
pub fn run_inherited(cmd: &mut Command) -> Result<(), ProcessError> {
    let command = describe(cmd);
    let program = program_name(cmd);
    tracing::debug!(command = %command, "running");
    let status = cmd
        .stdin(Stdio::null())
        .status()
        .map_err(|source| ProcessError::Spawn { program, source })?;
    if !status.success() {
        return Err(ProcessError::Failed {
            command,
            status: status.to_string(),
            stderr: String::new(),
        });
    }
    Ok(())
}

/// Printable command line with secrets masked.
pub fn describe(cmd: &Command) -> String {
    let mut parts = vec![program_name(cmd)];
    let mut mask_next = false;
    for arg in cmd.get_args() {
        let arg = arg.to_string_lossy();
        if mask_next {
            parts.push("***".to_string());
            mask_next = false;
            continue;
        }
        mask_next = arg == "-t" || arg == "--token";
        parts.push(arg.into_owned());
    }
    parts.join(" ")
}

fn program_name(cmd: &Command) -> String {
    cmd.get_program().to_string_lossy().into_owned()
}

fn tail(text: &str) -> String {
    let text = text.trim();
    if text.len() <= STDERR_TAIL {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}
