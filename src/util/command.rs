//! External command execution.

use crate::error::{Error, Result};
use std::process::Command;

/// Run `program` with `args` to completion and return its stdout.
///
/// A spawn failure or a non-zero exit becomes [`Error::CommandFailed`]
/// carrying the command line and the trimmed stderr.
pub fn run_command(program: &str, args: &[&str]) -> Result<Vec<u8>> {
    let command = format!("{} {}", program, args.join(" "));
    tracing::trace!(command = %command, "running");

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| Error::command_failed(&command, e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::command_failed(command, stderr.trim()));
    }
    Ok(output.stdout)
}
