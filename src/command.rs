//! Running external tools.

use std::process::Output;

use crate::prelude::*;

/// Report any command failures, and include any error output.
///
/// Standard output and standard error are logged at `debug` level only. Some
/// failures are routine for us (asking for a page past the end of a PDF), so
/// it's up to the caller to decide how loudly to report them.
pub fn check_for_command_failure(command_name: &str, output: &Output) -> Result<()> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    trace!(
        command_name = command_name,
        output = %stdout,
        "Standard output from command"
    );
    debug!(
        command_name = command_name,
        output = %stderr,
        "Standard error from command",
    );

    if output.status.success() {
        Ok(())
    } else if let Some(exit_code) = output.status.code() {
        Err(anyhow!(
            "{} failed with exit code {} and error output:\n{}",
            command_name,
            exit_code,
            stderr.trim(),
        ))
    } else {
        Err(anyhow!(
            "{} failed with error output:\n{}",
            command_name,
            stderr.trim(),
        ))
    }
}
