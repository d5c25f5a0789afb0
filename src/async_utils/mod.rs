//! Helpers for running external tools under Tokio, and for async file I/O.

use std::{ffi::OsStr, process::Output, sync::LazyLock};

use regex::Regex;
use tokio::process::Command;

use crate::prelude::*;

pub mod io;

/// A default error regex for checking command output.
pub static DEFAULT_ERROR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error").expect("failed to compile regex"));

/// Run an external command to completion and capture its output.
///
/// Failing to start the command at all (usually because it isn't installed)
/// is reported with the command name, so users know what to install.
#[instrument(level = "debug", skip_all, fields(command = %program))]
pub async fn run_command<I, S>(program: &str, args: I) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(program)
        .args(args)
        .output()
        .await
        .with_context(|| format!("failed to run {program} (is it installed?)"))
}

/// Report any command failures, and include any error output.
///
/// Standard output and standard error are logged. Standard error may be
/// optionally checked with `is_error_line` to decide whether a command that
/// exited successfully actually failed.
pub fn check_for_command_failure(
    command_name: &str,
    output: &Output,
    is_error_line: Option<&dyn Fn(&str) -> bool>,
) -> Result<()> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    trace!(
        command_name = command_name,
        output = %stdout,
        "Standard output from command"
    );
    if !stderr.trim().is_empty() {
        debug!(
            command_name = command_name,
            output = %stderr,
            "Standard error from command",
        );
    }

    if output.status.success() {
        if let Some(is_error_line) = is_error_line
            && stderr.lines().any(is_error_line)
        {
            return Err(anyhow!(
                "{} printed error output:\n{}",
                command_name,
                stderr,
            ));
        }
        Ok(())
    } else if let Some(exit_code) = output.status.code() {
        Err(anyhow!(
            "{} failed with exit code {} and error output:\n{}",
            command_name,
            exit_code,
            stderr,
        ))
    } else {
        Err(anyhow!(
            "{} failed with error output:\n{}",
            command_name,
            stderr,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::{os::unix::process::ExitStatusExt as _, process::ExitStatus};

    use super::*;

    fn output(code: i32, stderr: &str) -> Output {
        Output {
            status: ExitStatus::from_raw(code << 8),
            stdout: vec![],
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[test]
    fn nonzero_exit_is_a_failure() {
        let err = check_for_command_failure("pdfinfo", &output(1, "oops"), None)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("pdfinfo failed with exit code 1"));
        assert!(msg.contains("oops"));
    }

    #[test]
    fn error_lines_fail_a_successful_command() {
        let is_error = |line: &str| DEFAULT_ERROR_REGEX.is_match(line);
        assert!(
            check_for_command_failure("pdftocairo", &output(0, "Error: bad"), Some(&is_error))
                .is_err()
        );
        assert!(
            check_for_command_failure("pdftocairo", &output(0, "fine"), Some(&is_error))
                .is_ok()
        );
    }

    #[tokio::test]
    async fn missing_program_names_the_program() {
        let err = run_command("definitely-not-a-real-program-xyz", ["--version"])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("definitely-not-a-real-program-xyz"));
    }
}
