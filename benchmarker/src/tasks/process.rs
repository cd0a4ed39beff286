//! Child process execution with captured output

use std::process::{Output, Stdio};

use tokio::process::Command;

use super::TaskError;

/// Run `command` to completion, logging its output on failure
pub(crate) async fn run_captured(
    mut command: Command,
    name: &str,
    log_output: bool,
) -> Result<Output, TaskError> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    tracing::debug!("Run {}: {:?}", name, command.as_std());

    let output = command
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| TaskError::Spawn { program, source })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if log_output {
        for line in stdout.lines() {
            tracing::info!("{}", line);
        }
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stdout.lines().chain(stderr.lines()) {
            tracing::error!("{}", line);
        }
        return Err(TaskError::Failed {
            name: name.to_string(),
            status: output.status.to_string(),
        });
    }

    Ok(output)
}
