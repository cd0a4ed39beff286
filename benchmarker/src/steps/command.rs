//! Step running a local shell command

use std::time::Instant;

use async_trait::async_trait;

use super::{StepAction, StepContext};
use crate::results::{MetricValue, RunResult};
use crate::tasks::ShellCommand;

/// Runs a shell command with the destination exported; metric `runtime_in_s`.
///
/// With `parse_json` the command's stdout must be a flat JSON object; its
/// scalar values are added as metrics.
#[derive(Debug, Clone)]
pub struct CommandStep {
    command: ShellCommand,
    parse_json: bool,
}

impl CommandStep {
    pub fn new(command: ShellCommand) -> Self {
        Self {
            command,
            parse_json: false,
        }
    }

    pub fn with_json_metrics(mut self, parse_json: bool) -> Self {
        self.parse_json = parse_json;
        self
    }
}

fn parse_metrics(stdout: &[u8], mut result: RunResult) -> RunResult {
    let parsed: serde_json::Value = match serde_json::from_slice(stdout) {
        Ok(v) => v,
        Err(e) => return RunResult::failure(format!("invalid JSON output: {}", e)),
    };
    let Some(object) = parsed.as_object() else {
        return RunResult::failure("JSON output is not an object");
    };
    for (key, value) in object {
        if let Some(metric) = MetricValue::from_json(value) {
            result.metrics.insert(key.clone(), metric);
        }
    }
    result
}

#[async_trait]
impl StepAction for CommandStep {
    fn name(&self) -> &str {
        self.command.as_str()
    }

    async fn run(&self, ctx: &StepContext) -> RunResult {
        let start = Instant::now();
        match self.command.run(Some(&ctx.destination), &ctx.vars).await {
            Ok(output) => {
                let result = RunResult::success().with_metric("runtime_in_s", start.elapsed().as_secs_f64());
                if self.parse_json {
                    parse_metrics(&output.stdout, result)
                } else {
                    result
                }
            }
            Err(e) => {
                tracing::error!("Step failed at {}: {}", ctx.destination, e);
                RunResult::failure(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::Destination;
    use crate::results::RunStatus;

    fn ctx() -> StepContext {
        StepContext::new(Destination::new("local", "localhost"), "local")
    }

    #[tokio::test]
    async fn test_json_metrics_are_merged() {
        let step = CommandStep::new(ShellCommand::new(r#"echo '{"iops": 1200, "bw": 3.5, "tag": "x", "raw": [1]}'"#))
            .with_json_metrics(true);
        let result = step.run(&ctx()).await;
        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.metrics["iops"], MetricValue::Int(1200));
        assert_eq!(result.metrics["bw"], MetricValue::Float(3.5));
        assert!(result.metrics.contains_key("runtime_in_s"));
        assert!(!result.metrics.contains_key("raw"));
    }

    #[tokio::test]
    async fn test_invalid_json_is_an_error_result() {
        let step = CommandStep::new(ShellCommand::new("echo not-json")).with_json_metrics(true);
        assert_eq!(step.run(&ctx()).await.status, RunStatus::Error);
    }

    #[tokio::test]
    async fn test_failing_command_is_an_error_result() {
        let step = CommandStep::new(ShellCommand::new("exit 1"));
        let result = step.run(&ctx()).await;
        assert_eq!(result.status, RunStatus::Error);
        assert!(result.metrics.contains_key("error"));
    }

    #[tokio::test]
    async fn test_vars_are_exported() {
        let step = CommandStep::new(ShellCommand::new(r#"echo "{\"bs\": \"$blocksize\"}""#)).with_json_metrics(true);
        let result = step.run(&ctx().with_var("blocksize", "4k")).await;
        assert_eq!(result.metrics["bs"], MetricValue::Text("4k".into()));
    }
}
