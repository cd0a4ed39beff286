//! Local shell commands

use std::collections::BTreeMap;
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;

use super::process::run_captured;
use super::{Task, TaskResult};
use crate::destination::Destination;

/// A command line executed through `sh -c`
#[derive(Debug, Clone)]
pub struct ShellCommand {
    command: String,
    log_output: bool,
}

impl ShellCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            log_output: false,
        }
    }

    pub fn with_log_output(mut self, log_output: bool) -> Self {
        self.log_output = log_output;
        self
    }

    pub fn as_str(&self) -> &str {
        &self.command
    }

    pub(crate) fn command(&self, destination: Option<&Destination>, vars: &BTreeMap<String, String>) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(&self.command);
        if let Some(destination) = destination {
            command.envs(destination.env_vars());
        }
        command.envs(vars);
        command
    }

    /// Run to completion; a non-zero exit is an error
    pub async fn run(&self, destination: Option<&Destination>, vars: &BTreeMap<String, String>) -> TaskResult<Output> {
        run_captured(self.command(destination, vars), &self.command, self.log_output).await
    }
}

/// Task running a shell command, optionally once per destination
#[derive(Debug, Clone)]
pub struct CommandTask {
    name: String,
    command: ShellCommand,
    destinations: Vec<Destination>,
}

impl CommandTask {
    pub fn new(name: impl Into<String>, command: ShellCommand) -> Self {
        Self {
            name: name.into(),
            command,
            destinations: Vec::new(),
        }
    }

    pub fn with_destinations(mut self, destinations: Vec<Destination>) -> Self {
        self.destinations = destinations;
        self
    }
}

#[async_trait]
impl Task for CommandTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn destinations(&self) -> &[Destination] {
        &self.destinations
    }

    async fn run_at(&self, destination: &Destination) -> TaskResult<()> {
        tracing::info!("Running task {} at {}", self.name, destination);
        self.command.run(Some(destination), &BTreeMap::new()).await?;
        Ok(())
    }

    /// Without destinations the command runs once, locally
    async fn run(&self) -> TaskResult<()> {
        if self.destinations.is_empty() {
            tracing::info!("Running task {}", self.name);
            self.command.run(None, &BTreeMap::new()).await?;
            return Ok(());
        }
        for destination in &self.destinations {
            self.run_at(destination).await?;
        }
        Ok(())
    }
}
