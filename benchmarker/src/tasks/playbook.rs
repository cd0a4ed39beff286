//! ansible-playbook invocation

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use super::process::run_captured;
use super::{Task, TaskResult};
use crate::config::ConfigError;
use crate::destination::Destination;

/// A playbook file on disk
#[derive(Debug, Clone)]
pub struct Playbook {
    path: PathBuf,
    log_output: bool,
}

impl Playbook {
    /// Locate `name` inside `folder`; the file must exist
    pub fn locate(folder: impl AsRef<Path>, name: &str) -> Result<Self, ConfigError> {
        if name.is_empty() {
            return Err(ConfigError::Invalid("'playbook' must not be empty".to_string()));
        }
        let path = folder.as_ref().join(name);
        if !path.is_file() {
            return Err(ConfigError::Invalid(format!(
                "playbook '{}' is not a valid file",
                path.display()
            )));
        }
        Ok(Self {
            path,
            log_output: false,
        })
    }

    /// Echo playbook output at info level
    pub fn with_log_output(mut self, log_output: bool) -> Self {
        self.log_output = log_output;
        self
    }

    /// Short name derived from the file stem
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub(crate) fn command(&self, destination: &Destination, extra_vars: &BTreeMap<String, String>) -> Command {
        let mut command = Command::new("ansible-playbook");
        command.arg(&self.path).arg("-i").arg(format!("{},", destination.host));

        if let Some(ref user) = destination.user {
            command.arg("-u").arg(user);
        }
        if let Some(ref key) = destination.private_key {
            command.arg("--private-key").arg(key);
        }
        for (key, value) in extra_vars {
            command.arg("-e").arg(format!("{}={}", key, value));
        }
        command
    }

    /// Run the playbook against one destination
    pub async fn run_at(&self, destination: &Destination, extra_vars: &BTreeMap<String, String>) -> TaskResult<()> {
        let name = format!("{} at {}", self.stem(), destination);
        run_captured(self.command(destination, extra_vars), &name, self.log_output).await?;
        Ok(())
    }
}

/// Task running a playbook with fixed extra variables
#[derive(Debug, Clone)]
pub struct PlaybookTask {
    name: String,
    playbook: Playbook,
    destinations: Vec<Destination>,
    extra_vars: BTreeMap<String, String>,
}

impl PlaybookTask {
    pub fn new(name: impl Into<String>, playbook: Playbook) -> Self {
        Self {
            name: name.into(),
            playbook,
            destinations: Vec::new(),
            extra_vars: BTreeMap::new(),
        }
    }

    pub fn with_destinations(mut self, destinations: Vec<Destination>) -> Self {
        self.destinations = destinations;
        self
    }

    pub fn with_extra_vars(mut self, extra_vars: BTreeMap<String, String>) -> Self {
        self.extra_vars = extra_vars;
        self
    }
}

#[async_trait]
impl Task for PlaybookTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn destinations(&self) -> &[Destination] {
        &self.destinations
    }

    async fn run_at(&self, destination: &Destination) -> TaskResult<()> {
        tracing::info!("Running task {} at {}", self.name, destination);
        self.playbook.run_at(destination, &self.extra_vars).await
    }
}
