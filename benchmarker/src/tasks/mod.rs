//! Auxiliary actions: pre/post hooks, run-mode prerequisites and background tasks

pub mod command;
pub mod playbook;
pub(crate) mod process;

pub use command::{CommandTask, ShellCommand};
pub use playbook::{Playbook, PlaybookTask};

use async_trait::async_trait;

use crate::destination::Destination;

/// Error types for task execution
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{name}' exited with {status}")]
    Failed { name: String, status: String },

    #[error("'destinations' is required when task '{0}' is executed through run()")]
    NoDestinations(String),
}

pub type TaskResult<T> = Result<T, TaskError>;

/// An opaque action; only "succeeded or raised" is observed
#[async_trait]
pub trait Task: Send + Sync + std::fmt::Debug {
    /// Display name used in logs
    fn name(&self) -> &str;

    /// Destinations used by [`Task::run`]
    fn destinations(&self) -> &[Destination];

    /// Run against one explicit destination
    async fn run_at(&self, destination: &Destination) -> TaskResult<()>;

    /// Run against every configured destination, in order
    async fn run(&self) -> TaskResult<()> {
        let destinations = self.destinations();
        if destinations.is_empty() {
            return Err(TaskError::NoDestinations(self.name().to_string()));
        }
        for destination in destinations {
            self.run_at(destination).await?;
        }
        Ok(())
    }
}
