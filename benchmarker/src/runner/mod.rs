//! Execution and scheduling engine

pub mod background;
pub mod burst;
pub mod executor;
pub mod interleave;
pub mod interrupt;
pub mod series;

pub use background::{BackgroundScheduler, BackgroundTask};
pub use burst::{run_burst, BurstPlan};
pub use executor::{Executor, RepetitionOutcome, RetryPolicy};
pub use interleave::{InterleaveBarrier, InterleavedStep};
pub use interrupt::{Interrupt, InterruptHandle};
pub use series::{run_series, Series};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::tasks::TaskError;

/// Cache state a series runs under
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Cold,
    #[default]
    Warm,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Cold => "cold",
            RunMode::Warm => "warm",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cold" => Ok(RunMode::Cold),
            "warm" => Ok(RunMode::Warm),
            _ => Err(ConfigError::Invalid(format!("unknown run mode '{}'", s))),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Stopped at a safe point; results collected so far are kept
    Interrupted,
}

/// Errors that abort a benchmark run
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("prerequisite failed: {0}")]
    Prerequisite(#[from] TaskError),

    #[error("benchmark {name} failed: {source}")]
    Side {
        name: String,
        #[source]
        source: Box<RunError>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_mode_parsing() {
        assert_eq!("Cold".parse::<RunMode>().unwrap(), RunMode::Cold);
        assert_eq!("warm".parse::<RunMode>().unwrap(), RunMode::Warm);
        assert!("lukewarm".parse::<RunMode>().is_err());
    }
}
