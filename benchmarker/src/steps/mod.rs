//! Step actions: the single measured execution a benchmark repeats

pub mod command;
pub mod playbook;

pub use command::CommandStep;
pub use playbook::PlaybookStep;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::destination::Destination;
use crate::results::RunResult;

/// Everything a step needs to know about the execution it performs
#[derive(Debug, Clone)]
pub struct StepContext {
    pub destination: Destination,
    /// Run label the result is stored under
    pub label: String,
    /// Zero-based index inside the series (warm-up included) or burst slot
    pub repetition: usize,
    /// Extra variables, e.g. the swept parameter
    pub vars: BTreeMap<String, String>,
}

impl StepContext {
    pub fn new(destination: Destination, label: impl Into<String>) -> Self {
        Self {
            destination,
            label: label.into(),
            repetition: 0,
            vars: BTreeMap::new(),
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn at_repetition(&self, repetition: usize) -> Self {
        Self {
            repetition,
            ..self.clone()
        }
    }
}

/// One externally defined action.
///
/// Implementations never fail: connection or process errors are reported as
/// a `RunResult` with `status: error` so the calling worker keeps running.
#[async_trait]
pub trait StepAction: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &StepContext) -> RunResult;
}
