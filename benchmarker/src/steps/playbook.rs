//! Step running a playbook and timing it

use std::collections::BTreeMap;
use std::time::Instant;

use async_trait::async_trait;

use super::{StepAction, StepContext};
use crate::results::RunResult;
use crate::tasks::Playbook;

/// Runs a playbook at the step's destination; metric `runtime_in_s`
#[derive(Debug, Clone)]
pub struct PlaybookStep {
    name: String,
    playbook: Playbook,
    extra_vars: BTreeMap<String, String>,
}

impl PlaybookStep {
    pub fn new(playbook: Playbook) -> Self {
        Self {
            name: playbook.stem(),
            playbook,
            extra_vars: BTreeMap::new(),
        }
    }

    pub fn with_extra_vars(mut self, extra_vars: BTreeMap<String, String>) -> Self {
        self.extra_vars = extra_vars;
        self
    }
}

#[async_trait]
impl StepAction for PlaybookStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &StepContext) -> RunResult {
        let mut vars = self.extra_vars.clone();
        vars.extend(ctx.vars.iter().map(|(k, v)| (k.clone(), v.clone())));

        let start = Instant::now();
        match self.playbook.run_at(&ctx.destination, &vars).await {
            Ok(()) => {
                let runtime = start.elapsed().as_secs_f64();
                tracing::info!("Run took {:.1} s", runtime);
                RunResult::success().with_metric("runtime_in_s", runtime)
            }
            Err(e) => {
                tracing::error!("{} failed at {}: {}", self.name, ctx.destination, e);
                RunResult::failure(e.to_string())
            }
        }
    }
}
