//! One labelled series of repetitions, with the optional warm-up run

use super::{Executor, RepetitionOutcome, RunOutcome};
use crate::results::RunResult;
use crate::steps::{StepAction, StepContext};
use crate::tasks::{Task, TaskResult};

/// Parameters of one series
pub struct Series<'a> {
    pub ctx: StepContext,
    /// Run one extra, discarded iteration first
    pub warmup: bool,
    /// Executed before every non-warm-up attempt
    pub prerequisite: Option<&'a dyn Task>,
}

impl<'a> Series<'a> {
    pub fn new(ctx: StepContext) -> Self {
        Self {
            ctx,
            warmup: false,
            prerequisite: None,
        }
    }

    pub fn with_warmup(mut self, warmup: bool) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn with_prerequisite(mut self, prerequisite: Option<&'a dyn Task>) -> Self {
        self.prerequisite = prerequisite;
        self
    }
}

/// Run `repetitions` measured iterations of `step`, appending successes to `results`.
///
/// With warm-up enabled the first iteration is executed as well but never
/// recorded. Results gathered before an interrupt stay in `results`.
pub async fn run_series(
    executor: &Executor,
    step: &dyn StepAction,
    repetitions: usize,
    series: Series<'_>,
    results: &mut Vec<RunResult>,
) -> TaskResult<RunOutcome> {
    let offset = usize::from(series.warmup);
    let total = repetitions + offset;

    for i in 0..total {
        if executor.is_interrupted() {
            tracing::warn!("Interrupted during series {}", series.ctx.label);
            return Ok(RunOutcome::Interrupted);
        }

        let warmup = series.warmup && i == 0;
        if warmup {
            tracing::info!("First run! Warming up. Results won't be considered");
        } else {
            tracing::info!("Run {} of {}", i + 1 - offset, repetitions);
        }

        let ctx = series.ctx.at_repetition(i);
        let prerequisite = if warmup { None } else { series.prerequisite };
        match executor.execute(step, &ctx, prerequisite, warmup).await? {
            RepetitionOutcome::Succeeded(result) => {
                if !warmup {
                    results.push(result);
                }
            }
            RepetitionOutcome::Abandoned => {}
            RepetitionOutcome::Interrupted => return Ok(RunOutcome::Interrupted),
        }
    }

    Ok(RunOutcome::Completed)
}
