//! Rate-driven concurrent launch of repetitions

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::{BackgroundScheduler, BackgroundTask, Executor, RepetitionOutcome, RunOutcome};
use crate::results::RunResult;
use crate::steps::{StepAction, StepContext};
use crate::tasks::TaskResult;

const TICK: Duration = Duration::from_secs(1);

/// Slack for rates that are not exact in binary, e.g. ten ticks of 0.1
const RATE_EPSILON: f64 = 1e-9;

/// Launch accounting for a burst.
///
/// Every tick accrues `rate` launches; whole launches are issued once at
/// least one is owed, and the fractional remainder is dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct BurstPlan {
    target: usize,
    rate: f64,
    total_runs: usize,
    next_runs: f64,
}

impl BurstPlan {
    pub fn new(target: usize, rate: f64) -> Self {
        Self {
            target,
            rate,
            total_runs: 0,
            next_runs: 0.0,
        }
    }

    /// Advance one tick and return the slots to launch
    pub fn tick(&mut self) -> Range<usize> {
        self.next_runs += self.rate;
        if self.next_runs + RATE_EPSILON < 1.0 {
            return self.total_runs..self.total_runs;
        }

        let remaining = self.target.saturating_sub(self.total_runs) as f64;
        if self.next_runs >= remaining {
            self.next_runs = remaining;
        }

        let launch = (self.next_runs + RATE_EPSILON).floor() as usize;
        let slots = self.total_runs..self.total_runs + launch;
        self.total_runs += launch;
        self.next_runs = 0.0;
        slots
    }

    pub fn is_complete(&self) -> bool {
        self.total_runs >= self.target
    }

    pub fn total_runs(&self) -> usize {
        self.total_runs
    }

    pub fn target(&self) -> usize {
        self.target
    }
}

type WorkerHandle = JoinHandle<(usize, TaskResult<RepetitionOutcome>)>;

/// Launch the repetitions of `plan` as concurrent workers.
///
/// Each worker runs one non-warm-up repetition and writes its result into
/// its own slot; results come back in slot order. Background tasks run
/// until every launched worker has been joined.
pub async fn run_burst(
    executor: &Executor,
    step: Arc<dyn StepAction>,
    ctx: &StepContext,
    mut plan: BurstPlan,
    background: &[BackgroundTask],
) -> (Vec<RunResult>, RunOutcome) {
    let (stop_tx, stop_rx) = watch::channel(false);
    let scheduler = if background.is_empty() {
        None
    } else {
        Some(tokio::spawn(
            BackgroundScheduler::new(background.to_vec()).run(stop_rx),
        ))
    };

    let mut outcome = RunOutcome::Completed;
    let mut workers: Vec<WorkerHandle> = Vec::with_capacity(plan.target());

    while !plan.is_complete() {
        if executor.is_interrupted() {
            tracing::warn!(
                "Interrupted after launching {} of {} workers",
                plan.total_runs(),
                plan.target()
            );
            outcome = RunOutcome::Interrupted;
            break;
        }

        for slot in plan.tick() {
            tracing::info!("Running with worker id {}", slot);
            let executor = executor.clone();
            let step = step.clone();
            let ctx = ctx.at_repetition(slot);
            workers.push(tokio::spawn(async move {
                let outcome = executor.execute(step.as_ref(), &ctx, None, false).await;
                (slot, outcome)
            }));
        }

        sleep(TICK).await;
    }

    let mut slots: Vec<Option<RunResult>> = vec![None; plan.target()];
    let launched = workers.len();
    for (finished, worker) in workers.into_iter().enumerate() {
        match worker.await {
            Ok((slot, Ok(RepetitionOutcome::Succeeded(result)))) => {
                assert!(slots[slot].is_none(), "burst slot {} written twice", slot);
                slots[slot] = Some(result);
            }
            Ok((_, Ok(RepetitionOutcome::Abandoned))) => {}
            Ok((_, Ok(RepetitionOutcome::Interrupted))) => outcome = RunOutcome::Interrupted,
            Ok((slot, Err(e))) => tracing::error!("Worker {} failed: {}", slot, e),
            Err(e) => tracing::error!("Worker panicked: {}", e),
        }
        tracing::info!("{} out of {} workers are finished.", finished + 1, launched);
    }

    stop_tx.send_replace(true);
    if let Some(scheduler) = scheduler {
        if let Err(e) = scheduler.await {
            tracing::error!("Background scheduler panicked: {}", e);
        }
    }

    (slots.into_iter().flatten().collect(), outcome)
}
