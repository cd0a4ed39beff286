//! Retrying executor for a single repetition of a step

use std::time::Duration;

use tokio::time::sleep;

use super::Interrupt;
use crate::results::RunResult;
use crate::steps::{StepAction, StepContext};
use crate::tasks::{Task, TaskResult};

/// Retry policy for failed steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, doubled on every further failure
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay after `failures` failed attempts
    pub fn backoff(&self, failures: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(failures.saturating_sub(1)))
    }
}

/// Final state of one repetition
#[derive(Debug, Clone, PartialEq)]
pub enum RepetitionOutcome {
    Succeeded(RunResult),
    /// Retries exhausted; nothing is recorded
    Abandoned,
    Interrupted,
}

enum RetryState {
    Idle,
    Attempting,
    Backoff(Duration),
    Succeeded(RunResult),
    Abandoned,
}

/// Runs one repetition through the retry state machine
#[derive(Debug, Clone)]
pub struct Executor {
    policy: RetryPolicy,
    interrupt: Interrupt,
}

impl Executor {
    pub fn new(policy: RetryPolicy, interrupt: Interrupt) -> Self {
        Self { policy, interrupt }
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_triggered()
    }

    /// Execute `step` until it succeeds or the retries run out.
    ///
    /// `prerequisite` runs against the step's destination before every
    /// attempt; its failure aborts the repetition with an error. Warm-up
    /// repetitions retry without waiting.
    pub async fn execute(
        &self,
        step: &dyn StepAction,
        ctx: &StepContext,
        prerequisite: Option<&dyn Task>,
        warmup: bool,
    ) -> TaskResult<RepetitionOutcome> {
        let mut failures = 0u32;
        let mut state = RetryState::Idle;

        loop {
            state = match state {
                RetryState::Idle => RetryState::Attempting,
                RetryState::Attempting => {
                    if self.is_interrupted() {
                        return Ok(RepetitionOutcome::Interrupted);
                    }
                    if let Some(task) = prerequisite {
                        tracing::debug!("Running prerequisite {} on {}", task.name(), ctx.destination);
                        task.run_at(&ctx.destination).await?;
                    }

                    let result = step.run(ctx).await;
                    if result.is_success() {
                        RetryState::Succeeded(result)
                    } else if failures >= self.policy.max_retries {
                        RetryState::Abandoned
                    } else {
                        failures += 1;
                        let delay = if warmup {
                            Duration::ZERO
                        } else {
                            self.policy.backoff(failures)
                        };
                        tracing::warn!(
                            "Step {} failed on {} ({}/{} retries), retrying in {}s",
                            step.name(),
                            ctx.destination,
                            failures,
                            self.policy.max_retries,
                            delay.as_secs()
                        );
                        RetryState::Backoff(delay)
                    }
                }
                RetryState::Backoff(delay) => {
                    if !delay.is_zero() {
                        tokio::select! {
                            _ = sleep(delay) => {}
                            _ = self.interrupt.triggered() => {
                                return Ok(RepetitionOutcome::Interrupted);
                            }
                        }
                    }
                    RetryState::Attempting
                }
                RetryState::Succeeded(result) => return Ok(RepetitionOutcome::Succeeded(result)),
                RetryState::Abandoned => {
                    tracing::error!(
                        "Step {} failed on {} after {} retries, skipping repetition",
                        step.name(),
                        ctx.destination,
                        self.policy.max_retries
                    );
                    return Ok(RepetitionOutcome::Abandoned);
                }
            };
        }
    }
}
