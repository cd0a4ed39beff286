//! Strict alternation of the steps of two concurrently running benchmarks

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::results::RunResult;
use crate::steps::{StepAction, StepContext};

/// Shared lock and condition of an interleaved pair.
///
/// While strict alternation is on, a side that finished a step waits until
/// the other side has run one. Once either side completes its whole run,
/// alternation is released and the survivor continues freely.
#[derive(Debug)]
pub struct InterleaveBarrier {
    strict_alternation: Mutex<bool>,
    condition: Notify,
}

impl Default for InterleaveBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl InterleaveBarrier {
    pub fn new() -> Self {
        Self {
            strict_alternation: Mutex::new(true),
            condition: Notify::new(),
        }
    }

    /// Run `step` holding the lock, then hand over to the other side
    pub async fn alternate<F: Future>(&self, side: &str, step: F) -> F::Output {
        let strict = self.strict_alternation.lock().await;
        tracing::info!("Start run in {}", side);
        let output = step.await;

        self.condition.notify_waiters();
        if *strict {
            let notified = self.condition.notified();
            tokio::pin!(notified);
            // registered before the lock is released so no wake-up is missed
            notified.as_mut().enable();
            drop(strict);
            notified.await;
        }
        output
    }

    /// End strict alternation and wake a waiting side
    pub async fn release(&self) {
        let mut strict = self.strict_alternation.lock().await;
        *strict = false;
        self.condition.notify_waiters();
        tracing::info!("Strict alternation released");
    }
}

/// Step wrapper routing every execution through an [`InterleaveBarrier`]
pub struct InterleavedStep {
    inner: Arc<dyn StepAction>,
    barrier: Arc<InterleaveBarrier>,
    side: String,
}

impl InterleavedStep {
    pub fn new(
        inner: Arc<dyn StepAction>,
        barrier: Arc<InterleaveBarrier>,
        side: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            barrier,
            side: side.into(),
        }
    }
}

#[async_trait]
impl StepAction for InterleavedStep {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn run(&self, ctx: &StepContext) -> RunResult {
        self.barrier.alternate(&self.side, self.inner.run(ctx)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    async fn side(barrier: &InterleaveBarrier, name: &'static str, runs: usize, log: &StdMutex<Vec<&'static str>>) {
        for _ in 0..runs {
            barrier
                .alternate(name, async {
                    log.lock().unwrap().push(name);
                    tokio::task::yield_now().await;
                })
                .await;
        }
        barrier.release().await;
    }

    #[tokio::test]
    async fn test_equal_runs_alternate() {
        let barrier = InterleaveBarrier::new();
        let log = StdMutex::new(Vec::new());

        tokio::join!(side(&barrier, "A", 3, &log), side(&barrier, "B", 3, &log));

        assert_eq!(*log.lock().unwrap(), vec!["A", "B", "A", "B", "A", "B"]);
        assert!(!*barrier.strict_alternation.lock().await);
    }

    #[tokio::test]
    async fn test_longer_side_continues_after_release() {
        let barrier = InterleaveBarrier::new();
        let log = StdMutex::new(Vec::new());

        tokio::join!(side(&barrier, "A", 2, &log), side(&barrier, "B", 4, &log));

        assert_eq!(*log.lock().unwrap(), vec!["A", "B", "A", "B", "B", "B"]);
    }
}
