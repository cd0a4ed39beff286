//! A single benchmark: one step repeated over a plan of labelled series

use std::sync::Arc;

use crate::destination::Destination;
use crate::results::{BenchmarkIdentity, BenchmarkKind, ResultFile, ResultStore, Tags};
use crate::runner::{
    run_burst, run_series, BackgroundTask, BurstPlan, Executor, Interrupt, RetryPolicy, RunError,
    RunMode, RunOutcome, Series,
};
use crate::steps::{StepAction, StepContext};
use crate::tasks::{Task, TaskResult};

/// One run mode of a destination plan
#[derive(Debug, Clone)]
pub struct ModeSetup {
    pub mode: RunMode,
    /// Only honoured under [`RunMode::Warm`]
    pub warmup: bool,
    /// Run against the destination before every measured attempt
    pub prerequisite: Option<Arc<dyn Task>>,
}

impl ModeSetup {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            warmup: false,
            prerequisite: None,
        }
    }

    pub fn with_warmup(mut self, warmup: bool) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn with_prerequisite(mut self, prerequisite: Option<Arc<dyn Task>>) -> Self {
        self.prerequisite = prerequisite;
        self
    }

    pub fn warmup_enabled(&self) -> bool {
        self.mode == RunMode::Warm && self.warmup
    }
}

/// Which series a unit runs and how
#[derive(Debug, Clone)]
pub enum RunPlan {
    /// One series per mode and destination, modes outermost
    Destinations {
        destinations: Vec<Destination>,
        modes: Vec<ModeSetup>,
    },
    /// One series per value of a single parameter
    Sweep {
        destination: Destination,
        dim_key: String,
        dim_values: Vec<String>,
    },
    /// All repetitions launched as concurrent workers
    Burst {
        destination: Destination,
        burst_rate: f64,
        background_tasks: Vec<BackgroundTask>,
    },
}

/// A benchmark with its identity, step, hooks and collected results
pub struct BenchmarkUnit {
    identity: BenchmarkIdentity,
    repetitions: usize,
    pre_tasks: Vec<Arc<dyn Task>>,
    post_tasks: Vec<Arc<dyn Task>>,
    step: Arc<dyn StepAction>,
    plan: RunPlan,
    retry: RetryPolicy,
    extra_tags: Tags,
    results: ResultStore,
}

impl BenchmarkUnit {
    pub fn new(
        name: impl Into<String>,
        kind: BenchmarkKind,
        repetitions: usize,
        step: Arc<dyn StepAction>,
        plan: RunPlan,
    ) -> Self {
        Self {
            identity: BenchmarkIdentity::new(name, kind),
            repetitions,
            pre_tasks: Vec::new(),
            post_tasks: Vec::new(),
            step,
            plan,
            retry: RetryPolicy::default(),
            extra_tags: Tags::new(),
            results: ResultStore::new(),
        }
    }

    pub fn with_pre_tasks(mut self, tasks: Vec<Arc<dyn Task>>) -> Self {
        self.pre_tasks = tasks;
        self
    }

    pub fn with_post_tasks(mut self, tasks: Vec<Arc<dyn Task>>) -> Self {
        self.post_tasks = tasks;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Extra tag stored next to the identity tags
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra_tags.insert(key.into(), value.into());
        self
    }

    pub fn identity(&self) -> &BenchmarkIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn kind(&self) -> BenchmarkKind {
        self.identity.kind
    }

    pub fn repetitions(&self) -> usize {
        self.repetitions
    }

    pub fn plan(&self) -> &RunPlan {
        &self.plan
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    pub fn step(&self) -> Arc<dyn StepAction> {
        self.step.clone()
    }

    /// Swap the step action, returning the previous one
    pub fn replace_step(&mut self, step: Arc<dyn StepAction>) -> Arc<dyn StepAction> {
        std::mem::replace(&mut self.step, step)
    }

    pub fn tags(&self) -> Tags {
        let mut tags = self.identity.tags();
        tags.extend(self.extra_tags.clone());
        tags
    }

    pub fn result_file(&self) -> ResultFile {
        ResultFile::new(self.tags(), self.results.clone())
    }

    pub async fn run_pre_tasks(&self) -> TaskResult<()> {
        run_tasks(&self.pre_tasks).await
    }

    pub async fn run_post_tasks(&self) -> TaskResult<()> {
        run_tasks(&self.post_tasks).await
    }

    /// Execute every series of the plan.
    ///
    /// Each series starts from an empty result list under its label, so
    /// re-running a unit replaces earlier results label by label.
    pub async fn run(&mut self, interrupt: &Interrupt) -> Result<RunOutcome, RunError> {
        let executor = Executor::new(self.retry, interrupt.clone());
        let repetitions = self.repetitions;
        let Self {
            plan,
            step,
            results,
            ..
        } = self;

        match plan {
            RunPlan::Destinations {
                destinations,
                modes,
            } => {
                for setup in modes.iter() {
                    for destination in destinations.iter() {
                        let label = if modes.len() > 1 {
                            format!("{}_{}", setup.mode, destination.name)
                        } else {
                            destination.name.clone()
                        };
                        tracing::info!("Running {} against {} ({} mode)", label, destination, setup.mode);

                        let series = Series::new(StepContext::new(destination.clone(), label.as_str()))
                            .with_warmup(setup.warmup_enabled())
                            .with_prerequisite(setup.prerequisite.as_deref());
                        let outcome = run_series(
                            &executor,
                            step.as_ref(),
                            repetitions,
                            series,
                            results.begin_series(label.as_str()),
                        )
                        .await?;
                        if outcome == RunOutcome::Interrupted {
                            return Ok(outcome);
                        }
                    }
                }
            }
            RunPlan::Sweep {
                destination,
                dim_key,
                dim_values,
            } => {
                for value in dim_values.iter() {
                    tracing::info!("Running with {}={}", dim_key, value);
                    let ctx = StepContext::new(destination.clone(), value.as_str())
                        .with_var(dim_key.as_str(), value.as_str());
                    let outcome = run_series(
                        &executor,
                        step.as_ref(),
                        repetitions,
                        Series::new(ctx),
                        results.begin_series(value.as_str()),
                    )
                    .await?;
                    if outcome == RunOutcome::Interrupted {
                        return Ok(outcome);
                    }
                }
            }
            RunPlan::Burst {
                destination,
                burst_rate,
                background_tasks,
            } => {
                let label = destination.name.clone();
                let ctx = StepContext::new(destination.clone(), label.as_str());
                let plan = BurstPlan::new(repetitions, *burst_rate);
                let (collected, outcome) =
                    run_burst(&executor, step.clone(), &ctx, plan, background_tasks).await;
                results.begin_series(label).extend(collected);
                if outcome == RunOutcome::Interrupted {
                    return Ok(outcome);
                }
            }
        }

        Ok(RunOutcome::Completed)
    }
}

impl std::fmt::Debug for BenchmarkUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BenchmarkUnit")
            .field("identity", &self.identity)
            .field("repetitions", &self.repetitions)
            .field("step", &self.step.name())
            .field("plan", &self.plan)
            .finish()
    }
}

async fn run_tasks(tasks: &[Arc<dyn Task>]) -> TaskResult<()> {
    for task in tasks {
        tracing::info!("Running task {}", task.name());
        task.run().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::RunResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct LabelStep {
        calls: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl StepAction for LabelStep {
        fn name(&self) -> &str {
            "label"
        }

        async fn run(&self, ctx: &StepContext) -> RunResult {
            self.calls.lock().unwrap().push((ctx.label.clone(), ctx.repetition));
            let mut result = RunResult::success();
            for (key, value) in &ctx.vars {
                result = result.with_metric(key.as_str(), value.as_str());
            }
            result
        }
    }

    #[derive(Debug, Default)]
    struct CountingTask {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl Task for CountingTask {
        fn name(&self) -> &str {
            "counting"
        }

        fn destinations(&self) -> &[Destination] {
            &[]
        }

        async fn run_at(&self, _destination: &Destination) -> TaskResult<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn nodes() -> Vec<Destination> {
        vec![
            Destination::new("node1", "10.0.0.1"),
            Destination::new("node2", "10.0.0.2"),
        ]
    }

    #[tokio::test]
    async fn test_destination_comparison_labels() {
        let step = Arc::new(LabelStep::default());
        let plan = RunPlan::Destinations {
            destinations: nodes(),
            modes: vec![ModeSetup::new(RunMode::Warm).with_warmup(true)],
        };
        let mut unit = BenchmarkUnit::new("cmp", BenchmarkKind::DestinationComparison, 2, step.clone(), plan);

        let outcome = unit.run(&Interrupt::never()).await.unwrap();

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(unit.results().labels().collect::<Vec<_>>(), vec!["node1", "node2"]);
        assert_eq!(unit.results().series("node1").unwrap().len(), 2);
        // warm-up included
        assert_eq!(step.calls.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_cold_warm_labels_and_prerequisites() {
        let step = Arc::new(LabelStep::default());
        let cold = Arc::new(CountingTask::default());
        let plan = RunPlan::Destinations {
            destinations: nodes(),
            modes: vec![
                ModeSetup::new(RunMode::Cold)
                    .with_warmup(true)
                    .with_prerequisite(Some(cold.clone())),
                ModeSetup::new(RunMode::Warm).with_warmup(true),
            ],
        };
        let mut unit = BenchmarkUnit::new("cw", BenchmarkKind::ColdWarm, 2, step.clone(), plan);

        unit.run(&Interrupt::never()).await.unwrap();

        let labels: Vec<_> = unit.results().labels().collect();
        assert_eq!(labels, vec!["cold_node1", "cold_node2", "warm_node1", "warm_node2"]);
        // cold mode never warms up: 2 + 2 cold, 3 + 3 warm
        assert_eq!(step.calls.lock().unwrap().len(), 10);
        assert_eq!(cold.runs.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_sweep_passes_parameter() {
        let step = Arc::new(LabelStep::default());
        let plan = RunPlan::Sweep {
            destination: Destination::new("node1", "10.0.0.1"),
            dim_key: "blocksize".into(),
            dim_values: vec!["4k".into(), "1M".into()],
        };
        let mut unit = BenchmarkUnit::new("sweep", BenchmarkKind::ParameterSweep, 1, step, plan);

        unit.run(&Interrupt::never()).await.unwrap();

        let series = unit.results().series("1M").unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].metrics["blocksize"], "1M".into());
    }

    #[tokio::test]
    async fn test_rerun_replaces_results() {
        let step = Arc::new(LabelStep::default());
        let plan = RunPlan::Destinations {
            destinations: nodes(),
            modes: vec![ModeSetup::new(RunMode::Warm)],
        };
        let mut unit = BenchmarkUnit::new("cmp", BenchmarkKind::DestinationComparison, 2, step, plan);

        unit.run(&Interrupt::never()).await.unwrap();
        unit.run(&Interrupt::never()).await.unwrap();

        assert_eq!(unit.results().total_results(), 4);
    }

    #[test]
    fn test_tags_include_extras() {
        let plan = RunPlan::Sweep {
            destination: Destination::new("node1", "10.0.0.1"),
            dim_key: "bs".into(),
            dim_values: vec![],
        };
        let unit = BenchmarkUnit::new("sweep", BenchmarkKind::ParameterSweep, 1, Arc::new(LabelStep::default()), plan)
            .with_tag("dim_key", "bs");
        let tags = unit.tags();
        assert_eq!(tags["benchmark_type"], "ParameterSweep");
        assert_eq!(tags["dim_key"], "bs");
    }
}
