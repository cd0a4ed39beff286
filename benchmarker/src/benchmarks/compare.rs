//! Two benchmarks run side by side with alternating steps

use std::sync::Arc;

use super::unit::BenchmarkUnit;
use crate::results::{BenchmarkIdentity, BenchmarkKind, ResultFile, Tags};
use crate::runner::{InterleaveBarrier, InterleavedStep, Interrupt, RunError, RunOutcome};
use crate::tasks::TaskResult;

/// A pair of sequential benchmarks whose steps alternate A, B, A, B, ...
#[derive(Debug)]
pub struct ComparePair {
    identity: BenchmarkIdentity,
    bench_a: BenchmarkUnit,
    bench_b: BenchmarkUnit,
}

impl ComparePair {
    pub fn new(name: impl Into<String>, bench_a: BenchmarkUnit, bench_b: BenchmarkUnit) -> Self {
        Self {
            identity: BenchmarkIdentity::new(name, BenchmarkKind::Compare),
            bench_a,
            bench_b,
        }
    }

    pub fn identity(&self) -> &BenchmarkIdentity {
        &self.identity
    }

    pub fn bench_a(&self) -> &BenchmarkUnit {
        &self.bench_a
    }

    pub fn bench_b(&self) -> &BenchmarkUnit {
        &self.bench_b
    }

    pub async fn run_pre_tasks(&self) -> TaskResult<()> {
        self.bench_a.run_pre_tasks().await?;
        self.bench_b.run_pre_tasks().await
    }

    pub async fn run_post_tasks(&self) -> TaskResult<()> {
        self.bench_a.run_post_tasks().await?;
        self.bench_b.run_post_tasks().await
    }

    /// Run both sides concurrently under strict alternation.
    ///
    /// The original steps are restored afterwards.
    pub async fn run(&mut self, interrupt: &Interrupt) -> Result<RunOutcome, RunError> {
        let barrier = Arc::new(InterleaveBarrier::new());
        let step_a = self.bench_a.step();
        let step_b = self.bench_b.step();
        self.bench_a
            .replace_step(Arc::new(InterleavedStep::new(step_a.clone(), barrier.clone(), "A")));
        self.bench_b
            .replace_step(Arc::new(InterleavedStep::new(step_b.clone(), barrier.clone(), "B")));

        let (outcome_a, outcome_b) = tokio::join!(
            run_side(&mut self.bench_a, &barrier, interrupt),
            run_side(&mut self.bench_b, &barrier, interrupt),
        );

        self.bench_a.replace_step(step_a);
        self.bench_b.replace_step(step_b);

        let outcome_a = outcome_a.map_err(|e| side_error(&self.bench_a, e))?;
        let outcome_b = outcome_b.map_err(|e| side_error(&self.bench_b, e))?;
        if outcome_a == RunOutcome::Interrupted || outcome_b == RunOutcome::Interrupted {
            return Ok(RunOutcome::Interrupted);
        }
        Ok(RunOutcome::Completed)
    }

    /// Own tags plus the tags and result files of both sides
    pub fn tags(&self) -> Tags {
        let mut tags = self.identity.tags();
        tags.insert("bench_a".into(), tags_value(self.bench_a.tags()));
        tags.insert("bench_b".into(), tags_value(self.bench_b.tags()));
        tags.insert(
            "bench_a_results".into(),
            self.bench_a.identity().result_file_name().into(),
        );
        tags.insert(
            "bench_b_results".into(),
            self.bench_b.identity().result_file_name().into(),
        );
        tags
    }

    /// The pair's own tags-only file followed by each side's file
    pub fn result_files(&self) -> Vec<(String, ResultFile)> {
        vec![
            (self.identity.result_file_name(), ResultFile::tags_only(self.tags())),
            (self.bench_a.identity().result_file_name(), self.bench_a.result_file()),
            (self.bench_b.identity().result_file_name(), self.bench_b.result_file()),
        ]
    }
}

async fn run_side(
    unit: &mut BenchmarkUnit,
    barrier: &InterleaveBarrier,
    interrupt: &Interrupt,
) -> Result<RunOutcome, RunError> {
    let outcome = unit.run(interrupt).await;
    barrier.release().await;
    outcome
}

fn side_error(unit: &BenchmarkUnit, source: RunError) -> RunError {
    RunError::Side {
        name: unit.name().to_string(),
        source: Box::new(source),
    }
}

fn tags_value(tags: Tags) -> serde_json::Value {
    serde_json::Value::Object(tags.into_iter().collect())
}
