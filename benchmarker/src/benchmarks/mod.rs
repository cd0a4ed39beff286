//! Benchmark kinds and their construction from configuration

pub mod build;
pub mod compare;
pub mod unit;

pub use build::BenchmarkFactory;
pub use compare::ComparePair;
pub use unit::{BenchmarkUnit, ModeSetup, RunPlan};

use crate::results::{BenchmarkIdentity, ResultFile, ResultStore};
use crate::runner::{Interrupt, RunError, RunOutcome};
use crate::tasks::TaskResult;

/// A configured benchmark, ready to run
#[derive(Debug)]
pub enum Benchmark {
    Unit(BenchmarkUnit),
    Compare(ComparePair),
}

impl Benchmark {
    pub fn identity(&self) -> &BenchmarkIdentity {
        match self {
            Benchmark::Unit(unit) => unit.identity(),
            Benchmark::Compare(pair) => pair.identity(),
        }
    }

    pub fn name(&self) -> &str {
        &self.identity().name
    }

    pub async fn run_pre_tasks(&self) -> TaskResult<()> {
        match self {
            Benchmark::Unit(unit) => unit.run_pre_tasks().await,
            Benchmark::Compare(pair) => pair.run_pre_tasks().await,
        }
    }

    pub async fn run_post_tasks(&self) -> TaskResult<()> {
        match self {
            Benchmark::Unit(unit) => unit.run_post_tasks().await,
            Benchmark::Compare(pair) => pair.run_post_tasks().await,
        }
    }

    pub async fn run(&mut self, interrupt: &Interrupt) -> Result<RunOutcome, RunError> {
        match self {
            Benchmark::Unit(unit) => unit.run(interrupt).await,
            Benchmark::Compare(pair) => pair.run(interrupt).await,
        }
    }

    /// Files to write, keyed by file name
    pub fn result_files(&self) -> Vec<(String, ResultFile)> {
        match self {
            Benchmark::Unit(unit) => vec![(unit.identity().result_file_name(), unit.result_file())],
            Benchmark::Compare(pair) => pair.result_files(),
        }
    }

    /// Every result store with the identity it belongs to
    pub fn result_sets(&self) -> Vec<(&BenchmarkIdentity, &ResultStore)> {
        match self {
            Benchmark::Unit(unit) => vec![(unit.identity(), unit.results())],
            Benchmark::Compare(pair) => vec![
                (pair.bench_a().identity(), pair.bench_a().results()),
                (pair.bench_b().identity(), pair.bench_b().results()),
            ],
        }
    }
}
