//! Benchmark orchestration harness
//!
//! This crate runs reproducible benchmarks of an externally defined step
//! against remote destinations and hands the collected results to a set of
//! sinks.
//!
//! # Features
//!
//! - Sequential series per destination, run mode or swept parameter
//! - Optional warm-up repetition and prerequisite tasks per run mode
//! - Retry with exponential backoff for failing steps
//! - Rate-driven bursts of concurrent repetitions with background tasks
//! - Strictly alternating comparison of two benchmarks
//! - JSON result files, console summary and InfluxDB line protocol
//!
//! # Example
//!
//! ```no_run
//! use benchmarker::{
//!     benchmarker::{Benchmarker, Phases},
//!     config::GlobalConfig,
//!     runner::Interrupt,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GlobalConfig::from_file("benchmarks.toml")?;
//!     let mut benchmarker = Benchmarker::from_config(&config)?;
//!
//!     let (_handle, interrupt) = Interrupt::channel();
//!     let summary = benchmarker.run(Phases::default(), &[], &interrupt).await;
//!     println!("{} benchmarks executed", summary.executed);
//!     Ok(())
//! }
//! ```

pub mod benchmarker;
pub mod benchmarks;
pub mod config;
pub mod destination;
pub mod reporting;
pub mod results;
pub mod runner;
pub mod steps;
pub mod tasks;

pub use config::{ConfigError, GlobalConfig};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::benchmarker::{Benchmarker, Phases, RunSummary};
    pub use crate::benchmarks::{Benchmark, BenchmarkFactory, BenchmarkUnit, ComparePair, ModeSetup, RunPlan};
    pub use crate::config::{ConfigError, GlobalConfig};
    pub use crate::destination::Destination;
    pub use crate::reporting::{print_console_report, summarize};
    pub use crate::results::{
        BenchmarkIdentity, BenchmarkKind, InfluxDbSink, MetricValue, ResultFile, ResultStore,
        RunResult, RunStatus, TimeSeriesSink,
    };
    pub use crate::runner::{
        BackgroundTask, BurstPlan, Interrupt, RetryPolicy, RunError, RunMode, RunOutcome,
    };
    pub use crate::steps::{CommandStep, PlaybookStep, StepAction, StepContext};
    pub use crate::tasks::{CommandTask, PlaybookTask, Task, TaskError};
}
