//! Top-level orchestration: pre-tasks, benchmark run, result sinks, post-tasks

use std::path::Path;

use chrono::Utc;

use crate::benchmarks::{Benchmark, BenchmarkFactory};
use crate::config::{BenchmarkerConfig, ConfigError, GlobalConfig};
use crate::reporting::print_console_report;
use crate::results::{InfluxDbSink, TimeSeriesSink};
use crate::runner::{Interrupt, RunOutcome};

/// Which phases of every benchmark are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phases {
    pub pre_tasks: bool,
    pub benchmarks: bool,
    pub post_tasks: bool,
}

impl Default for Phases {
    fn default() -> Self {
        Self {
            pre_tasks: true,
            benchmarks: true,
            post_tasks: true,
        }
    }
}

impl Phases {
    pub fn only_pre_tasks() -> Self {
        Self {
            pre_tasks: true,
            benchmarks: false,
            post_tasks: false,
        }
    }

    pub fn only_benchmarks() -> Self {
        Self {
            pre_tasks: false,
            benchmarks: true,
            post_tasks: false,
        }
    }

    pub fn only_post_tasks() -> Self {
        Self {
            pre_tasks: false,
            benchmarks: false,
            post_tasks: true,
        }
    }
}

/// Counters of one orchestrator run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub executed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub interrupted: bool,
}

/// Runs every configured benchmark in order
pub struct Benchmarker {
    settings: BenchmarkerConfig,
    benchmarks: Vec<Benchmark>,
    sink: Option<Box<dyn TimeSeriesSink>>,
}

impl Benchmarker {
    /// Build every benchmark and prepare the results directory
    pub fn from_config(config: &GlobalConfig) -> Result<Self, ConfigError> {
        let settings = config.settings();
        let benchmarks = BenchmarkFactory::new(config).build_all()?;
        if settings.results_save_to_file {
            prepare_results_dir(&settings.results_path)?;
        }
        let sink = config
            .influxdb
            .clone()
            .map(|influx| Box::new(InfluxDbSink::new(influx)) as Box<dyn TimeSeriesSink>);

        tracing::info!("Configured {} benchmarks", benchmarks.len());
        Ok(Self {
            settings,
            benchmarks,
            sink,
        })
    }

    /// Replace the time-series sink
    pub fn with_sink(mut self, sink: Option<Box<dyn TimeSeriesSink>>) -> Self {
        self.sink = sink;
        self
    }

    pub fn benchmarks(&self) -> &[Benchmark] {
        &self.benchmarks
    }

    /// Run the selected phases of every benchmark matching `filter`.
    ///
    /// A failing benchmark is logged and the next one starts. After an
    /// interrupt the current results are still saved, but post-tasks and
    /// the remaining benchmarks are skipped.
    pub async fn run(&mut self, phases: Phases, filter: &[String], interrupt: &Interrupt) -> RunSummary {
        let Self {
            settings,
            benchmarks,
            sink,
        } = self;
        let mut summary = RunSummary::default();
        let total = benchmarks.len();

        for (i, benchmark) in benchmarks.iter_mut().enumerate() {
            let current_run = format!("({}/{})", i + 1, total);
            if interrupt.is_triggered() {
                summary.interrupted = true;
                break;
            }
            if !filter.is_empty() && !filter.iter().any(|name| name == benchmark.name()) {
                tracing::info!("{} Skipping benchmark {}", current_run, benchmark.name());
                summary.skipped += 1;
                continue;
            }

            summary.executed += 1;
            let mut failed = false;
            let mut interrupted = false;

            if phases.pre_tasks {
                tracing::info!("{} Pre task for {}", current_run, benchmark.name());
                if let Err(e) = benchmark.run_pre_tasks().await {
                    tracing::error!(
                        "{} Pre task for {} failed: {}. Continuing with next benchmark",
                        current_run,
                        benchmark.name(),
                        e
                    );
                    failed = true;
                }
            }

            if phases.benchmarks && !failed {
                tracing::info!("{} Start run for {}", current_run, benchmark.name());
                match benchmark.run(interrupt).await {
                    Ok(RunOutcome::Completed) => {}
                    Ok(RunOutcome::Interrupted) => interrupted = true,
                    Err(e) => {
                        tracing::error!(
                            "{} Benchmark run failed: {}. Continuing with next benchmark",
                            current_run,
                            e
                        );
                        failed = true;
                    }
                }
                save_results(settings, sink.as_deref(), benchmark).await;
            }

            if failed {
                summary.failed += 1;
            }
            if interrupted {
                tracing::warn!("{} Interrupted, skipping post tasks and remaining benchmarks", current_run);
                summary.interrupted = true;
                break;
            }

            if phases.post_tasks {
                tracing::info!("{} Post task for {}", current_run, benchmark.name());
                if let Err(e) = benchmark.run_post_tasks().await {
                    tracing::error!("{} Post task for {} failed: {}", current_run, benchmark.name(), e);
                }
            }

            tracing::info!("{} Finished benchmark run at {}", current_run, Utc::now().to_rfc3339());
        }

        summary
    }
}

fn prepare_results_dir(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        if !path.is_dir() {
            return Err(ConfigError::Invalid(format!(
                "results_path '{}' is not a directory",
                path.display()
            )));
        }
        return Ok(());
    }
    std::fs::create_dir_all(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

/// Hand the results of `benchmark` to every enabled sink; failures are logged
async fn save_results(settings: &BenchmarkerConfig, sink: Option<&dyn TimeSeriesSink>, benchmark: &Benchmark) {
    if settings.results_print {
        print_console_report(benchmark);
    }

    if settings.results_save_to_file {
        for (file_name, file) in benchmark.result_files() {
            match file.write_to(&settings.results_path, &file_name) {
                Ok(path) => tracing::info!("Saving results to file: '{}'", path.display()),
                Err(e) => tracing::error!("Could not write results of {}: {}", benchmark.name(), e),
            }
        }
    }

    if let Some(sink) = sink {
        for (identity, store) in benchmark.result_sets() {
            match sink.save_results(identity, store).await {
                Ok(points) => tracing::info!("Sent {} points of {} to influxdb", points, identity.name),
                Err(e) => tracing::error!("Could not send results of {} to influxdb: {}", identity.name, e),
            }
        }
    }
}
