//! Construction of benchmarks from the parsed configuration.
//!
//! Every reference is resolved and every value validated here, so a broken
//! configuration fails before anything runs.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;

use super::compare::ComparePair;
use super::unit::{BenchmarkUnit, ModeSetup, RunPlan};
use super::Benchmark;
use crate::config::{
    stringify_vars, value_to_string, BackgroundTaskSpec, BenchmarkKindSpec, BenchmarkSpec,
    BenchmarkerConfig, ConfigError, GlobalConfig, StepSpec, TaskRef, TaskSpec,
};
use crate::destination::Destination;
use crate::results::BenchmarkKind;
use crate::runner::{BackgroundTask, RunMode};
use crate::steps::{CommandStep, PlaybookStep, StepAction};
use crate::tasks::{CommandTask, Playbook, PlaybookTask, ShellCommand, Task};

/// Builds [`Benchmark`]s out of a [`GlobalConfig`]
pub struct BenchmarkFactory<'a> {
    config: &'a GlobalConfig,
    settings: BenchmarkerConfig,
    destinations: IndexMap<String, Destination>,
}

impl<'a> BenchmarkFactory<'a> {
    pub fn new(config: &'a GlobalConfig) -> Self {
        let destinations = config
            .destinations
            .iter()
            .map(|(name, dest)| {
                let mut destination = Destination::new(name.as_str(), dest.host.as_str());
                if let Some(user) = &dest.user {
                    destination = destination.with_user(user.as_str());
                }
                if let Some(key) = &dest.private_key {
                    destination = destination.with_private_key(key.as_str());
                }
                (name.clone(), destination)
            })
            .collect();

        Self {
            config,
            settings: config.settings(),
            destinations,
        }
    }

    /// Build every configured benchmark in configuration order
    pub fn build_all(&self) -> Result<Vec<Benchmark>, ConfigError> {
        self.config
            .benchmarks
            .iter()
            .map(|(name, spec)| self.build(name, spec).map_err(|e| e.in_benchmark(name)))
            .collect()
    }

    pub fn build(&self, name: &str, spec: &BenchmarkSpec) -> Result<Benchmark, ConfigError> {
        match &spec.kind {
            BenchmarkKindSpec::Compare { bench_a, bench_b } => {
                let bench_a = self.build_side(&format!("{}_a", name), bench_a)?;
                let bench_b = self.build_side(&format!("{}_b", name), bench_b)?;
                Ok(Benchmark::Compare(ComparePair::new(name, bench_a, bench_b)))
            }
            _ => Ok(Benchmark::Unit(self.build_unit(name, spec)?)),
        }
    }

    /// Only sequential kinds can be interleaved
    fn build_side(&self, name: &str, spec: &BenchmarkSpec) -> Result<BenchmarkUnit, ConfigError> {
        if matches!(
            spec.kind,
            BenchmarkKindSpec::Burst { .. } | BenchmarkKindSpec::Compare { .. }
        ) {
            return Err(ConfigError::Invalid(format!(
                "'{}' cannot be part of a Compare benchmark, only sequential benchmarks can",
                name
            )));
        }
        self.build_unit(name, spec)
    }

    fn build_unit(&self, name: &str, spec: &BenchmarkSpec) -> Result<BenchmarkUnit, ConfigError> {
        let repetitions = match spec.repetitions {
            Some(n) if n >= 1 => n as usize,
            Some(n) => {
                return Err(ConfigError::Invalid(format!(
                    "'repetitions' has to be > 0, got {}",
                    n
                )))
            }
            None => return Err(ConfigError::Invalid("'repetitions' is required".to_string())),
        };
        let step = match &spec.step {
            Some(step) => self.step(step)?,
            None => return Err(ConfigError::Invalid("'step' is required".to_string())),
        };

        let mut tags: Vec<(&str, serde_json::Value)> = Vec::new();
        let (kind, plan) = match &spec.kind {
            BenchmarkKindSpec::DestinationComparison {
                destinations,
                warmup,
                mode,
            } => (
                BenchmarkKind::DestinationComparison,
                RunPlan::Destinations {
                    destinations: self.destination_list(destinations)?,
                    modes: vec![ModeSetup::new(*mode).with_warmup(*warmup)],
                },
            ),
            BenchmarkKindSpec::ColdWarm {
                destinations,
                warmup,
                cold_pre_task,
                warm_pre_task,
            } => {
                let cold = self.optional_task(cold_pre_task.as_ref(), &format!("{}_cold_pre_task", name))?;
                let warm = self.optional_task(warm_pre_task.as_ref(), &format!("{}_warm_pre_task", name))?;
                (
                    BenchmarkKind::ColdWarm,
                    RunPlan::Destinations {
                        destinations: self.destination_list(destinations)?,
                        modes: vec![
                            ModeSetup::new(RunMode::Cold).with_prerequisite(cold),
                            ModeSetup::new(RunMode::Warm)
                                .with_warmup(*warmup)
                                .with_prerequisite(warm),
                        ],
                    },
                )
            }
            BenchmarkKindSpec::ParameterSweep {
                destination,
                dim_key,
                dim_values,
            } => {
                if dim_key.is_empty() {
                    return Err(ConfigError::Invalid("'dim_key' must not be empty".to_string()));
                }
                if dim_values.is_empty() {
                    return Err(ConfigError::Invalid("'dim_values' must not be empty".to_string()));
                }
                let dim_values: Vec<String> = dim_values.iter().map(value_to_string).collect();
                ensure_unique("dim_value", &dim_values)?;
                tags.push(("dim_key", dim_key.as_str().into()));
                tags.push(("dim_values", dim_values.clone().into()));
                (
                    BenchmarkKind::ParameterSweep,
                    RunPlan::Sweep {
                        destination: self.destination(destination)?,
                        dim_key: dim_key.clone(),
                        dim_values,
                    },
                )
            }
            BenchmarkKindSpec::Burst {
                destination,
                burst_rate,
                background_tasks,
            } => {
                if !burst_rate.is_finite() || *burst_rate <= 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "'burst_rate' has to be > 0, got {}",
                        burst_rate
                    )));
                }
                let background_tasks = background_tasks
                    .iter()
                    .enumerate()
                    .map(|(i, spec)| self.background_task(spec, &format!("{}_background_{}", name, i)))
                    .collect::<Result<Vec<_>, _>>()?;
                tags.push(("burst_rate", (*burst_rate).into()));
                (
                    BenchmarkKind::Burst,
                    RunPlan::Burst {
                        destination: self.destination(destination)?,
                        burst_rate: *burst_rate,
                        background_tasks,
                    },
                )
            }
            BenchmarkKindSpec::Compare { .. } => {
                return Err(ConfigError::Invalid(
                    "Compare benchmarks cannot be nested".to_string(),
                ))
            }
        };

        let pre_tasks = self.task_list(&spec.pre_tasks, &format!("{}_pre_task", name))?;
        let post_tasks = self.task_list(&spec.post_tasks, &format!("{}_post_task", name))?;

        let mut unit = BenchmarkUnit::new(name, kind, repetitions, step, plan)
            .with_pre_tasks(pre_tasks)
            .with_post_tasks(post_tasks);
        for (key, value) in tags {
            unit = unit.with_tag(key, value);
        }
        Ok(unit)
    }

    fn destination(&self, name: &str) -> Result<Destination, ConfigError> {
        self.destinations
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownReference {
                kind: "destination",
                name: name.to_string(),
            })
    }

    fn destination_list(&self, names: &[String]) -> Result<Vec<Destination>, ConfigError> {
        if names.is_empty() {
            return Err(ConfigError::Invalid("'destinations' must not be empty".to_string()));
        }
        ensure_unique("destination", names)?;
        names.iter().map(|name| self.destination(name)).collect()
    }

    fn step(&self, spec: &StepSpec) -> Result<Arc<dyn StepAction>, ConfigError> {
        let log_output = self.settings.log_playbook_output;
        Ok(match spec {
            StepSpec::Playbook {
                playbook,
                folder,
                extra_vars,
            } => {
                let folder = folder.as_ref().unwrap_or(&self.settings.playbook_folder);
                let playbook = Playbook::locate(folder, playbook)?.with_log_output(log_output);
                Arc::new(PlaybookStep::new(playbook).with_extra_vars(stringify_vars(extra_vars)))
            }
            StepSpec::Command {
                command,
                parse_json,
            } => {
                if command.trim().is_empty() {
                    return Err(ConfigError::Invalid("'command' must not be empty".to_string()));
                }
                let command = ShellCommand::new(command.as_str()).with_log_output(log_output);
                Arc::new(CommandStep::new(command).with_json_metrics(*parse_json))
            }
        })
    }

    fn task_list(&self, refs: &[TaskRef], inline_name: &str) -> Result<Vec<Arc<dyn Task>>, ConfigError> {
        refs.iter()
            .enumerate()
            .map(|(i, task)| self.standalone_task(task, &format!("{}_{}", inline_name, i)))
            .collect()
    }

    fn optional_task(
        &self,
        task: Option<&TaskRef>,
        inline_name: &str,
    ) -> Result<Option<Arc<dyn Task>>, ConfigError> {
        task.map(|task| self.task(task, inline_name)).transpose()
    }

    /// Resolve a task reference; inline definitions get `inline_name`
    fn task(&self, task: &TaskRef, inline_name: &str) -> Result<Arc<dyn Task>, ConfigError> {
        let (name, spec) = self.task_spec(task, inline_name)?;
        self.task_from_spec(name, spec)
    }

    /// Resolve a task that is executed through [`Task::run`] rather than
    /// against the destination of a series
    fn standalone_task(&self, task: &TaskRef, inline_name: &str) -> Result<Arc<dyn Task>, ConfigError> {
        let (name, spec) = self.task_spec(task, inline_name)?;
        if let TaskSpec::Playbook { destinations, .. } = spec {
            if destinations.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "'destinations' is required for playbook task '{}'",
                    name
                )));
            }
        }
        self.task_from_spec(name, spec)
    }

    fn task_spec<'s>(&'s self, task: &'s TaskRef, inline_name: &'s str) -> Result<(&'s str, &'s TaskSpec), ConfigError> {
        match task {
            TaskRef::Named(name) => self
                .config
                .tasks
                .get(name)
                .map(|spec| (name.as_str(), spec))
                .ok_or_else(|| ConfigError::UnknownReference {
                    kind: "task",
                    name: name.clone(),
                }),
            TaskRef::Inline(spec) => Ok((inline_name, spec)),
        }
    }

    fn task_from_spec(&self, name: &str, spec: &TaskSpec) -> Result<Arc<dyn Task>, ConfigError> {
        let log_output = self.settings.log_playbook_output;
        Ok(match spec {
            TaskSpec::Playbook {
                playbook,
                folder,
                destinations,
                extra_vars,
            } => {
                let folder = folder.as_ref().unwrap_or(&self.settings.playbook_folder);
                let playbook = Playbook::locate(folder, playbook)?.with_log_output(log_output);
                Arc::new(
                    PlaybookTask::new(name, playbook)
                        .with_destinations(self.task_destinations(destinations)?)
                        .with_extra_vars(stringify_vars(extra_vars)),
                )
            }
            TaskSpec::Command {
                command,
                destinations,
            } => {
                let command = ShellCommand::new(command.as_str()).with_log_output(log_output);
                Arc::new(
                    CommandTask::new(name, command)
                        .with_destinations(self.task_destinations(destinations)?),
                )
            }
        })
    }

    fn task_destinations(&self, names: &[String]) -> Result<Vec<Destination>, ConfigError> {
        names.iter().map(|name| self.destination(name)).collect()
    }

    fn background_task(&self, spec: &BackgroundTaskSpec, inline_name: &str) -> Result<BackgroundTask, ConfigError> {
        if spec.run_every == 0 {
            return Err(ConfigError::Invalid(
                "'run_every' of a background task has to be > 0".to_string(),
            ));
        }
        let mut task = BackgroundTask::new(self.standalone_task(&spec.task, inline_name)?, Duration::from_secs(spec.run_every))
            .with_first_run_after(Duration::from_secs(spec.first_run_after));
        if let Some(until) = spec.run_until {
            task = task.with_run_until(Duration::from_secs(until));
        }
        Ok(task)
    }
}

fn ensure_unique(kind: &'static str, values: &[String]) -> Result<(), ConfigError> {
    for (i, value) in values.iter().enumerate() {
        if values[..i].contains(value) {
            return Err(ConfigError::Duplicate {
                kind,
                name: value.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESTINATIONS: &str = r#"
[destinations.node1]
host = "10.0.0.1"

[destinations.node2]
host = "10.0.0.2"
user = "bench"

[tasks.flush]
type = "command"
command = "sync"
"#;

    fn build(benchmarks: &str) -> Result<Vec<Benchmark>, ConfigError> {
        let config = GlobalConfig::from_toml(&format!("{}\n{}", DESTINATIONS, benchmarks)).unwrap();
        BenchmarkFactory::new(&config).build_all()
    }

    fn expect_invalid(benchmarks: &str) -> String {
        match build(benchmarks) {
            Err(e) => e.to_string(),
            Ok(_) => panic!("configuration was accepted"),
        }
    }

    #[test]
    fn test_builds_every_kind() {
        let benchmarks = build(
            r#"
[benchmarks.cmp]
type = "DestinationComparison"
repetitions = 2
destinations = ["node1", "node2"]
step = { type = "command", command = "true" }

[benchmarks.cw]
type = "ColdWarm"
repetitions = 1
destinations = ["node2"]
cold_pre_task = "flush"
step = { type = "command", command = "true" }

[benchmarks.sweep]
type = "ParameterSweep"
repetitions = 1
destination = "node1"
dim_key = "size"
dim_values = [1, "2"]
step = { type = "command", command = "true" }

[benchmarks.rush]
type = "Burst"
repetitions = 4
destination = "node1"
burst_rate = 2
step = { type = "command", command = "true" }
background_tasks = [{ task = "flush", run_every = 3 }]

[benchmarks.pair]
type = "Compare"
bench_a = { type = "DestinationComparison", repetitions = 1, destinations = ["node1"], step = { type = "command", command = "true" } }
bench_b = { type = "DestinationComparison", repetitions = 1, destinations = ["node2"], step = { type = "command", command = "true" } }
"#,
        )
        .unwrap();

        let names: Vec<_> = benchmarks.iter().map(Benchmark::name).collect();
        assert_eq!(names, vec!["cmp", "cw", "sweep", "rush", "pair"]);

        match &benchmarks[2] {
            Benchmark::Unit(unit) => match unit.plan() {
                RunPlan::Sweep { dim_values, .. } => assert_eq!(dim_values, &vec!["1".to_string(), "2".to_string()]),
                other => panic!("unexpected plan {:?}", other),
            },
            other => panic!("unexpected benchmark {:?}", other),
        }

        match &benchmarks[4] {
            Benchmark::Compare(pair) => {
                assert_eq!(pair.bench_a().name(), "pair_a");
                assert_eq!(pair.bench_b().name(), "pair_b");
            }
            other => panic!("unexpected benchmark {:?}", other),
        }
    }

    #[test]
    fn test_repetitions_must_be_positive() {
        let message = expect_invalid(
            r#"
[benchmarks.bad]
type = "DestinationComparison"
repetitions = 0
destinations = ["node1"]
step = { type = "command", command = "true" }
"#,
        );
        assert!(message.contains("'repetitions' has to be > 0"));
        assert!(message.contains("bad"));
    }

    #[test]
    fn test_unknown_destination() {
        let message = expect_invalid(
            r#"
[benchmarks.bad]
type = "DestinationComparison"
repetitions = 1
destinations = ["node9"]
step = { type = "command", command = "true" }
"#,
        );
        assert!(message.contains("node9"));
    }

    #[test]
    fn test_burst_rate_must_be_positive() {
        let message = expect_invalid(
            r#"
[benchmarks.bad]
type = "Burst"
repetitions = 1
destination = "node1"
burst_rate = 0
step = { type = "command", command = "true" }
"#,
        );
        assert!(message.contains("burst_rate"));
    }

    #[test]
    fn test_burst_cannot_be_compared() {
        let message = expect_invalid(
            r#"
[benchmarks.pair]
type = "Compare"
bench_a = { type = "Burst", repetitions = 1, destination = "node1", burst_rate = 1, step = { type = "command", command = "true" } }
bench_b = { type = "DestinationComparison", repetitions = 1, destinations = ["node2"], step = { type = "command", command = "true" } }
"#,
        );
        assert!(message.contains("Compare"));
    }

    #[test]
    fn test_duplicate_sweep_values_rejected() {
        let message = expect_invalid(
            r#"
[benchmarks.sweep]
type = "ParameterSweep"
repetitions = 2
destination = "node1"
dim_key = "bs"
dim_values = ["4k", "4k"]
step = { type = "command", command = "true" }
"#,
        );
        assert!(message.contains("dim_value '4k' is defined more than once"));
    }

    #[test]
    fn test_sweep_values_compared_after_conversion() {
        let message = expect_invalid(
            r#"
[benchmarks.sweep]
type = "ParameterSweep"
repetitions = 1
destination = "node1"
dim_key = "numjobs"
dim_values = [1, "1"]
step = { type = "command", command = "true" }
"#,
        );
        assert!(message.contains("dim_value '1'"));
    }

    #[test]
    fn test_duplicate_destinations_rejected() {
        let config = GlobalConfig::from_toml(&format!(
            r#"{}
[benchmarks.cw]
type = "ColdWarm"
repetitions = 1
destinations = ["node1", "node2", "node1"]
step = {{ type = "command", command = "true" }}
"#,
            DESTINATIONS
        ))
        .unwrap();
        let factory = BenchmarkFactory::new(&config);

        assert!(matches!(
            factory.build("cw", &config.benchmarks["cw"]),
            Err(ConfigError::Duplicate { kind: "destination", .. })
        ));
    }

    #[test]
    fn test_playbook_task_run_standalone_needs_destinations() {
        let folder = tempfile::tempdir().unwrap();
        std::fs::write(folder.path().join("clean.yml"), "- hosts: all\n").unwrap();
        let config = GlobalConfig::from_toml(&format!(
            r#"{}
[config]
playbook_folder = "{}"

[tasks.clean]
type = "playbook"
playbook = "clean.yml"

[benchmarks.pre]
type = "DestinationComparison"
repetitions = 1
destinations = ["node1"]
pre_tasks = ["clean"]
step = {{ type = "command", command = "true" }}

[benchmarks.rush]
type = "Burst"
repetitions = 1
destination = "node1"
burst_rate = 1
step = {{ type = "command", command = "true" }}
background_tasks = [{{ task = "clean", run_every = 5 }}]

[benchmarks.cold]
type = "ColdWarm"
repetitions = 1
destinations = ["node1"]
cold_pre_task = "clean"
step = {{ type = "command", command = "true" }}
"#,
            DESTINATIONS,
            folder.path().display()
        ))
        .unwrap();
        let factory = BenchmarkFactory::new(&config);

        for name in ["pre", "rush"] {
            match factory.build(name, &config.benchmarks[name]) {
                Err(ConfigError::Invalid(message)) => assert!(message.contains("'destinations' is required")),
                other => panic!("{} built: {:?}", name, other.map(|b| b.name().to_string())),
            }
        }
        // Prerequisites run against the destination of their series
        assert!(factory.build("cold", &config.benchmarks["cold"]).is_ok());
    }

    #[test]
    fn test_missing_step() {
        let message = expect_invalid(
            r#"
[benchmarks.bad]
type = "DestinationComparison"
repetitions = 1
destinations = ["node1"]
"#,
        );
        assert!(message.contains("'step' is required"));
    }

    #[test]
    fn test_playbook_must_exist() {
        let folder = tempfile::tempdir().unwrap();
        std::fs::write(folder.path().join("run.yml"), "- hosts: all\n").unwrap();
        let config = GlobalConfig::from_toml(&format!(
            r#"{}
[config]
playbook_folder = "{}"

[benchmarks.ok]
type = "DestinationComparison"
repetitions = 1
destinations = ["node1"]
step = {{ type = "playbook", playbook = "run.yml" }}

[benchmarks.missing]
type = "DestinationComparison"
repetitions = 1
destinations = ["node1"]
step = {{ type = "playbook", playbook = "absent.yml" }}
"#,
            DESTINATIONS,
            folder.path().display()
        ))
        .unwrap();
        let factory = BenchmarkFactory::new(&config);

        assert!(factory.build("ok", &config.benchmarks["ok"]).is_ok());
        assert!(factory.build("missing", &config.benchmarks["missing"]).is_err());
    }
}
