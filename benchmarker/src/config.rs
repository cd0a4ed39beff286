//! Configuration management for the benchmarker
//!
//! Loads destinations, tasks and benchmarks from one or more TOML files.
//! Benchmark and task kinds are resolved from their `type` key while parsing,
//! so an unknown kind never reaches execution.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::results::InfluxDbConfig;
use crate::runner::RunMode;

/// Free-form variables handed to playbooks and commands
pub type ExtraVars = BTreeMap<String, toml::Value>;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Harness settings; a later file's table replaces an earlier one
    #[serde(default)]
    pub config: Option<BenchmarkerConfig>,
    #[serde(default)]
    pub influxdb: Option<InfluxDbConfig>,
    #[serde(default)]
    pub destinations: IndexMap<String, DestinationConfig>,
    #[serde(default)]
    pub tasks: IndexMap<String, TaskSpec>,
    #[serde(default)]
    pub benchmarks: IndexMap<String, BenchmarkSpec>,
}

/// Harness-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkerConfig {
    #[serde(default = "default_results_path")]
    pub results_path: PathBuf,
    #[serde(default = "default_true")]
    pub results_save_to_file: bool,
    #[serde(default = "default_true")]
    pub results_print: bool,
    /// Echo playbook and command output at info level
    #[serde(default)]
    pub log_playbook_output: bool,
    #[serde(default = "default_playbook_folder")]
    pub playbook_folder: PathBuf,
}

impl Default for BenchmarkerConfig {
    fn default() -> Self {
        Self {
            results_path: default_results_path(),
            results_save_to_file: true,
            results_print: true,
            log_playbook_output: false,
            playbook_folder: default_playbook_folder(),
        }
    }
}

/// A remote host benchmarks run against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub host: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
}

/// An auxiliary task definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskSpec {
    Playbook {
        playbook: String,
        #[serde(default)]
        folder: Option<PathBuf>,
        #[serde(default)]
        destinations: Vec<String>,
        #[serde(default)]
        extra_vars: ExtraVars,
    },
    Command {
        command: String,
        #[serde(default)]
        destinations: Vec<String>,
    },
}

/// Either the name of a task under `[tasks]` or an inline definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskRef {
    Named(String),
    Inline(TaskSpec),
}

/// The measured action of a benchmark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepSpec {
    Playbook {
        playbook: String,
        #[serde(default)]
        folder: Option<PathBuf>,
        #[serde(default)]
        extra_vars: ExtraVars,
    },
    Command {
        command: String,
        /// Merge a JSON object printed on stdout into the metrics
        #[serde(default)]
        parse_json: bool,
    },
}

/// A benchmark definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSpec {
    #[serde(default)]
    pub repetitions: Option<i64>,
    #[serde(default)]
    pub pre_tasks: Vec<TaskRef>,
    #[serde(default)]
    pub post_tasks: Vec<TaskRef>,
    #[serde(default)]
    pub step: Option<StepSpec>,
    #[serde(flatten)]
    pub kind: BenchmarkKindSpec,
}

/// Kind-specific part of a benchmark definition, selected by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BenchmarkKindSpec {
    DestinationComparison {
        destinations: Vec<String>,
        #[serde(default = "default_true")]
        warmup: bool,
        #[serde(default)]
        mode: RunMode,
    },
    ColdWarm {
        destinations: Vec<String>,
        #[serde(default = "default_true")]
        warmup: bool,
        #[serde(default)]
        cold_pre_task: Option<TaskRef>,
        #[serde(default)]
        warm_pre_task: Option<TaskRef>,
    },
    ParameterSweep {
        destination: String,
        dim_key: String,
        dim_values: Vec<toml::Value>,
    },
    Burst {
        destination: String,
        /// Launches per second, may be fractional
        burst_rate: f64,
        #[serde(default)]
        background_tasks: Vec<BackgroundTaskSpec>,
    },
    Compare {
        bench_a: Box<BenchmarkSpec>,
        bench_b: Box<BenchmarkSpec>,
    },
}

/// A periodic task of a burst benchmark, times in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundTaskSpec {
    pub task: TaskRef,
    #[serde(default)]
    pub first_run_after: u64,
    pub run_every: u64,
    #[serde(default)]
    pub run_until: Option<u64>,
}

// Default value functions
fn default_true() -> bool { true }
fn default_results_path() -> PathBuf { PathBuf::from("results/") }
fn default_playbook_folder() -> PathBuf { PathBuf::from("playbooks/") }

impl GlobalConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load every file in order and merge them into one configuration
    pub fn load_all<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ConfigError> {
        let mut merged = Self::default();
        for path in paths {
            tracing::info!("Loading configuration from {}", path.as_ref().display());
            merged.merge(Self::from_file(path)?)?;
        }
        Ok(merged)
    }

    /// Merge `other` into `self`.
    ///
    /// Named destinations, tasks and benchmarks must be unique across files.
    pub fn merge(&mut self, other: GlobalConfig) -> Result<(), ConfigError> {
        if other.config.is_some() {
            self.config = other.config;
        }
        if other.influxdb.is_some() {
            self.influxdb = other.influxdb;
        }
        merge_unique(&mut self.destinations, other.destinations, "destination")?;
        merge_unique(&mut self.tasks, other.tasks, "task")?;
        merge_unique(&mut self.benchmarks, other.benchmarks, "benchmark")?;
        Ok(())
    }

    /// Effective harness settings
    pub fn settings(&self) -> BenchmarkerConfig {
        self.config.clone().unwrap_or_default()
    }
}

fn merge_unique<V>(
    target: &mut IndexMap<String, V>,
    source: IndexMap<String, V>,
    kind: &'static str,
) -> Result<(), ConfigError> {
    for (name, value) in source {
        if target.contains_key(&name) {
            return Err(ConfigError::Duplicate { kind, name });
        }
        target.insert(name, value);
    }
    Ok(())
}

/// Plain string form of a configured value
pub fn value_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// String form of every configured variable
pub fn stringify_vars(vars: &ExtraVars) -> BTreeMap<String, String> {
    vars.iter()
        .map(|(key, value)| (key.clone(), value_to_string(value)))
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unknown {kind} '{name}'")]
    UnknownReference { kind: &'static str, name: String },

    #[error("{kind} '{name}' is defined more than once")]
    Duplicate { kind: &'static str, name: String },

    #[error("benchmark '{name}': {source}")]
    Benchmark {
        name: String,
        #[source]
        source: Box<ConfigError>,
    },
}

impl ConfigError {
    /// Attach the name of the benchmark being built
    pub fn in_benchmark(self, name: &str) -> Self {
        ConfigError::Benchmark {
            name: name.to_string(),
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const EXAMPLE: &str = r#"
[config]
results_path = "out/"
log_playbook_output = true

[destinations.node1]
host = "10.0.0.1"
user = "bench"

[destinations.node2]
host = "10.0.0.2"

[tasks.clear_cache]
type = "command"
command = "sync"
destinations = ["node1"]

[benchmarks.compare_nodes]
type = "DestinationComparison"
repetitions = 3
destinations = ["node1", "node2"]
step = { type = "command", command = "sleep 1" }

[benchmarks.caches]
type = "ColdWarm"
repetitions = 2
destinations = ["node1"]
cold_pre_task = "clear_cache"
warm_pre_task = { type = "command", command = "true" }
step = { type = "playbook", playbook = "run_workflow", extra_vars = { workflow = "small", jobs = 4 } }

[benchmarks.sweep]
type = "ParameterSweep"
repetitions = 1
destination = "node1"
dim_key = "blocksize"
dim_values = ["4k", 64, "1M"]
step = { type = "command", command = "fio", parse_json = true }

[benchmarks.rush]
type = "Burst"
repetitions = 10
destination = "node2"
burst_rate = 0.5
step = { type = "command", command = "true" }

[[benchmarks.rush.background_tasks]]
task = "clear_cache"
first_run_after = 5
run_every = 10
"#;

    #[test]
    fn test_parse_toml_config() {
        let config = GlobalConfig::from_toml(EXAMPLE).unwrap();
        let settings = config.settings();
        assert_eq!(settings.results_path, PathBuf::from("out/"));
        assert!(settings.log_playbook_output);
        assert!(settings.results_print);

        let names: Vec<_> = config.benchmarks.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["compare_nodes", "caches", "sweep", "rush"]);

        let compare = &config.benchmarks["compare_nodes"];
        assert_eq!(compare.repetitions, Some(3));
        assert!(matches!(
            compare.kind,
            BenchmarkKindSpec::DestinationComparison { warmup: true, mode: RunMode::Warm, .. }
        ));

        match &config.benchmarks["caches"].kind {
            BenchmarkKindSpec::ColdWarm { cold_pre_task, warm_pre_task, .. } => {
                assert_eq!(cold_pre_task, &Some(TaskRef::Named("clear_cache".into())));
                assert!(matches!(warm_pre_task, Some(TaskRef::Inline(TaskSpec::Command { .. }))));
            }
            other => panic!("unexpected kind {:?}", other),
        }

        match &config.benchmarks["rush"].kind {
            BenchmarkKindSpec::Burst { burst_rate, background_tasks, .. } => {
                assert_eq!(*burst_rate, 0.5);
                assert_eq!(background_tasks[0].run_every, 10);
                assert_eq!(background_tasks[0].run_until, None);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_unknown_benchmark_type_is_rejected() {
        let toml = r#"
[benchmarks.bad]
type = "Teleport"
repetitions = 1
"#;
        assert!(matches!(GlobalConfig::from_toml(toml), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_run_mode_is_rejected() {
        let toml = r#"
[benchmarks.bad]
type = "DestinationComparison"
destinations = ["node1"]
mode = "lukewarm"
"#;
        assert!(GlobalConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_compare_nests_benchmarks() {
        let toml = r#"
[benchmarks.pair]
type = "Compare"

[benchmarks.pair.bench_a]
type = "DestinationComparison"
repetitions = 2
destinations = ["node1"]
step = { type = "command", command = "true" }

[benchmarks.pair.bench_b]
type = "ParameterSweep"
repetitions = 2
destination = "node1"
dim_key = "size"
dim_values = [1, 2]
step = { type = "command", command = "true" }
"#;
        let config = GlobalConfig::from_toml(toml).unwrap();
        match &config.benchmarks["pair"].kind {
            BenchmarkKindSpec::Compare { bench_a, bench_b } => {
                assert_eq!(bench_a.repetitions, Some(2));
                assert!(matches!(bench_b.kind, BenchmarkKindSpec::ParameterSweep { .. }));
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_merge_files() {
        let mut first = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            first,
            "[destinations.node1]\nhost = \"10.0.0.1\"\n\n[config]\nresults_print = false"
        )
        .unwrap();
        let mut second = tempfile::NamedTempFile::new().unwrap();
        writeln!(second, "[destinations.node2]\nhost = \"10.0.0.2\"").unwrap();

        let config = GlobalConfig::load_all(&[first.path(), second.path()]).unwrap();
        assert_eq!(config.destinations.len(), 2);
        assert!(!config.settings().results_print);
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut config = GlobalConfig::from_toml("[destinations.node1]\nhost = \"a\"").unwrap();
        let other = GlobalConfig::from_toml("[destinations.node1]\nhost = \"b\"").unwrap();
        assert!(matches!(
            config.merge(other),
            Err(ConfigError::Duplicate { kind: "destination", .. })
        ));
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&toml::Value::String("4k".into())), "4k");
        assert_eq!(value_to_string(&toml::Value::Integer(64)), "64");
    }
}
