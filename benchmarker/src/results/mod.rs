//! Per-repetition results, benchmark identity and the sinks results flow into

pub mod file;
pub mod influx;

pub use file::ResultFile;
pub use influx::{DataPoint, InfluxDbConfig, InfluxDbSink, TimeSeriesSink};

use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Tags attached to a stored result set
pub type Tags = IndexMap<String, serde_json::Value>;

/// Open map of named metrics
pub type Metrics = BTreeMap<String, MetricValue>;

/// A single metric value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl MetricValue {
    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Int(v) => Some(*v as f64),
            MetricValue::Float(v) => Some(*v),
            MetricValue::Bool(_) | MetricValue::Text(_) => None,
        }
    }

    /// Convert a JSON scalar; arrays, objects and null have no metric form
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(MetricValue::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(MetricValue::Int)
                .or_else(|| n.as_f64().map(MetricValue::Float)),
            serde_json::Value::String(s) => Some(MetricValue::Text(s.clone())),
            _ => None,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int(v)
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        MetricValue::Bool(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Text(v)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int(v) => write!(f, "{}", v),
            MetricValue::Float(v) => write!(f, "{}", v),
            MetricValue::Bool(v) => write!(f, "{}", v),
            MetricValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// Outcome of one execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
}

/// The outcome record of one execution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    #[serde(default)]
    pub metrics: Metrics,
    /// Optional per-job metric maps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<Vec<Metrics>>,
}

impl RunResult {
    pub fn success() -> Self {
        Self {
            status: RunStatus::Success,
            metrics: Metrics::new(),
            jobs: None,
        }
    }

    pub fn error() -> Self {
        Self {
            status: RunStatus::Error,
            metrics: Metrics::new(),
            jobs: None,
        }
    }

    /// Error result carrying a human-readable reason
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::error().with_metric("error", reason.into())
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.metrics.insert(name.into(), value.into());
        self
    }

    pub fn with_jobs(mut self, jobs: Vec<Metrics>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// Concrete benchmark kind, used as the `benchmark_type` tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BenchmarkKind {
    DestinationComparison,
    ColdWarm,
    ParameterSweep,
    Burst,
    Compare,
}

impl BenchmarkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BenchmarkKind::DestinationComparison => "DestinationComparison",
            BenchmarkKind::ColdWarm => "ColdWarm",
            BenchmarkKind::ParameterSweep => "ParameterSweep",
            BenchmarkKind::Burst => "Burst",
            BenchmarkKind::Compare => "Compare",
        }
    }
}

impl fmt::Display for BenchmarkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stable identity attached to every stored result set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkIdentity {
    pub name: String,
    /// Opaque id, the creation time of the benchmark
    pub id: String,
    pub kind: BenchmarkKind,
}

impl BenchmarkIdentity {
    pub fn new(name: impl Into<String>, kind: BenchmarkKind) -> Self {
        Self {
            name: name.into(),
            id: Utc::now().format("%Y%m%d-%H%M%S").to_string(),
            kind,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Tags shared by the file dump and every time-series point
    pub fn tags(&self) -> Tags {
        let mut tags = Tags::new();
        tags.insert("plugin".into(), "benchmarker".into());
        tags.insert("benchmark_name".into(), self.name.clone().into());
        tags.insert("benchmark_id".into(), self.id.clone().into());
        tags.insert("benchmark_type".into(), self.kind.as_str().into());
        tags
    }

    /// File name of the structured result dump
    pub fn result_file_name(&self) -> String {
        format!("{}_{}.json", self.id, self.name)
    }
}

impl fmt::Display for BenchmarkIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Results of one benchmark keyed by run label, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultStore {
    series: IndexMap<String, Vec<RunResult>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh series for `label`, dropping earlier results under it
    pub fn begin_series(&mut self, label: impl Into<String>) -> &mut Vec<RunResult> {
        let series = self.series.entry(label.into()).or_default();
        series.clear();
        series
    }

    /// Append a result to the series of `label`
    pub fn push(&mut self, label: &str, result: RunResult) {
        self.series.entry(label.to_string()).or_default().push(result);
    }

    pub fn series(&self, label: &str) -> Option<&[RunResult]> {
        self.series.get(label).map(Vec::as_slice)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[RunResult])> {
        self.series.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of stored results across all labels
    pub fn total_results(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Errors raised while pushing results into a sink
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
}
