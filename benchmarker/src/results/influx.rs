//! Time-series sink: one InfluxDB point per metric per repetition

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{BenchmarkIdentity, MetricValue, ResultStore, RunResult, SinkError};

/// Connection settings for an InfluxDB 1.x server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfluxDbConfig {
    /// Base URL, e.g. `http://localhost:8086`
    pub url: String,
    pub db_name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// A single time-series data point without timestamp; the server assigns it
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, MetricValue>,
}

impl DataPoint {
    /// Render as InfluxDB line protocol, `None` if no field is representable
    pub fn to_line_protocol(&self) -> Option<String> {
        let fields: Vec<String> = self
            .fields
            .iter()
            .filter_map(|(key, value)| {
                format_field_value(value).map(|v| format!("{}={}", escape_key(key), v))
            })
            .collect();
        if fields.is_empty() {
            return None;
        }

        let mut line = escape_measurement(&self.measurement);
        for (key, value) in &self.tags {
            if value.is_empty() {
                continue;
            }
            line.push(',');
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&escape_key(value));
        }
        line.push(' ');
        line.push_str(&fields.join(","));
        Some(line)
    }
}

fn escape_measurement(s: &str) -> String {
    flatten_lines(s).replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_key(s: &str) -> String {
    flatten_lines(s)
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

/// Line protocol separates points by newline, so none may survive in a value
fn flatten_lines(s: &str) -> String {
    s.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

fn format_field_value(value: &MetricValue) -> Option<String> {
    match value {
        MetricValue::Int(v) => Some(format!("{}i", v)),
        MetricValue::Float(v) if v.is_finite() => Some(format!("{}", v)),
        MetricValue::Float(_) => None,
        MetricValue::Bool(v) => Some(v.to_string()),
        MetricValue::Text(v) => Some(format!(
            "\"{}\"",
            flatten_lines(v).replace('\\', "\\\\").replace('"', "\\\"")
        )),
    }
}

/// Build the points of one measurement.
///
/// Every repetition gets its own `repetition` tag (1-based); without it a
/// store that de-duplicates same-timestamp writes keeps only the last one.
pub fn measurement_points(
    tags: &BTreeMap<String, String>,
    measurement: &str,
    results: &[RunResult],
) -> Vec<DataPoint> {
    let mut points = Vec::new();

    for (i, result) in results.iter().enumerate() {
        let mut point_tags = tags.clone();
        point_tags.insert("repetition".to_string(), (i + 1).to_string());

        for (name, value) in &result.metrics {
            points.push(DataPoint {
                measurement: measurement.to_string(),
                tags: point_tags.clone(),
                fields: BTreeMap::from([(name.clone(), value.clone())]),
            });
        }

        for (job, metrics) in result.jobs.iter().flatten().enumerate() {
            let mut job_tags = point_tags.clone();
            job_tags.insert("job".to_string(), job.to_string());
            for (name, value) in metrics {
                points.push(DataPoint {
                    measurement: measurement.to_string(),
                    tags: job_tags.clone(),
                    fields: BTreeMap::from([(name.clone(), value.clone())]),
                });
            }
        }
    }

    points
}

/// All points of a result store, measurement named after the benchmark
pub fn store_points(identity: &BenchmarkIdentity, store: &ResultStore) -> Vec<DataPoint> {
    let base: BTreeMap<String, String> = identity
        .tags()
        .into_iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
        .collect();

    store
        .iter()
        .flat_map(|(label, results)| {
            let mut tags = base.clone();
            tags.insert("run_label".to_string(), label.to_string());
            measurement_points(&tags, &identity.name, results)
        })
        .collect()
}

/// Destination of per-repetition data points
#[async_trait]
pub trait TimeSeriesSink: Send + Sync {
    async fn write_points(&self, points: &[DataPoint]) -> Result<(), SinkError>;

    /// Push every stored result of a benchmark
    async fn save_results(&self, identity: &BenchmarkIdentity, store: &ResultStore) -> Result<usize, SinkError> {
        let points = store_points(identity, store);
        self.write_points(&points).await?;
        Ok(points.len())
    }
}

/// InfluxDB 1.x HTTP client
pub struct InfluxDbSink {
    config: InfluxDbConfig,
    http_client: Client,
}

impl InfluxDbSink {
    pub fn new(config: InfluxDbConfig) -> Self {
        Self {
            config,
            http_client: Client::new(),
        }
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// Verify the server is reachable
    pub async fn ping(&self) -> Result<(), SinkError> {
        let response = self
            .http_client
            .get(format!("{}/ping", self.base_url()))
            .send()
            .await?;
        check_status(response).await
    }
}

async fn check_status(response: reqwest::Response) -> Result<(), SinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let message = response.text().await.unwrap_or_default();
    Err(SinkError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl TimeSeriesSink for InfluxDbSink {
    async fn write_points(&self, points: &[DataPoint]) -> Result<(), SinkError> {
        let body: Vec<String> = points.iter().filter_map(DataPoint::to_line_protocol).collect();
        if body.is_empty() {
            return Ok(());
        }

        let mut query = vec![("db", self.config.db_name.clone())];
        if let Some(ref username) = self.config.username {
            query.push(("u", username.clone()));
        }
        if let Some(ref password) = self.config.password {
            query.push(("p", password.clone()));
        }

        let response = self
            .http_client
            .post(format!("{}/write", self.base_url()))
            .query(&query)
            .body(body.join("\n"))
            .send()
            .await?;

        check_status(response).await?;
        tracing::debug!("Wrote {} points to influxdb", body.len());
        Ok(())
    }
}
