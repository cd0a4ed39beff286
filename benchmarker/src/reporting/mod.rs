//! Console summary of collected results

use std::collections::BTreeMap;

use crate::benchmarks::Benchmark;
use crate::results::{ResultStore, RunResult};

/// Aggregate of one numeric metric over a series
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSummary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub samples: usize,
}

/// Summary of one labelled series
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSummary {
    pub label: String,
    pub runs: usize,
    pub failed: usize,
    pub metrics: BTreeMap<String, MetricSummary>,
}

impl SeriesSummary {
    pub fn from_results(label: impl Into<String>, results: &[RunResult]) -> Self {
        let mut values: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for result in results {
            for (name, value) in &result.metrics {
                if let Some(v) = value.as_f64() {
                    values.entry(name.clone()).or_default().push(v);
                }
            }
        }

        let metrics = values
            .into_iter()
            .map(|(name, samples)| {
                let mean = samples.iter().sum::<f64>() / samples.len() as f64;
                let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
                let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                (
                    name,
                    MetricSummary {
                        mean,
                        min,
                        max,
                        samples: samples.len(),
                    },
                )
            })
            .collect();

        Self {
            label: label.into(),
            runs: results.len(),
            failed: results.iter().filter(|r| !r.is_success()).count(),
            metrics,
        }
    }
}

/// Summaries of every series of a store, in label order
pub fn summarize(store: &ResultStore) -> Vec<SeriesSummary> {
    store
        .iter()
        .map(|(label, results)| SeriesSummary::from_results(label, results))
        .collect()
}

/// Generate a console report
pub fn print_console_report(benchmark: &Benchmark) {
    for (identity, store) in benchmark.result_sets() {
        println!("\n=== Results for {} ({}) ===\n", identity.name, identity.kind);

        if store.is_empty() {
            println!("  No results collected");
            continue;
        }

        for summary in summarize(store) {
            println!("{}: {} runs, {} failed", summary.label, summary.runs, summary.failed);
            println!("{:-<50}", "");
            for (name, metric) in &summary.metrics {
                println!(
                    "  {} - Mean: {:.3}, Min: {:.3}, Max: {:.3}",
                    name, metric.mean, metric.min, metric.max
                );
            }
        }
    }

    println!("\n{:=<50}", "");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_of_numeric_metrics() {
        let results = vec![
            RunResult::success().with_metric("runtime_in_s", 1.0).with_metric("host", "a"),
            RunResult::success().with_metric("runtime_in_s", 3.0),
            RunResult::failure("timeout"),
        ];

        let summary = SeriesSummary::from_results("node1", &results);

        assert_eq!(summary.runs, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.metrics.len(), 1);
        let runtime = &summary.metrics["runtime_in_s"];
        assert_eq!(runtime.mean, 2.0);
        assert_eq!(runtime.min, 1.0);
        assert_eq!(runtime.max, 3.0);
    }

    #[test]
    fn test_summarize_keeps_label_order() {
        let mut store = ResultStore::new();
        store.push("warm_b", RunResult::success());
        store.push("cold_a", RunResult::success());

        let labels: Vec<_> = summarize(&store).into_iter().map(|s| s.label).collect();
        assert_eq!(labels, vec!["warm_b", "cold_a"]);
    }
}
