//! Structured JSON dump of a benchmark's tags and results

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{ResultStore, SinkError, Tags};

/// Serializable tree written to `<results_path>/<id>_<name>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultFile {
    pub tags: Tags,
    /// Absent for benchmarks that only reference other result files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultStore>,
}

impl ResultFile {
    pub fn new(tags: Tags, results: ResultStore) -> Self {
        Self {
            tags,
            results: Some(results),
        }
    }

    /// A file carrying tags only
    pub fn tags_only(tags: Tags) -> Self {
        Self { tags, results: None }
    }

    /// Write as pretty JSON into `directory` under `file_name`
    pub fn write_to(&self, directory: impl AsRef<Path>, file_name: &str) -> Result<PathBuf, SinkError> {
        let path = directory.as_ref().join(file_name);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    /// Read a previously written result file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
