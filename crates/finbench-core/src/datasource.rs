use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::benchmark::Benchmark;
use crate::types::TestCase;

#[async_trait]
pub trait DataSource: Send + Sync {
    async fn load(&self) -> Result<Vec<TestCase>>;
}

pub struct VecDataSource {
    cases: Vec<TestCase>,
}

impl VecDataSource {
    pub fn new(cases: Vec<TestCase>) -> Self {
        Self { cases }
    }
}

#[async_trait]
impl DataSource for VecDataSource {
    async fn load(&self) -> Result<Vec<TestCase>> {
        Ok(self.cases.clone())
    }
}

/// Cases of one benchmark, read from `<dir>/<data_file(subset)>` for each
/// selected subset.
///
/// Files hold either a JSON array of records or one record per line.
pub struct BenchmarkDataSource {
    benchmark: Arc<dyn Benchmark>,
    dir: PathBuf,
    subsets: Vec<String>,
    limit: Option<usize>,
}

impl BenchmarkDataSource {
    pub fn new(benchmark: Arc<dyn Benchmark>, dir: impl Into<PathBuf>) -> Self {
        let subsets = benchmark.subsets().iter().map(|s| s.to_string()).collect();
        Self {
            benchmark,
            dir: dir.into(),
            subsets,
            limit: None,
        }
    }

    /// Restricts loading to these subsets; an empty list keeps all of them.
    pub fn subsets<I, S>(mut self, subsets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let chosen: Vec<String> = subsets.into_iter().map(Into::into).collect();
        if !chosen.is_empty() {
            self.subsets = chosen;
        }
        self
    }

    /// At most `n` items per subset.
    pub fn limit(mut self, n: Option<usize>) -> Self {
        self.limit = n;
        self
    }
}

#[async_trait]
impl DataSource for BenchmarkDataSource {
    async fn load(&self) -> Result<Vec<TestCase>> {
        let mut cases = Vec::new();
        for subset in &self.subsets {
            if !self.benchmark.subsets().contains(&subset.as_str()) {
                return Err(anyhow!(
                    "{} has no subset '{subset}' (available: {})",
                    self.benchmark.name(),
                    self.benchmark.subsets().join(", ")
                ));
            }
            let path = self.dir.join(self.benchmark.data_file(subset));
            let records = read_records(&path).await?;
            let take = self.limit.unwrap_or(records.len()).min(records.len());
            debug!(benchmark = self.benchmark.name(), subset = %subset, total = records.len(), take, "records read");

            for (idx, record) in records.iter().take(take).enumerate() {
                let mut case = self.benchmark.to_case(record).with_context(|| {
                    format!("{}: record {} of {}", self.benchmark.name(), idx + 1, path.display())
                })?;
                if case.id.is_none() {
                    case.id = Some(format!("{subset}-{idx}"));
                }
                cases.push(case);
            }
        }
        info!(benchmark = self.benchmark.name(), cases = cases.len(), "dataset loaded");
        Ok(cases)
    }
}

/// Records from a JSON array file or a JSONL file.
pub async fn read_records(path: &Path) -> Result<Vec<Value>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;
    parse_records(&content).with_context(|| format!("Failed to parse {:?}", path))
}

fn parse_records(content: &str) -> Result<Vec<Value>> {
    let trimmed = content.trim_start_matches('\u{feff}').trim();
    if trimmed.starts_with('[') {
        let value: Value = serde_json::from_str(trimmed).context("Invalid JSON array")?;
        return match value {
            Value::Array(items) => Ok(items),
            _ => Err(anyhow!("expected a JSON array")),
        };
    }

    let mut records = Vec::new();
    for (idx, line) in trimmed.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line)
            .with_context(|| format!("Invalid JSON on line {}", idx + 1))?;
        if !value.is_object() {
            return Err(anyhow!("Line {}: expected object", idx + 1));
        }
        records.push(value);
    }
    Ok(records)
}
