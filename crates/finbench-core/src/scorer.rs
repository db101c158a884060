use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::benchmark::Benchmark;
use crate::types::{Score, TestCase};

#[async_trait]
pub trait Scorer: Send + Sync {
	fn name(&self) -> &'static str;

	/// Scores `output` against the case. Implementations that grade with a
	/// model read the question from `case.input`.
	async fn score(&self, case: &TestCase, output: &Value) -> Result<Score>;
}

/// Gold answer of a case, through the benchmark's extractor when one is
/// attached and from `case.expected` otherwise.
pub(crate) fn gold_text(benchmark: Option<&Arc<dyn Benchmark>>, case: &TestCase) -> String {
	match benchmark {
		Some(benchmark) => benchmark.gold_answer(case),
		None => value_text(&case.expected),
	}
}

/// Plain text of a JSON value: strings as-is, everything else serialized.
pub(crate) fn value_text(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		Value::Null => String::new(),
		other => other.to_string(),
	}
}
