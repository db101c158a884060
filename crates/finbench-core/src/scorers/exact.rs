use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::benchmark::Benchmark;
use crate::scorer::{gold_text, value_text, Scorer};
use crate::types::{Score, TestCase};

/// Gold and prediction must be equal once surrounding whitespace is removed.
#[derive(Default)]
pub struct ExactMatchScorer {
	gold: Option<Arc<dyn Benchmark>>,
}

impl ExactMatchScorer {
	/// Reads gold answers through `benchmark`'s extractor.
	pub fn with_gold_answer(mut self, benchmark: Arc<dyn Benchmark>) -> Self {
		self.gold = Some(benchmark);
		self
	}
}

#[async_trait]
impl Scorer for ExactMatchScorer {
	fn name(&self) -> &'static str {
		"exact_match"
	}

	async fn score(&self, case: &TestCase, output: &Value) -> Result<Score> {
		let passed = gold_text(self.gold.as_ref(), case).trim() == value_text(output).trim();
		let value = if passed { 1.0 } else { 0.0 };
		Ok(Score {
			name: self.name().to_string(),
			value,
			passed,
			details: None,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[tokio::test]
	async fn trims_before_comparing() {
		let case = TestCase::new(json!("q"), json!("0"));
		let score = ExactMatchScorer::default().score(&case, &json!(" 0\n")).await.unwrap();
		assert!(score.passed);
		assert_eq!(score.value, 1.0);
	}

	#[tokio::test]
	async fn numbers_compare_as_text() {
		let case = TestCase::new(json!("q"), json!(2));
		assert!(ExactMatchScorer::default().score(&case, &json!("2")).await.unwrap().passed);
		assert!(!ExactMatchScorer::default().score(&case, &json!("1")).await.unwrap().passed);
	}
}
