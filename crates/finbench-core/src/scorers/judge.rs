use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::judge::{GradingRequest, JudgeDispatcher, JudgeTemplate};
use crate::benchmark::Benchmark;
use crate::scorer::{gold_text, value_text, Scorer};
use crate::types::{Score, TestCase};

/// Grades the prediction with a second model call.
///
/// A full score passes. Judge failures come back as a 0.0 score with the
/// reason in `details`, never as an error.
pub struct JudgeScorer {
	dispatcher: Arc<JudgeDispatcher>,
	template: JudgeTemplate,
	pass_threshold: f64,
	gold: Option<Arc<dyn Benchmark>>,
}

impl JudgeScorer {
	pub fn new(dispatcher: Arc<JudgeDispatcher>, template: JudgeTemplate) -> Self {
		Self { dispatcher, template, pass_threshold: 1.0, gold: None }
	}

	/// Reads gold answers through `benchmark`'s extractor.
	pub fn with_gold_answer(mut self, benchmark: Arc<dyn Benchmark>) -> Self {
		self.gold = Some(benchmark);
		self
	}

	pub fn with_pass_threshold(mut self, threshold: f64) -> Self {
		self.pass_threshold = threshold;
		self
	}
}

#[async_trait]
impl Scorer for JudgeScorer {
	fn name(&self) -> &'static str {
		"llm_judge"
	}

	async fn score(&self, case: &TestCase, output: &Value) -> Result<Score> {
		let gold = gold_text(self.gold.as_ref(), case);
		let predicted = value_text(output);
		let request = GradingRequest {
			gold: gold.trim(),
			predicted: &predicted,
			question: case.question(),
			template: &self.template,
		};
		let verdict = self.dispatcher.judge(&request).await;
		let value = verdict.score();

		Ok(Score {
			name: self.name().to_string(),
			value,
			passed: value >= self.pass_threshold,
			details: Some(json!({
				"judge_model": self.dispatcher.model(),
				"verdict": verdict,
			})),
		})
	}
}
