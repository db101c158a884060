use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future;
use futures::stream::{self, StreamExt};
use serde_json::json;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::datasource::DataSource;
use crate::scorer::Scorer;
use crate::task::Task;
use crate::trace::collect_calls;
use crate::types::{CaseResult, EvalResult, Score, TestCase};

pub struct EvalBuilder {
	data_source: Option<Arc<dyn DataSource>>,
	task: Option<Arc<dyn Task>>,
	scorers: Vec<Arc<dyn Scorer>>,
	concurrency: usize,
	batch_timeout: Option<Duration>,
}

impl EvalBuilder {
	pub fn new() -> Self {
		Self {
			data_source: None,
			task: None,
			scorers: Vec::new(),
			concurrency: 8,
			batch_timeout: None,
		}
	}

	pub fn data_source(mut self, data_source: Arc<dyn DataSource>) -> Self {
		self.data_source = Some(data_source);
		self
	}

	pub fn task(mut self, task: Arc<dyn Task>) -> Self {
		self.task = Some(task);
		self
	}

	pub fn scorers<I>(mut self, scorers: I) -> Self
	where
		I: IntoIterator<Item = Arc<dyn Scorer>>,
	{
		self.scorers = scorers.into_iter().collect();
		self
	}

	pub fn add_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
		self.scorers.push(scorer);
		self
	}

	pub fn concurrency(mut self, n: usize) -> Self {
		self.concurrency = n.max(1);
		self
	}

	/// Once this much time has passed, no new items start. Items already in
	/// flight finish; the rest are reported as abandoned.
	pub fn batch_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.batch_timeout = timeout;
		self
	}

	pub fn build(self) -> Result<Eval> {
		Ok(Eval {
			data_source: self.data_source.ok_or_else(|| anyhow::anyhow!("data_source must be set"))?,
			task: self.task.ok_or_else(|| anyhow::anyhow!("task must be set"))?,
			scorers: self.scorers,
			concurrency: self.concurrency,
			batch_timeout: self.batch_timeout,
		})
	}
}

impl Default for EvalBuilder {
	fn default() -> Self {
		Self::new()
	}
}

pub struct Eval {
	data_source: Arc<dyn DataSource>,
	task: Arc<dyn Task>,
	scorers: Vec<Arc<dyn Scorer>>,
	concurrency: usize,
	batch_timeout: Option<Duration>,
}

impl Eval {
	pub fn builder() -> EvalBuilder {
		EvalBuilder::new()
	}

	pub async fn run(&self) -> Result<EvalResult> {
		let cases = self.data_source.load().await?;
		Ok(self.run_cases(cases).await)
	}

	/// Runs every case through task and scorers with at most `concurrency`
	/// items in flight. Results come back in completion order.
	pub async fn run_cases(&self, cases: Vec<TestCase>) -> EvalResult {
		let total = cases.len();
		let deadline = self.batch_timeout.map(|t| Instant::now() + t);
		info!(items = total, concurrency = self.concurrency, "evaluation started");

		let task = self.task.clone();
		let scorers = self.scorers.clone();
		let results: Vec<CaseResult> = stream::iter(cases)
			.take_while(move |_| future::ready(deadline.map_or(true, |d| Instant::now() < d)))
			.map(move |case| {
				let task = task.clone();
				let scorers = scorers.clone();
				async move {
					let (mut result, calls) = collect_calls(evaluate(task.as_ref(), &scorers, case)).await;
					result.calls = calls;
					result
				}
			})
			.buffer_unordered(self.concurrency)
			.collect()
			.await;

		let abandoned = total - results.len();
		if abandoned > 0 {
			warn!(abandoned, "batch deadline elapsed, remaining items were not started");
		}
		let summary = EvalResult::summarize(&results, abandoned);
		info!(
			total = summary.total,
			passed = summary.passed,
			errored = summary.errored,
			avg_score = summary.avg_score,
			"evaluation finished"
		);
		EvalResult { cases: results, summary }
	}
}

async fn evaluate(task: &dyn Task, scorers: &[Arc<dyn Scorer>], case: TestCase) -> CaseResult {
	match task.run(&case).await {
		Ok(output) => {
			let mut scores = Vec::with_capacity(scorers.len());
			for s in scorers {
				match s.score(&case, &output).await {
					Ok(score) => scores.push(score),
					Err(err) => scores.push(Score {
						name: s.name().to_string(),
						value: 0.0,
						passed: false,
						details: Some(json!({ "error": err.to_string() })),
					}),
				}
			}
			CaseResult {
				case,
				output,
				error: None,
				scores,
				calls: Vec::new(),
			}
		}
		Err(err) => {
			warn!(id = case.id.as_deref().unwrap_or("-"), error = %err, "item failed");
			CaseResult {
				case,
				output: serde_json::Value::Null,
				error: Some(err.to_string()),
				scores: Vec::new(),
				calls: Vec::new(),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::datasource::VecDataSource;
	use crate::scorers::exact::ExactMatchScorer;
	use crate::task::from_async_fn;
	use crate::trace::{record_call, CallTrace};
	use serde_json::Value;
	use std::sync::atomic::{AtomicUsize, Ordering};

	fn cases(n: usize) -> Vec<TestCase> {
		(0..n)
			.map(|i| TestCase::with_id(format!("c{i}"), json!({"question": i.to_string()}), json!(i.to_string())))
			.collect()
	}

	#[tokio::test]
	async fn failures_stay_per_item() {
		let task = from_async_fn(|case: &TestCase| {
			let q = case.question().unwrap_or_default().to_string();
			async move {
				record_call(CallTrace::begin("m").succeeded(1, None));
				if q == "1" {
					anyhow::bail!("call failed after 5 attempt(s): HTTP 503: busy");
				}
				Ok(Value::String(q))
			}
		});
		let eval = Eval::builder()
			.data_source(Arc::new(VecDataSource::new(cases(4))))
			.task(task)
			.add_scorer(Arc::new(ExactMatchScorer::default()))
			.concurrency(2)
			.build()
			.unwrap();

		let result = eval.run().await.unwrap();
		assert_eq!(result.summary.total, 4);
		assert_eq!(result.summary.passed, 3);
		assert_eq!(result.summary.errored, 1);
		assert_eq!(result.summary.abandoned, 0);
		assert!(result.cases.iter().all(|c| c.calls.len() == 1));

		let failed = result.cases.iter().find(|c| c.error.is_some()).unwrap();
		assert_eq!(failed.case.id.as_deref(), Some("c1"));
		assert!(failed.scores.is_empty());
	}

	#[tokio::test]
	async fn concurrency_is_bounded() {
		let in_flight = Arc::new(AtomicUsize::new(0));
		let peak = Arc::new(AtomicUsize::new(0));
		let (f, p) = (in_flight.clone(), peak.clone());
		let task = from_async_fn(move |case: &TestCase| {
			let (f, p) = (f.clone(), p.clone());
			let expected = case.expected.clone();
			async move {
				let now = f.fetch_add(1, Ordering::SeqCst) + 1;
				p.fetch_max(now, Ordering::SeqCst);
				tokio::time::sleep(Duration::from_millis(10)).await;
				f.fetch_sub(1, Ordering::SeqCst);
				Ok(expected)
			}
		});
		let eval = Eval::builder()
			.data_source(Arc::new(VecDataSource::new(cases(12))))
			.task(task)
			.concurrency(3)
			.build()
			.unwrap();

		let result = eval.run().await.unwrap();
		assert_eq!(result.cases.len(), 12);
		assert!(peak.load(Ordering::SeqCst) <= 3);
	}

	#[tokio::test]
	async fn deadline_abandons_unstarted_items() {
		let task = from_async_fn(|case: &TestCase| {
			let expected = case.expected.clone();
			async move {
				tokio::time::sleep(Duration::from_millis(40)).await;
				Ok(expected)
			}
		});
		let eval = Eval::builder()
			.data_source(Arc::new(VecDataSource::new(cases(20))))
			.task(task)
			.add_scorer(Arc::new(ExactMatchScorer::default()))
			.concurrency(1)
			.batch_timeout(Some(Duration::from_millis(100)))
			.build()
			.unwrap();

		let result = eval.run().await.unwrap();
		assert!(result.summary.abandoned > 0);
		assert_eq!(result.summary.total + result.summary.abandoned, 20);
		// Items that did start ran to completion.
		assert_eq!(result.summary.passed, result.summary.total);
	}

	#[tokio::test]
	async fn scorer_errors_become_zero_scores() {
		struct Broken;

		#[async_trait::async_trait]
		impl Scorer for Broken {
			fn name(&self) -> &'static str {
				"broken"
			}

			async fn score(&self, _case: &TestCase, _output: &Value) -> Result<Score> {
				anyhow::bail!("no gold answer")
			}
		}

		let eval = Eval::builder()
			.data_source(Arc::new(VecDataSource::new(cases(1))))
			.task(from_async_fn(|_case: &TestCase| async { Ok(json!("0")) }))
			.add_scorer(Arc::new(Broken))
			.build()
			.unwrap();
		let result = eval.run().await.unwrap();
		let score = &result.cases[0].scores[0];
		assert_eq!(score.value, 0.0);
		assert_eq!(score.details, Some(json!({"error": "no gold answer"})));
	}
}
