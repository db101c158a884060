use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Instant, SystemTime};
use tabled::Tabled;

/// Normalized model reply.
///
/// Streamed and buffered responses reduce to the same value, so everything
/// downstream of the inference client only ever sees this shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalResponse {
    /// Completion text of the first choice.
    pub content: String,

    /// Secondary "thinking" text, present only when the server sent any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Usage object exactly as the server reported it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
}

impl CanonicalResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            reasoning: None,
            usage: None,
        }
    }

    /// Reads OpenAI-style counters (`prompt_tokens`, `completion_tokens`,
    /// `total_tokens`) out of the raw usage object.
    pub fn token_usage(&self) -> Option<TokenUsage> {
        let usage = self.usage.as_ref()?.as_object()?;
        let count = |key: &str| usage.get(key).and_then(Value::as_u64).map(|n| n as u32);

        let input_tokens = count("prompt_tokens").or_else(|| count("input_tokens"))?;
        let output_tokens = count("completion_tokens")
            .or_else(|| count("output_tokens"))
            .unwrap_or(0);
        let total_tokens = count("total_tokens").unwrap_or(input_tokens + output_tokens);

        Some(TokenUsage {
            input_tokens,
            output_tokens,
            total_tokens,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// Record of one inference call (prediction or judge) made while evaluating an item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallTrace {
    pub start: SystemTime,

    pub duration_ms: u64,

    pub model: String,

    /// Number of HTTP attempts the call needed, including the final one.
    pub attempts: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,

    /// Error of the last attempt when the call gave up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallTrace {
    /// Starts timing a call against `model`.
    pub fn begin(model: impl Into<String>) -> CallTimer {
        CallTimer {
            start: SystemTime::now(),
            started: Instant::now(),
            model: model.into(),
        }
    }
}

/// In-flight half of a [`CallTrace`].
pub struct CallTimer {
    start: SystemTime,
    started: Instant,
    model: String,
}

impl CallTimer {
    pub fn succeeded(self, attempts: u32, usage: Option<TokenUsage>) -> CallTrace {
        self.finish(attempts, usage, None)
    }

    pub fn failed(self, attempts: u32, error: impl Into<String>) -> CallTrace {
        self.finish(attempts, None, Some(error.into()))
    }

    fn finish(self, attempts: u32, usage: Option<TokenUsage>, error: Option<String>) -> CallTrace {
        CallTrace {
            start: self.start,
            duration_ms: self.started.elapsed().as_millis() as u64,
            model: self.model,
            attempts,
            usage,
            error,
        }
    }
}

/// One benchmark item. `input` holds the benchmark-specific fields
/// (question, context, table, ...), `expected` the gold answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
	pub id: Option<String>,
	pub input: Value,
	pub expected: Value,
}

impl TestCase {
	pub fn new(input: Value, expected: Value) -> Self {
		Self { id: None, input, expected }
	}

	pub fn with_id(id: impl Into<String>, input: Value, expected: Value) -> Self {
		Self { id: Some(id.into()), input, expected }
	}

	/// The `question` field of the input, or the whole input when it is a plain string.
	pub fn question(&self) -> Option<&str> {
		match &self.input {
			Value::String(s) => Some(s.as_str()),
			other => other.get("question").and_then(Value::as_str),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
	pub name: String,
	pub value: f64,
	pub passed: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
	pub case: TestCase,
	pub output: Value,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	pub scores: Vec<Score>,
	#[serde(skip_serializing_if = "Vec::is_empty", default)]
	pub calls: Vec<CallTrace>,
}

impl CaseResult {
	pub fn all_passed(&self) -> bool {
		!self.scores.is_empty() && self.scores.iter().all(|s| s.passed)
	}

	pub fn mean_score(&self) -> f64 {
		if self.scores.is_empty() {
			return 0.0;
		}
		self.scores.iter().map(|s| s.value).sum::<f64>() / self.scores.len() as f64
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSummary {
	/// Items that were run (succeeded + errored).
	pub total: usize,
	pub passed: usize,
	/// Items whose task failed, e.g. the inference call exhausted its retries.
	pub errored: usize,
	/// Items never scheduled because the batch deadline elapsed.
	#[serde(default)]
	pub abandoned: usize,
	pub pass_rate: f64,
	/// Mean score over every item that was run; errored items count as 0.
	pub avg_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalResult {
	pub cases: Vec<CaseResult>,
	pub summary: EvalSummary,
}

#[derive(Debug, Clone, Tabled)]
struct SummaryRow {
	id: String,
	passed: String,
	score: String,
	expected: String,
	output: String,
	calls: String,
}

impl EvalResult {
	pub fn summarize(cases: &[CaseResult], abandoned: usize) -> EvalSummary {
		let total = cases.len();
		let passed = cases.iter().filter(|cr| cr.all_passed()).count();
		let errored = cases.iter().filter(|cr| cr.error.is_some()).count();
		let score_sum: f64 = cases.iter().map(CaseResult::mean_score).sum();

		let pass_rate = if total == 0 { 0.0 } else { passed as f64 / total as f64 };
		let avg_score = if total == 0 { 0.0 } else { score_sum / total as f64 };

		EvalSummary { total, passed, errored, abandoned, pass_rate, avg_score }
	}

	pub fn summary_table(&self) -> String {
		use tabled::Table;
		let rows: Vec<SummaryRow> = self.cases.iter().map(|cr| {
			let id = cr.case.id.clone().unwrap_or_else(|| "-".to_string());
			let passed = if cr.all_passed() { "✓" } else if cr.error.is_some() { "!" } else { " " };
			let output = match &cr.error {
				Some(err) => format!("error: {err}"),
				None => value_preview(&cr.output),
			};
			let attempts: u32 = cr.calls.iter().map(|c| c.attempts).sum();

			SummaryRow {
				id,
				passed: passed.to_string(),
				score: format!("{:.3}", cr.mean_score()),
				expected: truncate(value_preview(&cr.case.expected), 48),
				output: truncate(output, 64),
				calls: format!("{} ({} attempts)", cr.calls.len(), attempts),
			}
		}).collect();

		let table = Table::new(rows);

		let mut summary_text = format!(
			"Total: {}  Passed: {}  Errored: {}  Pass rate: {:.1}%  Avg score: {:.3}",
			self.summary.total,
			self.summary.passed,
			self.summary.errored,
			self.summary.pass_rate * 100.0,
			self.summary.avg_score
		);
		if self.summary.abandoned > 0 {
			summary_text.push_str(&format!("  Abandoned: {}", self.summary.abandoned));
		}

		format!("{}\n\n{}\n", table, summary_text)
	}
}

fn value_preview(v: &Value) -> String {
	match v {
		Value::String(s) => s.clone(),
		_ => v.to_string(),
	}
}

fn truncate(s: String, max_len: usize) -> String {
	let s = s.replace('\n', " ");
	if s.chars().count() <= max_len {
		return s;
	}
	let mut truncated = s.chars().take(max_len.saturating_sub(1)).collect::<String>();
	truncated.push('…');
	truncated
}
