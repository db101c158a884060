use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use crate::benchmark::Benchmark;
use crate::scorer::{gold_text, value_text, Scorer};
use crate::types::{Score, TestCase};

pub const ABCD: &[char] = &['A', 'B', 'C', 'D'];

/// Pulls an option letter out of free text.
///
/// Checked in order: the last `boxed{X}`, the last "答案是 X" / "answer is X",
/// then the first letter that stands on its own.
#[derive(Debug, Clone)]
pub struct OptionParser {
	boxed: Regex,
	labelled: Regex,
	standalone: Regex,
}

impl OptionParser {
	pub fn new(choices: &[char]) -> Result<Self> {
		let class: String = choices.iter().map(|c| regex::escape(&c.to_string())).collect();
		let tail = r"(?:[^A-Za-z]|$)";
		let compile = |pattern: String| Regex::new(&pattern).with_context(|| format!("option pattern {pattern:?}"));
		Ok(Self {
			boxed: compile(format!(r"boxed\{{\s*(?:\\text\{{)?[(（]?\s*([{class}]){tail}"))?,
			labelled: compile(format!(
				r"(?:答案|[Aa]nswer)\s*(?:是|为|is|:|：)+\s*[(（]?\s*([{class}]){tail}"
			))?,
			standalone: compile(format!(r"(?:^|[^A-Za-z])([{class}]){tail}"))?,
		})
	}

	pub fn parse(&self, text: &str) -> Option<char> {
		let last = |re: &Regex| re.captures_iter(text).last().and_then(|c| c.get(1));
		last(&self.boxed)
			.or_else(|| last(&self.labelled))
			.or_else(|| self.standalone.captures(text).and_then(|c| c.get(1)))
			.and_then(|m| m.as_str().chars().next())
	}
}

/// Multiple-choice scorer: the parsed option letter must equal the gold letter.
pub struct ChoiceScorer {
	parser: OptionParser,
	gold: Option<Arc<dyn Benchmark>>,
}

impl ChoiceScorer {
	pub fn new(choices: &[char]) -> Result<Self> {
		Ok(Self { parser: OptionParser::new(choices)?, gold: None })
	}

	/// Reads gold answers through `benchmark`'s extractor.
	pub fn with_gold_answer(mut self, benchmark: Arc<dyn Benchmark>) -> Self {
		self.gold = Some(benchmark);
		self
	}
}

#[async_trait]
impl Scorer for ChoiceScorer {
	fn name(&self) -> &'static str {
		"choice"
	}

	async fn score(&self, case: &TestCase, output: &Value) -> Result<Score> {
		let gold = self.parser.parse(gold_text(self.gold.as_ref(), case).trim());
		let parsed = self.parser.parse(&value_text(output));
		let passed = gold.is_some() && gold == parsed;
		Ok(Score {
			name: self.name().to_string(),
			value: if passed { 1.0 } else { 0.0 },
			passed,
			details: Some(json!({ "gold": gold, "parsed": parsed })),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parser() -> OptionParser {
		OptionParser::new(ABCD).unwrap()
	}

	#[test]
	fn boxed_answer_wins() {
		let text = "选项A看似正确，但是考虑到税费，最终答案为 \\boxed{C}";
		assert_eq!(parser().parse(text), Some('C'));
		assert_eq!(parser().parse("\\boxed{\\text{B}}"), Some('B'));
	}

	#[test]
	fn last_boxed_is_the_final_answer() {
		assert_eq!(parser().parse("first boxed{A}, corrected: boxed{D}"), Some('D'));
	}

	#[test]
	fn labelled_answer() {
		assert_eq!(parser().parse("分析如下……所以答案是 B。"), Some('B'));
		assert_eq!(parser().parse("Therefore the answer is: (D)"), Some('D'));
		assert_eq!(parser().parse("正确答案：A"), Some('A'));
	}

	#[test]
	fn standalone_letter_fallback() {
		assert_eq!(parser().parse("C"), Some('C'));
		assert_eq!(parser().parse("我选C"), Some('C'));
		assert_eq!(parser().parse("BAD CAB"), None);
		assert_eq!(parser().parse("无法判断"), None);
	}

	#[tokio::test]
	async fn scores_against_gold_letter() {
		let scorer = ChoiceScorer::new(ABCD).unwrap();
		let case = TestCase::new(json!({"question": "q"}), json!("B"));

		let hit = scorer.score(&case, &json!("综上，答案是B")).await.unwrap();
		assert!(hit.passed);
		assert_eq!(hit.details, Some(json!({"gold": "B", "parsed": "B"})));

		let miss = scorer.score(&case, &json!("boxed{A}")).await.unwrap();
		assert!(!miss.passed);
		assert_eq!(miss.value, 0.0);

		let unparsed = scorer.score(&case, &json!("不确定")).await.unwrap();
		assert!(!unparsed.passed);
	}

	struct LabelledGold;

	impl Benchmark for LabelledGold {
		fn name(&self) -> &'static str {
			"labelled"
		}

		fn data_file(&self, _subset: &str) -> String {
			"labelled.jsonl".to_string()
		}

		fn to_case(&self, record: &Value) -> Result<TestCase> {
			Ok(TestCase::new(record.clone(), Value::Null))
		}

		fn gold_answer(&self, case: &TestCase) -> String {
			case.expected["label"].as_str().unwrap_or_default().to_string()
		}

		fn matcher(&self) -> crate::benchmark::Matcher {
			crate::benchmark::Matcher::Choice(ABCD)
		}
	}

	#[tokio::test]
	async fn gold_read_through_benchmark_extractor() {
		let case = TestCase::new(json!({"question": "q"}), json!({"key": "D", "label": "C"}));

		let plain = ChoiceScorer::new(ABCD).unwrap();
		assert!(!plain.score(&case, &json!("boxed{C}")).await.unwrap().passed);

		let scorer = ChoiceScorer::new(ABCD).unwrap().with_gold_answer(Arc::new(LabelledGold));
		let score = scorer.score(&case, &json!("boxed{C}")).await.unwrap();
		assert!(score.passed);
		assert_eq!(score.details, Some(json!({"gold": "C", "parsed": "C"})));
	}
}
