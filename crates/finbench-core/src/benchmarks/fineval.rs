use anyhow::Result;
use serde_json::Value;

use super::{question_case, text_field};
use crate::benchmark::{Benchmark, Matcher};
use crate::scorers::choice::ABCD;
use crate::types::TestCase;

const INSTRUCTION: &str = "你是一个金融知识专家，下面是一道中国金融相关考试的问题，请选出其中的正确答案。你可以一步步思考，并在最后将最终答案的选项放入 \\boxed{}";

/// FinEval: Chinese finance exam questions, four choices, four subject subsets.
pub struct FinEval;

impl Benchmark for FinEval {
    fn name(&self) -> &'static str {
        "fineval"
    }

    fn subsets(&self) -> &'static [&'static str] {
        &["accounting", "finance", "economy", "certificate"]
    }

    fn data_file(&self, subset: &str) -> String {
        format!("fineval_{subset}.jsonl")
    }

    /// Exports that keep the options in separate `A`..`D` columns get them
    /// appended to the question.
    fn to_case(&self, record: &Value) -> Result<TestCase> {
        let mut question = format!("{INSTRUCTION}\n{}", text_field(record, "question")?);
        let options: Vec<(char, String)> = ABCD
            .iter()
            .filter_map(|c| text_field(record, &c.to_string()).ok().map(|text| (*c, text)))
            .collect();
        if !options.is_empty() {
            question.push_str("\n选项:\n");
            for (letter, text) in options {
                question.push_str(&format!("({letter}): {text}\n"));
            }
        }
        Ok(question_case(question, text_field(record, "answer")?))
    }

    fn build_prompt(&self, case: &TestCase) -> String {
        format!("问题: {}\n", case.question().unwrap_or_default())
    }

    fn matcher(&self) -> Matcher {
        Matcher::Choice(ABCD)
    }
}
