use anyhow::{anyhow, Result};
use serde_json::Value;

use super::{question_case, text_field};
use crate::benchmark::{Benchmark, Matcher};
use crate::judge::JudgeTemplate;
use crate::types::TestCase;

const JUDGE_SYSTEM: &str = "我会给你一个'标准回答'与一个'模型回答'，请判断'模型回答'是否与'标准回答'的含义一致。你只需要将模型回答的最终答案和标准回答进行匹配，如果一致，输出1，否则输出0。\n    # 回复要求：按照以上标准给出判断理由，并在最后将判断结果放在boxed{}中，例如boxed{1} or boxed{0}\n    ";

const JUDGE_USER: &str = "标准回答: {gold}\n模型回答: {pred}";

/// FinQA: numeric reasoning over an earnings report's text and table.
pub struct FinQa;

impl Benchmark for FinQa {
    fn name(&self) -> &'static str {
        "FinQA"
    }

    fn data_file(&self, _subset: &str) -> String {
        "test.json".to_string()
    }

    fn to_case(&self, record: &Value) -> Result<TestCase> {
        let qa = record
            .get("qa")
            .ok_or_else(|| anyhow!("record is missing 'qa'"))?;
        let question = text_field(qa, "question")?;
        let answer = text_field(qa, "answer").unwrap_or_default();

        let prompt = format!(
            "Please answer the question based on all the information provided below:\n\n\
             Document: {filename}\n\n\
             ID: {id}\n\n\
             Previous Text:\n{pre}\n\n\
             Table Data:\n{table}\n\n\
             Following Text:\n{post}\n\n\
             Question: {question}\n\n\
             Please reason step by step, following the chain-of-thought logic. Extract relevant data from the table, calculate step by step, and put the final answer in \\boxed{{}}.\n\n\
             Note: Before finalizing your answer, you must verify your answer to ensure its accuracy!\n\
             Your reasoning should not be less than 2048 tokens.\n",
            filename = text_field(record, "filename").unwrap_or_default(),
            id = text_field(record, "id").unwrap_or_default(),
            pre = join_lines(record.get("pre_text")),
            table = render_table(record.get("table")),
            post = join_lines(record.get("post_text")),
        );
        Ok(question_case(prompt, answer))
    }

    fn matcher(&self) -> Matcher {
        Matcher::Judge(JudgeTemplate::binary(Some(JUDGE_SYSTEM), JUDGE_USER))
    }
}

fn join_lines(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(lines)) => lines
            .iter()
            .map(|l| l.as_str().map(str::to_string).unwrap_or_else(|| l.to_string()))
            .collect::<Vec<_>>()
            .join("\n"),
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

/// One table row per line, cells separated by `|`.
fn render_table(value: Option<&Value>) -> String {
    let Some(Value::Array(rows)) = value else {
        return String::new();
    };
    rows.iter()
        .map(|row| match row {
            Value::Array(cells) => cells
                .iter()
                .map(|c| c.as_str().map(str::to_string).unwrap_or_else(|| c.to_string()))
                .collect::<Vec<_>>()
                .join(" | "),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Value {
        json!({
            "filename": "ADI/2009/page_49.pdf",
            "id": "ADI/2009/page_49.pdf-1",
            "pre_text": ["interest rate swaps", "in millions"],
            "post_text": ["end of note"],
            "table": [["", "2009", "2008"], ["fair value", "$ 100", "$ 80"]],
            "qa": {"question": "what is the percent change?", "answer": "25%"}
        })
    }

    #[test]
    fn prompt_sections() {
        let case = FinQa.to_case(&record()).unwrap();
        let prompt = FinQa.build_prompt(&case);
        assert!(prompt.starts_with("Please answer the question based on all the information provided below:\n\nDocument: ADI/2009/page_49.pdf\n\nID: ADI/2009/page_49.pdf-1\n\n"));
        assert!(prompt.contains("Previous Text:\ninterest rate swaps\nin millions\n\n"));
        assert!(prompt.contains("Table Data:\n | 2009 | 2008\nfair value | $ 100 | $ 80\n\n"));
        assert!(prompt.contains("Following Text:\nend of note\n\nQuestion: what is the percent change?\n\n"));
        assert!(prompt.contains("put the final answer in \\boxed{}."));
        assert_eq!(FinQa.gold_answer(&case), "25%");
    }

    #[test]
    fn missing_qa_is_an_error() {
        assert!(FinQa.to_case(&json!({"pre_text": []})).is_err());
    }
}
