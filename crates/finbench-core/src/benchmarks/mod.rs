//! The finance benchmarks that ship with finbench.

pub mod ant_finance;
pub mod finance_instruct;
pub mod finance_qt;
pub mod fineval;
pub mod fineval_definition;
pub mod finqa;
pub mod senti_data;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use crate::types::TestCase;

/// Text of a record field. Numbers and booleans are rendered, so labels
/// stored as `0`/`1` in one export and `"0"`/`"1"` in another read the same.
pub(crate) fn text_field(record: &Value, key: &str) -> Result<String> {
    match record.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(v @ (Value::Number(_) | Value::Bool(_))) => Ok(v.to_string()),
        Some(Value::Null) | None => Err(anyhow!("record is missing '{key}'")),
        Some(other) => Err(anyhow!("'{key}' must be text, got {other}")),
    }
}

pub(crate) fn question_case(question: String, answer: String) -> TestCase {
    TestCase::new(json!({ "question": question }), Value::String(answer))
}

/// `instruction` → question, `output` → answer.
pub(crate) fn instruction_case(record: &Value) -> Result<TestCase> {
    Ok(question_case(
        text_field(record, "instruction")?,
        text_field(record, "output")?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_fields_read_as_text() {
        let record = json!({"label": 2, "text": "rates up", "flag": null});
        assert_eq!(text_field(&record, "label").unwrap(), "2");
        assert_eq!(text_field(&record, "text").unwrap(), "rates up");
        assert!(text_field(&record, "flag").is_err());
        assert!(text_field(&record, "missing").is_err());
    }

    #[test]
    fn instruction_records() {
        let case = instruction_case(&json!({"instruction": "什么是久期？", "output": "衡量利率敏感度"})).unwrap();
        assert_eq!(case.question(), Some("什么是久期？"));
        assert_eq!(case.expected, json!("衡量利率敏感度"));
    }
}
