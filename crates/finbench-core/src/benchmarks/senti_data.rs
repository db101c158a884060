use anyhow::Result;
use serde_json::Value;

use super::{question_case, text_field};
use crate::benchmark::{Benchmark, Matcher};
use crate::judge::JudgeTemplate;
use crate::types::TestCase;

const PROMPT_HEAD: &str = "Below is a finance-related tweet. Please analyze its sentiment.\n\"0\" represents \"Bearish\"\n\"1\" represents \"Bullish\"\n\"2\" represents \"Neutral\"\n\nRequirements:\n-Your output should be one of the above labels.\n-Add a \"\\n\" at the beginning of each output before generating data\nput the final answer in \\boxed{}\nYour reasoning should not be less than 2048 tokens.\n\nText: ";

const JUDGE_SYSTEM: &str = "我会给你一个'标准回答'与一个'模型回答'，请判断'模型回答'是否与'标准回答'的含义一致。注意，这是一道情感分析题目，答案中的数字\"0\" represents \"Bearish\"；\"1\" represents \"Bullish\"；\"2\" represents \"Neutral\"；如果一致，输出1，否则输出0。\n    # 回复要求：按照以上标准给出判断理由，并在最后将判断结果放在boxed{}中，例如boxed{1} or boxed{0}\n    ";

const JUDGE_USER: &str = "标准回答: {gold}\n模型回答: {pred}";

/// Finance tweet sentiment: 0 bearish, 1 bullish, 2 neutral.
pub struct SentiData;

impl Benchmark for SentiData {
    fn name(&self) -> &'static str {
        "senti_data"
    }

    fn data_file(&self, _subset: &str) -> String {
        "sent_valid.jsonl".to_string()
    }

    fn to_case(&self, record: &Value) -> Result<TestCase> {
        let text = text_field(record, "text")?;
        Ok(question_case(format!("{PROMPT_HEAD}{text}"), text_field(record, "label")?))
    }

    fn matcher(&self) -> Matcher {
        Matcher::Judge(JudgeTemplate::binary(Some(JUDGE_SYSTEM), JUDGE_USER))
    }
}
