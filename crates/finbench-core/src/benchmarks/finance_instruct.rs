use anyhow::Result;
use serde_json::Value;

use super::instruction_case;
use crate::benchmark::{Benchmark, Matcher};
use crate::judge::JudgeTemplate;
use crate::types::TestCase;

const JUDGE_PROMPT: &str = "你是一个金融题目结果评分助手，我会给你一个'参考答案'与一个'模型回复'。你的任务是将模型回复与参考答案进行比较，并判断其正确性，如果回复正确，就输出1，否则输出0。\n    # 参考答案: {gold}\n    # 模型回复: {pred}\n    # 回复要求：按照以上规则给出判断，并在最后将判断结果1 or 0放在boxed{}中，例如boxed{1} or boxed{0}\n    ";

/// Open-ended finance instructions graded right/wrong by a judge.
pub struct FinanceInstruct;

impl Benchmark for FinanceInstruct {
    fn name(&self) -> &'static str {
        "Finance_instruct"
    }

    fn data_file(&self, _subset: &str) -> String {
        "Finance_instruct_test.json".to_string()
    }

    fn to_case(&self, record: &Value) -> Result<TestCase> {
        instruction_case(record)
    }

    fn matcher(&self) -> Matcher {
        Matcher::Judge(JudgeTemplate::binary(None, JUDGE_PROMPT))
    }
}
