use anyhow::Result;
use serde_json::Value;

use super::{question_case, text_field};
use crate::benchmark::{Benchmark, Matcher};
use crate::judge::JudgeTemplate;
use crate::types::TestCase;

const SYSTEM_PROMPT: &str = "请回答给出的金融名词定义问题，不要有除了答案外其余的回复。";

const JUDGE_SYSTEM: &str = concat!(
    "我会给你一个'题目'，一个'标准回答'与一个'待打分回答'，请根据评分标准对'待打分回答'进行打分。\n",
    "    ## 评分标准：\n",
    "    # 1. 如果回答准确，与正确回答大体上含义一致，加2分\n",
    "    # 2. 如果回答完整，覆盖了正确回答的所有关键点，加1分\n",
    "    # 3. 如果回答高效，无太多冗余信息，加1分\n",
    "    # 4. 如果回答丰富，具有正确回答之外一些额外的正确信息，加1分\n",
    "    # 5. 满分共5分，你只有0，1，2，3，4, 5六个选项\n",
    "    # 回复要求：按照标准给出评分理由，并在最后将分数放在boxed{}中\n",
    "    ",
);

const JUDGE_USER: &str = "题目: {question}\n标准回答: {gold}\n待打分回答: {pred}";

/// Finance term definitions, graded on a 0 to 5 rubric.
pub struct FinEvalDefinition;

impl Benchmark for FinEvalDefinition {
    fn name(&self) -> &'static str {
        "fineval_definition"
    }

    fn data_file(&self, _subset: &str) -> String {
        "fineval_definition.jsonl".to_string()
    }

    fn to_case(&self, record: &Value) -> Result<TestCase> {
        Ok(question_case(
            text_field(record, "question")?,
            text_field(record, "answer")?,
        ))
    }

    fn system_prompt(&self) -> Option<&'static str> {
        Some(SYSTEM_PROMPT)
    }

    fn build_prompt(&self, case: &TestCase) -> String {
        format!("问题: {}\n", case.question().unwrap_or_default())
    }

    fn matcher(&self) -> Matcher {
        Matcher::Judge(JudgeTemplate::rubric(Some(JUDGE_SYSTEM), JUDGE_USER, 5.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::Normalization;
    use serde_json::json;

    #[test]
    fn rubric_out_of_five() {
        let Matcher::Judge(template) = FinEvalDefinition.matcher() else {
            panic!("fineval_definition is judged");
        };
        assert_eq!(template.normalization, Normalization::DivideByCeiling(5.0));
        assert_eq!(template.extract("理由……boxed{3}").value(), 0.6);

        let system = template.system.as_deref().unwrap();
        assert!(system.starts_with("我会给你一个'题目'，一个'标准回答'与一个'待打分回答'，请根据评分标准对'待打分回答'进行打分。\n    ## 评分标准：\n"));
        assert_eq!(system.lines().filter(|l| l.trim_start().starts_with("# ")).count(), 6);
    }

    #[test]
    fn prompt_and_system() {
        let case = FinEvalDefinition
            .to_case(&json!({"question": "什么是可转债？", "answer": "可转换为股票的债券"}))
            .unwrap();
        assert_eq!(FinEvalDefinition.build_prompt(&case), "问题: 什么是可转债？\n");
        assert_eq!(FinEvalDefinition.system_prompt(), Some(SYSTEM_PROMPT));
    }
}
