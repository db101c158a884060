use anyhow::Result;
use serde_json::Value;

use super::instruction_case;
use crate::benchmark::{Benchmark, Matcher};
use crate::judge::JudgeTemplate;
use crate::types::TestCase;

const JUDGE_PROMPT: &str = concat!(
    "我会给你一个有关交易策略的'代码问题',除此之外还有一个'参考回答'和一个'待打分回答'，请根据'参考回答'给'待打分回答'一个评分。\n",
    "#优先先判定'待打分回答'是不是代码，如果不是，直接评分为0；如果是，再参考下面评分标准。\n",
    "#评分标准：\n",
    "    1、如果待打分回答的代码和参考回答一致，或能正常运行且解决问题，评分为1；\n",
    "    2、如果待打分回答的代码不能解决问题或不能正常运行，评分为0；\n",
    "    3、如果待打分回答的代码出现严重逻辑错误，评分为0.\n",
    "    现在请你根据下列信息打分：\n",
    "#代码问题：{question}\n",
    "#参考回答：{gold}\n",
    "#待打分回答：{pred}\n",
    "\n",
    "# 回复要求：只给出评分，将分数放在boxed{}中。严禁输出思考过程，你的输出只能是回复示例中的其中一种。\n",
    "# 回复示例：boxed{0}，boxed{1}\n",
    "    ",
);

/// Quantitative-trading coding tasks; the judge checks the code against a reference.
pub struct FinanceQt;

impl Benchmark for FinanceQt {
    fn name(&self) -> &'static str {
        "FinanceQT"
    }

    fn data_file(&self, _subset: &str) -> String {
        "FinanceQT.json".to_string()
    }

    fn to_case(&self, record: &Value) -> Result<TestCase> {
        instruction_case(record)
    }

    fn matcher(&self) -> Matcher {
        Matcher::Judge(JudgeTemplate::binary(None, JUDGE_PROMPT))
    }
}
