use anyhow::Result;
use serde_json::Value;

use super::instruction_case;
use crate::benchmark::{Benchmark, Matcher};
use crate::scorers::choice::ABCD;
use crate::types::TestCase;

/// Ant Group finance multiple-choice test set.
pub struct AntFinance;

impl Benchmark for AntFinance {
    fn name(&self) -> &'static str {
        "Ant_Finance"
    }

    fn data_file(&self, _subset: &str) -> String {
        "Ant_Finance_TEST.json".to_string()
    }

    fn to_case(&self, record: &Value) -> Result<TestCase> {
        instruction_case(record)
    }

    fn matcher(&self) -> Matcher {
        Matcher::Choice(ABCD)
    }
}
