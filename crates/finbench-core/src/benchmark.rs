//! Benchmark definitions and the table that maps names to them.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use crate::benchmarks;
use crate::judge::JudgeTemplate;
use crate::types::TestCase;

/// How a benchmark compares a prediction with its gold answer.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// String equality after trimming.
    Exact,
    /// Option letter parsed from the reply, compared with the gold letter.
    Choice(&'static [char]),
    /// Second model call graded with this template.
    Judge(JudgeTemplate),
}

/// One dataset adapter: where its data lives, how a record becomes a
/// prompt, and how the answer is scored.
pub trait Benchmark: Send + Sync {
    fn name(&self) -> &'static str;

    fn subsets(&self) -> &'static [&'static str] {
        &["main"]
    }

    /// File name of a subset, relative to the benchmark's data directory.
    fn data_file(&self, subset: &str) -> String;

    /// Shapes one raw dataset record into a case with `input.question` and
    /// the gold answer in `expected`.
    fn to_case(&self, record: &Value) -> Result<TestCase>;

    fn system_prompt(&self) -> Option<&'static str> {
        None
    }

    fn build_prompt(&self, case: &TestCase) -> String {
        format!("{}\n", case.question().unwrap_or_default())
    }

    fn gold_answer(&self, case: &TestCase) -> String {
        match &case.expected {
            Value::String(s) => s.trim().to_string(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// Extracts the answer from the model's reply.
    fn parse_prediction(&self, reply: &str) -> String {
        reply.to_string()
    }

    fn matcher(&self) -> Matcher;
}

/// Explicit name → benchmark table, built once at startup.
#[derive(Clone, Default)]
pub struct BenchmarkRegistry {
    entries: BTreeMap<&'static str, Arc<dyn Benchmark>>,
}

impl BenchmarkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every adapter that ships with the crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(benchmarks::fineval::FinEval));
        registry.register(Arc::new(benchmarks::fineval_definition::FinEvalDefinition));
        registry.register(Arc::new(benchmarks::ant_finance::AntFinance));
        registry.register(Arc::new(benchmarks::finance_instruct::FinanceInstruct));
        registry.register(Arc::new(benchmarks::finance_qt::FinanceQt));
        registry.register(Arc::new(benchmarks::finqa::FinQa));
        registry.register(Arc::new(benchmarks::senti_data::SentiData));
        registry
    }

    /// Adds a benchmark, replacing any with the same name.
    pub fn register(&mut self, benchmark: Arc<dyn Benchmark>) {
        self.entries.insert(benchmark.name(), benchmark);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Benchmark>> {
        self.entries.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Benchmark>> + '_ {
        self.entries.values()
    }
}
