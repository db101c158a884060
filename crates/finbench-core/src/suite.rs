//! A configured run: one client for the evaluated model, one judge, and an
//! [`Eval`] per selected benchmark.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::benchmark::{Benchmark, BenchmarkRegistry, Matcher};
use crate::client::InferenceClient;
use crate::config::TaskConfig;
use crate::datasource::BenchmarkDataSource;
use crate::judge::JudgeDispatcher;
use crate::runner::Eval;
use crate::scorer::Scorer;
use crate::scorers::{choice::ChoiceScorer, exact::ExactMatchScorer, judge::JudgeScorer};
use crate::task::CompletionTask;
use crate::types::EvalResult;

#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub benchmark: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judge_model: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub result: EvalResult,
}

impl BenchmarkReport {
    pub fn summary_table(&self) -> String {
        format!(
            "== {} ({}) ==\n{}",
            self.benchmark,
            self.model,
            self.result.summary_table()
        )
    }
}

pub struct Suite {
    config: TaskConfig,
    registry: BenchmarkRegistry,
    client: Arc<InferenceClient>,
    judge: Arc<JudgeDispatcher>,
}

impl Suite {
    pub fn from_config(config: TaskConfig) -> Result<Self> {
        config.validate()?;
        let client = Arc::new(InferenceClient::new(config.client_config())?);
        let judge_client = Arc::new(InferenceClient::new(config.judge_client_config())?);
        let judge = Arc::new(JudgeDispatcher::new(judge_client).with_max_concurrent(config.review_batch_size));
        Ok(Self {
            config,
            registry: BenchmarkRegistry::builtin(),
            client,
            judge,
        })
    }

    pub fn with_registry(mut self, registry: BenchmarkRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// The configured benchmarks, or every registered one when none is named.
    pub fn selected(&self) -> Result<Vec<Arc<dyn Benchmark>>> {
        if self.config.datasets.is_empty() {
            return Ok(self.registry.iter().cloned().collect());
        }
        self.config
            .datasets
            .iter()
            .map(|name| {
                self.registry.get(name).ok_or_else(|| {
                    anyhow!(
                        "unknown benchmark '{name}' (available: {})",
                        self.registry.names().collect::<Vec<_>>().join(", ")
                    )
                })
            })
            .collect()
    }

    fn scorers_for(&self, benchmark: &Arc<dyn Benchmark>) -> Result<Vec<Arc<dyn Scorer>>> {
        let gold = benchmark.clone();
        let scorer: Arc<dyn Scorer> = match benchmark.matcher() {
            Matcher::Exact => Arc::new(ExactMatchScorer::default().with_gold_answer(gold)),
            Matcher::Choice(choices) => Arc::new(ChoiceScorer::new(choices)?.with_gold_answer(gold)),
            Matcher::Judge(template) => {
                Arc::new(JudgeScorer::new(self.judge.clone(), template).with_gold_answer(gold))
            }
        };
        Ok(vec![scorer])
    }

    pub async fn run_benchmark(&self, benchmark: Arc<dyn Benchmark>) -> Result<BenchmarkReport> {
        let name = benchmark.name();
        let judged = matches!(benchmark.matcher(), Matcher::Judge(_));
        let source = BenchmarkDataSource::new(benchmark.clone(), self.config.dataset_dir.join(name))
            .subsets(self.config.subsets_for(name).iter().cloned())
            .limit(self.config.limit);

        let eval = Eval::builder()
            .data_source(Arc::new(source))
            .task(Arc::new(CompletionTask::new(self.client.clone(), benchmark.clone())))
            .scorers(self.scorers_for(&benchmark)?)
            .concurrency(self.config.eval_batch_size)
            .batch_timeout(self.config.batch_timeout())
            .build()?;

        info!(benchmark = name, model = %self.client.model(), "running benchmark");
        let started_at = Utc::now();
        let result = eval.run().await?;
        Ok(BenchmarkReport {
            benchmark: name.to_string(),
            model: self.client.model().to_string(),
            judge_model: judged.then(|| self.judge.model().to_string()),
            started_at,
            finished_at: Utc::now(),
            result,
        })
    }

    /// Runs the selected benchmarks one after another.
    pub async fn run(&self) -> Result<Vec<BenchmarkReport>> {
        let mut reports = Vec::new();
        for benchmark in self.selected()? {
            reports.push(self.run_benchmark(benchmark).await?);
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_follows_config() {
        let mut config = TaskConfig::new("m");
        let suite = Suite::from_config(config.clone()).unwrap();
        assert_eq!(suite.selected().unwrap().len(), 7);

        config.datasets = vec!["FinQA".into(), "fineval".into()];
        let suite = Suite::from_config(config.clone()).unwrap();
        let names: Vec<_> = suite.selected().unwrap().iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["FinQA", "fineval"]);

        config.datasets = vec!["ceval".into()];
        let err = Suite::from_config(config).unwrap().selected().err().unwrap();
        assert!(err.to_string().contains("unknown benchmark 'ceval'"));
    }
}
