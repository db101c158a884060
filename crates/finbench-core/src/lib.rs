//! finbench-core: finance LLM benchmarks against OpenAI-compatible endpoints.
//! An inference client with bounded retries, SSE and JSON response
//! normalization, an LLM judge, and a concurrent batch runner.

pub mod benchmark;
pub mod benchmarks;
pub mod client;
pub mod config;
pub mod datasource;
pub mod error;
pub mod judge;
pub mod normalize;
pub mod payload;
pub mod retry;
pub mod runner;
pub mod scorer;
pub mod suite;
pub mod task;
pub mod testing;
pub mod trace;

pub mod types {
	pub use finbench_types::*;
}

pub mod scorers {
	pub mod choice;
	pub mod exact;
	pub mod judge;
}

pub use benchmark::{Benchmark, BenchmarkRegistry, Matcher};
pub use client::{CallOverrides, ClientConfig, InferenceClient};
pub use config::TaskConfig;
pub use datasource::{BenchmarkDataSource, DataSource, VecDataSource};
pub use error::{CallFailed, InferenceError};
pub use judge::{JudgeDispatcher, JudgeTemplate, Normalization, ScoreExtraction, ScoreRules};
pub use payload::{GenerationOptions, Message, RequestPayload, Role};
pub use retry::{Backoff, RetryPolicy};
pub use runner::{Eval, EvalBuilder};
pub use scorer::Scorer;
pub use scorers::{choice::ChoiceScorer, exact::ExactMatchScorer, judge::JudgeScorer};
pub use suite::{BenchmarkReport, Suite};
pub use task::{from_async_fn, CompletionTask, Task};
pub use types::{CanonicalResponse, CaseResult, EvalResult, EvalSummary, Score, TestCase};
