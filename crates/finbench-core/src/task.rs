use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::benchmark::Benchmark;
use crate::client::InferenceClient;
use crate::types::TestCase;

#[async_trait]
pub trait Task: Send + Sync {
	async fn run(&self, case: &TestCase) -> Result<Value>;
}

/// Wrap an async closure as a `Task`.
pub fn from_async_fn<F, Fut>(f: F) -> Arc<dyn Task>
where
	F: Send + Sync + 'static + Fn(&TestCase) -> Fut,
	Fut: Future<Output = Result<Value>> + Send + 'static,
{
	struct ClosureTask<F, Fut>
	where
		F: Send + Sync + 'static + Fn(&TestCase) -> Fut,
		Fut: Future<Output = Result<Value>> + Send + 'static,
	{
		f: F,
	}

	#[async_trait]
	impl<F, Fut> Task for ClosureTask<F, Fut>
	where
		F: Send + Sync + 'static + Fn(&TestCase) -> Fut,
		Fut: Future<Output = Result<Value>> + Send + 'static,
	{
		async fn run(&self, case: &TestCase) -> Result<Value> {
			(self.f)(case).await
		}
	}

	Arc::new(ClosureTask { f })
}

/// Asks the model under test: the benchmark builds the prompt, the client
/// makes the call, the benchmark parses the reply.
///
/// An exhausted call surfaces as an error, which the runner records on the
/// item.
pub struct CompletionTask {
	client: Arc<InferenceClient>,
	benchmark: Arc<dyn Benchmark>,
}

impl CompletionTask {
	pub fn new(client: Arc<InferenceClient>, benchmark: Arc<dyn Benchmark>) -> Self {
		Self { client, benchmark }
	}
}

#[async_trait]
impl Task for CompletionTask {
	async fn run(&self, case: &TestCase) -> Result<Value> {
		let prompt = self.benchmark.build_prompt(case);
		let payload = self.client.payload(self.benchmark.system_prompt(), prompt);
		let response = self.client.call(&payload).await?;
		Ok(Value::String(self.benchmark.parse_prediction(&response.content)))
	}
}
