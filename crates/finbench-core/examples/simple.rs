use std::sync::Arc;

use finbench_core::scorers::choice::ABCD;
use finbench_core::{from_async_fn, ChoiceScorer, Eval, Scorer, Suite, TaskConfig, TestCase, VecDataSource};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Example 1: inline cases and a canned "model", no endpoint needed
    let cases = vec![
        TestCase::with_id("0", json!({"question": "下列属于货币市场工具的是？"}), json!("B")),
        TestCase::with_id("1", json!({"question": "股票属于哪类市场工具？"}), json!("A")),
    ];
    let data = Arc::new(VecDataSource::new(cases));

    let task = from_async_fn(|case: &TestCase| {
        let question = case.question().unwrap_or_default().to_string();
        async move {
            let answer = if question.contains("货币市场") { "国库券属于货币市场工具，答案是 \\boxed{B}" } else { "C" };
            Ok(json!(answer))
        }
    });

    let scorers: Vec<Arc<dyn Scorer>> = vec![Arc::new(ChoiceScorer::new(ABCD)?)];

    let eval = Eval::builder()
        .data_source(data)
        .task(task)
        .scorers(scorers)
        .concurrency(8)
        .build()?;

    let result = eval.run().await?;
    println!("{}", result.summary_table());

    // Example 2: a full run from a YAML task config, if one is given
    if let Some(path) = std::env::args().nth(1) {
        let config = TaskConfig::from_yaml_file(path.as_ref())?;
        for report in Suite::from_config(config)?.run().await? {
            println!("{}", report.summary_table());
        }
    }

    Ok(())
}
