//! Threshold checks for evaluation results, for use in `#[tokio::test]`s
//! that gate a model on a benchmark.
//!
//! ```ignore
//! let report = suite.run_benchmark(fineval).await?;
//! assert_eval_avg_score(&report.result, 0.6)?;
//! assert_eval_no_errors(&report.result)?;
//! ```

use anyhow::{bail, Result};

use crate::types::EvalResult;

pub fn assert_eval_pass_rate(result: &EvalResult, min_pass_rate: f64) -> Result<()> {
    if result.summary.pass_rate < min_pass_rate {
        bail!(
            "Evaluation failed: pass rate {:.1}% is below threshold {:.1}%\n{}",
            result.summary.pass_rate * 100.0,
            min_pass_rate * 100.0,
            result.summary_table()
        );
    }
    Ok(())
}

/// Average score over every item that ran, errored items counting as 0.
pub fn assert_eval_avg_score(result: &EvalResult, min_avg_score: f64) -> Result<()> {
    if result.summary.avg_score < min_avg_score {
        bail!(
            "Evaluation failed: avg score {:.3} is below threshold {:.3}\n{}",
            result.summary.avg_score,
            min_avg_score,
            result.summary_table()
        );
    }
    Ok(())
}

/// No item lost its inference call and none was left unstarted.
pub fn assert_eval_no_errors(result: &EvalResult) -> Result<()> {
    let summary = &result.summary;
    if summary.errored > 0 || summary.abandoned > 0 {
        let failures: Vec<String> = result
            .cases
            .iter()
            .filter_map(|c| {
                c.error
                    .as_ref()
                    .map(|e| format!("  {}: {e}", c.case.id.as_deref().unwrap_or("-")))
            })
            .collect();
        bail!(
            "Evaluation failed: {} errored, {} abandoned\n{}",
            summary.errored,
            summary.abandoned,
            failures.join("\n")
        );
    }
    Ok(())
}
