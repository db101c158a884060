use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use finbench_core::{BenchmarkRegistry, Matcher, Suite, TaskConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "finbench", about = "Run finance benchmarks against an OpenAI-compatible endpoint")]
struct Cli {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
	/// Evaluate a model on one or more benchmarks
	Run(RunArgs),
	/// List the available benchmarks
	List,
}

#[derive(Debug, Clone, Parser)]
struct RunArgs {
	/// YAML task config; flags below override its values
	#[arg(long)]
	config: Option<PathBuf>,

	/// Model name sent in each request
	#[arg(long)]
	model: Option<String>,

	/// Endpoint base URL, e.g. http://127.0.0.1:8000/v1
	#[arg(long)]
	api_url: Option<String>,

	#[arg(long)]
	api_key: Option<String>,

	/// Comma-separated benchmark names (default: all)
	#[arg(long, value_delimiter = ',')]
	datasets: Vec<String>,

	/// Directory holding one sub-directory per benchmark
	#[arg(long)]
	dataset_dir: Option<PathBuf>,

	/// Items per subset
	#[arg(long)]
	limit: Option<usize>,

	/// Items in flight
	#[arg(long)]
	concurrency: Option<usize>,

	/// Request streamed responses
	#[arg(long, action = ArgAction::SetTrue)]
	stream: bool,

	/// Write the full reports as JSON
	#[arg(long)]
	json_out: Option<PathBuf>,

	/// Debug logging
	#[arg(short, long, action = ArgAction::SetTrue)]
	verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	match cli.command {
		Commands::Run(args) => {
			init_tracing(args.verbose);
			run(args).await?
		}
		Commands::List => list(),
	}
	Ok(())
}

fn init_tracing(verbose: bool) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		if verbose {
			EnvFilter::new("finbench=debug,finbench_core=debug,info")
		} else {
			EnvFilter::new("finbench=info,finbench_core=info,warn")
		}
	});
	tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn list() {
	for benchmark in BenchmarkRegistry::builtin().iter() {
		let scoring = match benchmark.matcher() {
			Matcher::Exact => "exact",
			Matcher::Choice(_) => "choice",
			Matcher::Judge(_) => "judge",
		};
		println!("{:<20} {:<7} {}", benchmark.name(), scoring, benchmark.subsets().join(","));
	}
}

fn load_config(args: &RunArgs) -> Result<TaskConfig> {
	let mut config = match &args.config {
		Some(path) => TaskConfig::from_yaml_file(path)?,
		None => {
			let model = args
				.model
				.clone()
				.ok_or_else(|| anyhow::anyhow!("--model is required without --config"))?;
			TaskConfig::new(model)
		}
	};

	if let Some(model) = &args.model {
		config.model = model.clone();
	}
	if let Some(url) = &args.api_url {
		config.api_url = url.clone();
	}
	if let Some(key) = &args.api_key {
		config.api_key = Some(key.clone());
	}
	if !args.datasets.is_empty() {
		config.datasets = args.datasets.clone();
	}
	if let Some(dir) = &args.dataset_dir {
		config.dataset_dir = dir.clone();
	}
	if args.limit.is_some() {
		config.limit = args.limit;
	}
	if let Some(n) = args.concurrency {
		config.eval_batch_size = n;
	}
	if args.stream {
		config.stream = true;
	}
	config.validate()?;
	Ok(config)
}

async fn run(args: RunArgs) -> Result<()> {
	let config = load_config(&args)?;
	info!(model = %config.model, api_url = %config.api_url, datasets = ?config.datasets, "starting run");
	let suite = Suite::from_config(config)?;
	let reports = suite.run().await?;

	for report in &reports {
		println!("{}", report.summary_table());
	}

	if let Some(path) = args.json_out {
		let json = serde_json::to_string_pretty(&reports)?;
		tokio::fs::write(&path, json).await?;
		info!(path = %path.display(), "report written");
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn flags_override_defaults() {
		let cli = Cli::parse_from([
			"finbench", "run", "--model", "Fin-R1", "--datasets", "fineval,FinQA", "--limit", "3", "--stream",
		]);
		let Commands::Run(args) = cli.command else {
			panic!("expected run");
		};
		let config = load_config(&args).unwrap();
		assert_eq!(config.model, "Fin-R1");
		assert_eq!(config.datasets, vec!["fineval", "FinQA"]);
		assert_eq!(config.limit, Some(3));
		assert!(config.stream);
	}

	#[test]
	fn model_required_without_config() {
		let cli = Cli::parse_from(["finbench", "run"]);
		let Commands::Run(args) = cli.command else {
			panic!("expected run");
		};
		assert!(load_config(&args).is_err());
	}
}
