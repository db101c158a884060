use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::client::ClientConfig;
use crate::judge::judge_generation_options;
use crate::payload::GenerationOptions;
use crate::retry::{Backoff, RetryPolicy};

pub const API_KEY_ENV: &str = "FINBENCH_API_KEY";

/// One evaluation run, usually read from YAML.
///
/// ```yaml
/// model: glm-4-flash
/// api_url: http://127.0.0.1:8000/v1
/// datasets: [fineval, FinQA]
/// dataset_args:
///   fineval:
///     subset_list: [accounting]
/// limit: 20
/// generation_config:
///   max_tokens: 2048
///   temperature: 0.7
/// judge:
///   model: gpt-4o
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub model: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Falls back to `FINBENCH_API_KEY`, then `EMPTY`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Benchmarks to run; empty means all of them.
    #[serde(default)]
    pub datasets: Vec<String>,
    #[serde(default = "default_dataset_dir")]
    pub dataset_dir: PathBuf,
    #[serde(default)]
    pub dataset_args: BTreeMap<String, DatasetArgs>,
    /// Items per subset.
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default = "default_eval_batch_size")]
    pub eval_batch_size: usize,
    /// Judge calls in flight at once, across all items.
    #[serde(default = "default_review_batch_size")]
    pub review_batch_size: usize,
    #[serde(default)]
    pub generation_config: GenerationOptions,
    #[serde(default)]
    pub stream: bool,
    /// Read timeout per attempt, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Seconds after which no new items start.
    #[serde(default)]
    pub batch_timeout: Option<u64>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetArgs {
    #[serde(default)]
    pub subset_list: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Wait `base_delay_ms` between every attempt instead of doubling.
    #[serde(default)]
    pub fixed: bool,
    #[serde(default = "default_true")]
    pub retry_client_errors: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            fixed: false,
            retry_client_errors: true,
        }
    }
}

/// Second model used for grading. Endpoint and key default to the
/// evaluated model's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    #[serde(default = "default_judge_model")]
    pub model: String,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: default_judge_model(),
            api_url: None,
            api_key: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
        }
    }
}

fn default_api_url() -> String {
    "http://127.0.0.1:8000/v1".to_string()
}

fn default_dataset_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_eval_batch_size() -> usize {
    8
}

fn default_review_batch_size() -> usize {
    4
}

fn default_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_judge_model() -> String {
    "gpt-4o".to_string()
}

impl TaskConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_url: default_api_url(),
            api_key: None,
            datasets: Vec::new(),
            dataset_dir: default_dataset_dir(),
            dataset_args: BTreeMap::new(),
            limit: None,
            eval_batch_size: default_eval_batch_size(),
            review_batch_size: default_review_batch_size(),
            generation_config: GenerationOptions::default(),
            stream: false,
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            batch_timeout: None,
            retry: RetryConfig::default(),
            judge: JudgeConfig::default(),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("Invalid task config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        Self::from_yaml_str(&text).with_context(|| format!("Failed to load config {:?}", path))
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            bail!("`model` must not be empty");
        }
        if self.api_url.trim().is_empty() {
            bail!("`api_url` must not be empty");
        }
        if self.eval_batch_size == 0 {
            bail!("`eval_batch_size` must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            bail!("`retry.max_attempts` must be at least 1");
        }
        Ok(())
    }

    pub fn resolved_api_key(&self) -> String {
        resolve_key(self.api_key.as_deref())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let backoff = if self.retry.fixed {
            Backoff::Fixed(Duration::from_millis(self.retry.base_delay_ms))
        } else {
            Backoff::Exponential {
                base: Duration::from_millis(self.retry.base_delay_ms),
                cap: Duration::from_millis(self.retry.max_delay_ms),
            }
        };
        RetryPolicy::new(self.retry.max_attempts)
            .with_backoff(backoff)
            .with_retry_client_errors(self.retry.retry_client_errors)
    }

    fn timeouts(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.connect_timeout),
            Duration::from_secs(self.timeout),
        )
    }

    /// Client for the model under evaluation.
    pub fn client_config(&self) -> ClientConfig {
        let mut options = self.generation_config.clone();
        options.stream = options.stream || self.stream;
        let (connect, read) = self.timeouts();
        ClientConfig::new(&self.api_url, &self.model)
            .with_api_key(self.resolved_api_key())
            .with_options(options)
            .with_timeouts(connect, read)
            .with_retry(self.retry_policy())
    }

    /// Client for the judge model.
    pub fn judge_client_config(&self) -> ClientConfig {
        let mut options = judge_generation_options();
        if let Some(max_tokens) = self.judge.max_tokens {
            options.max_tokens = Some(max_tokens);
        }
        if let Some(temperature) = self.judge.temperature {
            options.temperature = Some(temperature);
        }
        if let Some(top_p) = self.judge.top_p {
            options.top_p = Some(top_p);
        }
        let api_url = self.judge.api_url.as_deref().unwrap_or(&self.api_url);
        let api_key = match self.judge.api_key.as_deref() {
            Some(key) => key.to_string(),
            None => self.resolved_api_key(),
        };
        let (connect, read) = self.timeouts();
        ClientConfig::new(api_url, &self.judge.model)
            .with_api_key(api_key)
            .with_options(options)
            .with_timeouts(connect, read)
            .with_retry(self.retry_policy())
    }

    /// Subsets chosen for a benchmark; empty means all.
    pub fn subsets_for(&self, benchmark: &str) -> &[String] {
        self.dataset_args
            .get(benchmark)
            .map(|args| args.subset_list.as_slice())
            .unwrap_or(&[])
    }

    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout.map(Duration::from_secs)
    }
}

fn resolve_key(explicit: Option<&str>) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var(API_KEY_ENV).ok())
        .filter(|k| !k.trim().is_empty())
        .unwrap_or_else(|| "EMPTY".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_minimal_yaml() {
        let config = TaskConfig::from_yaml_str("model: glm-4-flash").unwrap();
        assert_eq!(config.api_url, "http://127.0.0.1:8000/v1");
        assert_eq!(config.eval_batch_size, 8);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.judge.model, "gpt-4o");
        assert!(config.datasets.is_empty());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn full_yaml() {
        let yaml = r#"
model: Fin-R1
api_url: http://10.0.0.2:8000/v1/chat/completions
api_key: sk-test
datasets: [fineval, FinQA]
dataset_args:
  fineval:
    subset_list: [accounting, economy]
limit: 5
eval_batch_size: 16
generation_config:
  max_tokens: 8192
  temperature: 0.5
  seed: 42
  repetition_penalty: 1.05
stream: true
timeout: 600
batch_timeout: 3600
retry:
  max_attempts: 3
  base_delay_ms: 200
  fixed: true
  retry_client_errors: false
judge:
  model: qwen-max
  api_url: http://judge:9000/v1
  max_tokens: 1024
"#;
        let config = TaskConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.subsets_for("fineval"), ["accounting", "economy"]);
        assert!(config.subsets_for("FinQA").is_empty());
        assert_eq!(config.batch_timeout(), Some(Duration::from_secs(3600)));

        let client = config.client_config();
        assert_eq!(client.api_key, "sk-test");
        assert!(client.options.stream);
        assert_eq!(client.options.seed, Some(42));
        assert_eq!(client.options.extra.get("repetition_penalty"), Some(&serde_json::json!(1.05)));
        assert_eq!(client.read_timeout, Duration::from_secs(600));
        assert_eq!(client.retry.max_attempts, 3);
        assert_eq!(client.retry.backoff, Backoff::Fixed(Duration::from_millis(200)));
        assert!(!client.retry.retry_client_errors);

        let judge = config.judge_client_config();
        assert_eq!(judge.model, "qwen-max");
        assert_eq!(judge.api_url, "http://judge:9000/v1");
        assert_eq!(judge.api_key, "sk-test");
        assert_eq!(judge.options.max_tokens, Some(1024));
        assert_eq!(judge.options.temperature, Some(0.0));
        assert!(!judge.options.stream);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(TaskConfig::from_yaml_str("model: ''").is_err());
        assert!(TaskConfig::from_yaml_str("model: m\neval_batch_size: 0").is_err());
        assert!(TaskConfig::from_yaml_str("api_url: http://x").is_err());
    }

    #[test]
    fn explicit_key_wins() {
        assert_eq!(resolve_key(Some("sk-1")), "sk-1");
    }

    #[test]
    fn new_uses_defaults() {
        let config = TaskConfig::new("m");
        assert_eq!(config.model, "m");
        assert_eq!(config.timeout, 60);
    }
}
